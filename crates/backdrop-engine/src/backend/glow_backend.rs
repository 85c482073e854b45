use ::glow::HasContext;

use super::{
    BlendFactor, BufferTarget, BufferUsage, ClearBuffers, GlError, GlHandle, GlResult,
    GraphicsBackend, PrimitiveMode, ShaderStage, TextureParameter, TextureTarget,
    UniformLocation, UniformValue,
};

/// [`GraphicsBackend`] over an OpenGL (ES) 3 context.
///
/// Every call is followed by a `glGetError` poll so failures surface at the call
/// that caused them rather than at some later, unrelated call.
pub struct GlowBackend {
    gl: ::glow::Context,
}

impl GlowBackend {
    /// Wraps a loaded context.
    ///
    /// # Safety
    ///
    /// `gl` must be current on the calling thread for as long as the backend (and
    /// every resource created through it) is alive.
    pub unsafe fn new(gl: ::glow::Context) -> Self {
        Self { gl }
    }

    fn check(&self, call: &'static str) -> GlResult<()> {
        // SAFETY: the context is current per the contract of `new`.
        let code = unsafe { self.gl.get_error() };
        if code == ::glow::NO_ERROR {
            Ok(())
        } else {
            Err(GlError::new(call, code))
        }
    }

    /// Turns an object-creation failure into a `GlError`.
    fn creation_failed(&self, call: &'static str, message: String) -> GlError {
        log::warn!("{call} failed: {message}");
        match self.check(call) {
            Err(err) => err,
            Ok(()) => GlError::new(call, 0),
        }
    }
}

impl std::fmt::Debug for GlowBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GlowBackend").finish_non_exhaustive()
    }
}

fn shader(h: GlHandle) -> ::glow::NativeShader {
    ::glow::NativeShader(h.non_zero())
}

fn program(h: GlHandle) -> ::glow::NativeProgram {
    ::glow::NativeProgram(h.non_zero())
}

fn texture(h: GlHandle) -> ::glow::NativeTexture {
    ::glow::NativeTexture(h.non_zero())
}

fn buffer(h: GlHandle) -> ::glow::NativeBuffer {
    ::glow::NativeBuffer(h.non_zero())
}

fn vertex_array(h: GlHandle) -> ::glow::NativeVertexArray {
    ::glow::NativeVertexArray(h.non_zero())
}

impl GraphicsBackend for GlowBackend {
    fn create_shader(&self, stage: ShaderStage) -> GlResult<GlHandle> {
        match unsafe { self.gl.create_shader(stage.gl_enum()) } {
            Ok(s) => {
                self.check("glCreateShader")?;
                Ok(GlHandle::from(s.0))
            }
            Err(message) => Err(self.creation_failed("glCreateShader", message)),
        }
    }

    fn shader_source(&self, s: GlHandle, source: &str) -> GlResult<()> {
        unsafe { self.gl.shader_source(shader(s), source) };
        self.check("glShaderSource")
    }

    fn compile_shader(&self, s: GlHandle) -> GlResult<()> {
        unsafe { self.gl.compile_shader(shader(s)) };
        self.check("glCompileShader")
    }

    fn shader_compile_status(&self, s: GlHandle) -> GlResult<bool> {
        let ok = unsafe { self.gl.get_shader_compile_status(shader(s)) };
        self.check("glGetShaderiv")?;
        Ok(ok)
    }

    fn shader_info_log(&self, s: GlHandle) -> GlResult<String> {
        let log = unsafe { self.gl.get_shader_info_log(shader(s)) };
        self.check("glGetShaderInfoLog")?;
        Ok(log)
    }

    fn delete_shader(&self, s: GlHandle) -> GlResult<()> {
        unsafe { self.gl.delete_shader(shader(s)) };
        self.check("glDeleteShader")
    }

    fn create_program(&self) -> GlResult<GlHandle> {
        match unsafe { self.gl.create_program() } {
            Ok(p) => {
                self.check("glCreateProgram")?;
                Ok(GlHandle::from(p.0))
            }
            Err(message) => Err(self.creation_failed("glCreateProgram", message)),
        }
    }

    fn attach_shader(&self, p: GlHandle, s: GlHandle) -> GlResult<()> {
        unsafe { self.gl.attach_shader(program(p), shader(s)) };
        self.check("glAttachShader")
    }

    fn link_program(&self, p: GlHandle) -> GlResult<()> {
        unsafe { self.gl.link_program(program(p)) };
        self.check("glLinkProgram")
    }

    fn program_link_status(&self, p: GlHandle) -> GlResult<bool> {
        let ok = unsafe { self.gl.get_program_link_status(program(p)) };
        self.check("glGetProgramiv")?;
        Ok(ok)
    }

    fn program_info_log(&self, p: GlHandle) -> GlResult<String> {
        let log = unsafe { self.gl.get_program_info_log(program(p)) };
        self.check("glGetProgramInfoLog")?;
        Ok(log)
    }

    fn delete_program(&self, p: GlHandle) -> GlResult<()> {
        unsafe { self.gl.delete_program(program(p)) };
        self.check("glDeleteProgram")
    }

    fn use_program(&self, p: Option<GlHandle>) -> GlResult<()> {
        unsafe { self.gl.use_program(p.map(program)) };
        self.check("glUseProgram")
    }

    fn uniform_location(&self, p: GlHandle, name: &str) -> GlResult<Option<UniformLocation>> {
        let location = unsafe { self.gl.get_uniform_location(program(p), name) };
        self.check("glGetUniformLocation")?;
        Ok(location.map(|l| UniformLocation(l.0 as i32)))
    }

    fn uniform(&self, location: UniformLocation, value: &UniformValue) -> GlResult<()> {
        let native = ::glow::NativeUniformLocation(location.0 as u32);
        let loc = Some(&native);
        let call = unsafe {
            match value {
                UniformValue::Int(v) => {
                    self.gl.uniform_1_i32(loc, *v);
                    "glUniform1i"
                }
                UniformValue::Float(v) => {
                    self.gl.uniform_1_f32(loc, *v);
                    "glUniform1f"
                }
                UniformValue::Vec2([x, y]) => {
                    self.gl.uniform_2_f32(loc, *x, *y);
                    "glUniform2f"
                }
                UniformValue::Vec3([x, y, z]) => {
                    self.gl.uniform_3_f32(loc, *x, *y, *z);
                    "glUniform3f"
                }
                UniformValue::Vec4([x, y, z, w]) => {
                    self.gl.uniform_4_f32(loc, *x, *y, *z, *w);
                    "glUniform4f"
                }
                UniformValue::Mat3(m) => {
                    self.gl.uniform_matrix_3_f32_slice(loc, false, m);
                    "glUniformMatrix3fv"
                }
                UniformValue::Mat4(m) => {
                    self.gl.uniform_matrix_4_f32_slice(loc, false, m);
                    "glUniformMatrix4fv"
                }
                UniformValue::IntArray(v) => {
                    self.gl.uniform_1_i32_slice(loc, v);
                    "glUniform1iv"
                }
                UniformValue::FloatArray(v) => {
                    self.gl.uniform_1_f32_slice(loc, v);
                    "glUniform1fv"
                }
            }
        };
        self.check(call)
    }

    fn blend_func_separate(
        &self,
        src_rgb: BlendFactor,
        dst_rgb: BlendFactor,
        src_alpha: BlendFactor,
        dst_alpha: BlendFactor,
    ) -> GlResult<()> {
        unsafe {
            self.gl.blend_func_separate(
                src_rgb.gl_enum(),
                dst_rgb.gl_enum(),
                src_alpha.gl_enum(),
                dst_alpha.gl_enum(),
            )
        };
        self.check("glBlendFuncSeparate")
    }

    fn depth_mask(&self, write: bool) -> GlResult<()> {
        unsafe { self.gl.depth_mask(write) };
        self.check("glDepthMask")
    }

    fn set_depth_test(&self, enabled: bool) -> GlResult<()> {
        if enabled {
            unsafe { self.gl.enable(::glow::DEPTH_TEST) };
            self.check("glEnable")
        } else {
            unsafe { self.gl.disable(::glow::DEPTH_TEST) };
            self.check("glDisable")
        }
    }

    fn create_texture(&self) -> GlResult<GlHandle> {
        match unsafe { self.gl.create_texture() } {
            Ok(t) => {
                self.check("glGenTextures")?;
                Ok(GlHandle::from(t.0))
            }
            Err(message) => Err(self.creation_failed("glGenTextures", message)),
        }
    }

    fn bind_texture(&self, target: TextureTarget, t: Option<GlHandle>) -> GlResult<()> {
        unsafe { self.gl.bind_texture(target.gl_enum(), t.map(texture)) };
        self.check("glBindTexture")
    }

    fn tex_parameter(
        &self,
        target: TextureTarget,
        parameter: TextureParameter,
        value: u32,
    ) -> GlResult<()> {
        unsafe {
            self.gl
                .tex_parameter_i32(target.gl_enum(), parameter.gl_enum(), value as i32)
        };
        self.check("glTexParameteri")
    }

    fn delete_texture(&self, t: GlHandle) -> GlResult<()> {
        unsafe { self.gl.delete_texture(texture(t)) };
        self.check("glDeleteTextures")
    }

    fn active_texture(&self, unit: u32) -> GlResult<()> {
        unsafe { self.gl.active_texture(::glow::TEXTURE0 + unit) };
        self.check("glActiveTexture")
    }

    fn create_buffer(&self) -> GlResult<GlHandle> {
        match unsafe { self.gl.create_buffer() } {
            Ok(b) => {
                self.check("glGenBuffers")?;
                Ok(GlHandle::from(b.0))
            }
            Err(message) => Err(self.creation_failed("glGenBuffers", message)),
        }
    }

    fn bind_buffer(&self, target: BufferTarget, b: Option<GlHandle>) -> GlResult<()> {
        unsafe { self.gl.bind_buffer(target.gl_enum(), b.map(buffer)) };
        self.check("glBindBuffer")
    }

    fn buffer_data(&self, target: BufferTarget, data: &[u8], usage: BufferUsage) -> GlResult<()> {
        unsafe {
            self.gl
                .buffer_data_u8_slice(target.gl_enum(), data, usage.gl_enum())
        };
        self.check("glBufferData")
    }

    fn buffer_sub_data(&self, target: BufferTarget, offset: usize, data: &[u8]) -> GlResult<()> {
        let offset = i32::try_from(offset)
            .map_err(|_| GlError::new("glBufferSubData", GlError::INVALID_VALUE))?;
        unsafe {
            self.gl
                .buffer_sub_data_u8_slice(target.gl_enum(), offset, data)
        };
        self.check("glBufferSubData")
    }

    fn delete_buffer(&self, b: GlHandle) -> GlResult<()> {
        unsafe { self.gl.delete_buffer(buffer(b)) };
        self.check("glDeleteBuffers")
    }

    fn create_vertex_array(&self) -> GlResult<GlHandle> {
        match unsafe { self.gl.create_vertex_array() } {
            Ok(v) => {
                self.check("glGenVertexArrays")?;
                Ok(GlHandle::from(v.0))
            }
            Err(message) => Err(self.creation_failed("glGenVertexArrays", message)),
        }
    }

    fn bind_vertex_array(&self, v: Option<GlHandle>) -> GlResult<()> {
        unsafe { self.gl.bind_vertex_array(v.map(vertex_array)) };
        self.check("glBindVertexArray")
    }

    fn delete_vertex_array(&self, v: GlHandle) -> GlResult<()> {
        unsafe { self.gl.delete_vertex_array(vertex_array(v)) };
        self.check("glDeleteVertexArrays")
    }

    fn vertex_attrib_pointer_f32(&self, index: u32, components: u32) -> GlResult<()> {
        unsafe {
            self.gl
                .vertex_attrib_pointer_f32(index, components as i32, ::glow::FLOAT, false, 0, 0)
        };
        self.check("glVertexAttribPointer")
    }

    fn enable_vertex_attrib_array(&self, index: u32) -> GlResult<()> {
        unsafe { self.gl.enable_vertex_attrib_array(index) };
        self.check("glEnableVertexAttribArray")
    }

    fn draw_arrays(&self, mode: PrimitiveMode, first: u32, count: u32) -> GlResult<()> {
        unsafe {
            self.gl
                .draw_arrays(mode.gl_enum(), first as i32, count as i32)
        };
        self.check("glDrawArrays")
    }

    fn draw_elements_u32(&self, mode: PrimitiveMode, count: u32) -> GlResult<()> {
        unsafe {
            self.gl
                .draw_elements(mode.gl_enum(), count as i32, ::glow::UNSIGNED_INT, 0)
        };
        self.check("glDrawElements")
    }

    fn viewport(&self, x: i32, y: i32, width: i32, height: i32) -> GlResult<()> {
        unsafe { self.gl.viewport(x, y, width, height) };
        self.check("glViewport")
    }

    fn clear_color(&self, r: f32, g: f32, b: f32, a: f32) -> GlResult<()> {
        unsafe { self.gl.clear_color(r, g, b, a) };
        self.check("glClearColor")
    }

    fn clear(&self, buffers: ClearBuffers) -> GlResult<()> {
        unsafe { self.gl.clear(buffers.gl_mask()) };
        self.check("glClear")
    }
}
