//! Headless GL emulation.
//!
//! `RecordingBackend` keeps just enough of the GL object model to exercise the
//! resource wrappers without a GPU:
//! - object names, liveness, and deletes of names that are not live
//! - compile/link status with info logs (a stage without `main` fails to compile)
//! - active uniforms, parsed from the `uniform` declarations of the linked stages
//! - active texture unit, per-unit bindings, bound buffers, buffer contents
//! - a textual log of every call, in order
//!
//! Failures can be injected per entry point with [`RecordingBackend::fail_call`].

use std::cell::RefCell;
use std::collections::{BTreeMap, HashMap, HashSet};

use super::{
    BlendFactor, BufferTarget, BufferUsage, ClearBuffers, GlError, GlHandle, GlResult,
    GraphicsBackend, PrimitiveMode, ShaderStage, TextureParameter, TextureTarget,
    UniformLocation, UniformValue,
};

/// Kind of a native object, for liveness queries.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum ObjectKind {
    Shader,
    Program,
    Texture,
    Buffer,
    VertexArray,
}

#[derive(Debug)]
enum Object {
    Shader {
        stage: ShaderStage,
        source: String,
        compiled: bool,
        info_log: String,
    },
    Program {
        attached: Vec<u32>,
        linked: bool,
        info_log: String,
        uniforms: Vec<String>,
        values: BTreeMap<i32, UniformValue>,
    },
    Texture {
        parameters: BTreeMap<TextureParameter, u32>,
    },
    Buffer {
        data: Vec<u8>,
        usage: Option<BufferUsage>,
    },
    VertexArray {
        attributes: BTreeMap<u32, VertexAttribute>,
        element_buffer: Option<u32>,
    },
}

impl Object {
    fn kind(&self) -> ObjectKind {
        match self {
            Self::Shader { .. } => ObjectKind::Shader,
            Self::Program { .. } => ObjectKind::Program,
            Self::Texture { .. } => ObjectKind::Texture,
            Self::Buffer { .. } => ObjectKind::Buffer,
            Self::VertexArray { .. } => ObjectKind::VertexArray,
        }
    }
}

/// Attribute state captured by a vertex array.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct VertexAttribute {
    pub buffer: u32,
    pub components: u32,
    pub enabled: bool,
}

#[derive(Debug)]
struct State {
    next_name: u32,
    objects: HashMap<u32, Object>,
    created: HashMap<ObjectKind, usize>,
    stale_deletes: usize,
    calls: Vec<String>,
    compiled_sources: Vec<(ShaderStage, String)>,

    failing: HashSet<&'static str>,
    fail_link: bool,

    current_program: Option<u32>,
    active_unit: u32,
    texture_units: BTreeMap<u32, (TextureTarget, u32)>,
    bound_buffers: HashMap<BufferTarget, u32>,
    bound_vertex_array: Option<u32>,
    depth_test: bool,
    depth_write: bool,
    blend: [BlendFactor; 4],
    viewport: [i32; 4],
    clear_color: [f32; 4],
    draws: usize,
}

impl Default for State {
    fn default() -> Self {
        Self {
            next_name: 1,
            objects: HashMap::new(),
            created: HashMap::new(),
            stale_deletes: 0,
            calls: Vec::new(),
            compiled_sources: Vec::new(),
            failing: HashSet::new(),
            fail_link: false,
            current_program: None,
            active_unit: 0,
            texture_units: BTreeMap::new(),
            bound_buffers: HashMap::new(),
            bound_vertex_array: None,
            // GL defaults.
            depth_test: false,
            depth_write: true,
            blend: [BlendFactor::One, BlendFactor::Zero, BlendFactor::One, BlendFactor::Zero],
            viewport: [0; 4],
            clear_color: [0.0; 4],
            draws: 0,
        }
    }
}

impl State {
    fn allocate(&mut self, object: Object) -> GlHandle {
        let name = self.next_name;
        self.next_name += 1;
        *self.created.entry(object.kind()).or_default() += 1;
        self.objects.insert(name, object);
        // `next_name` starts at 1 and only grows.
        GlHandle::new(name).unwrap_or_else(|| unreachable!("object names start at 1"))
    }

    fn delete(&mut self, name: u32, kind: ObjectKind) {
        match self.objects.get(&name) {
            Some(object) if object.kind() == kind => {
                self.objects.remove(&name);
            }
            _ => {
                // GL ignores deletes of unknown names; count them so tests can catch
                // double frees.
                self.stale_deletes += 1;
            }
        }
    }

    fn shader_mut(&mut self, call: &'static str, name: u32) -> GlResult<&mut Object> {
        match self.objects.get_mut(&name) {
            Some(object @ Object::Shader { .. }) => Ok(object),
            _ => Err(GlError::new(call, GlError::INVALID_VALUE)),
        }
    }

    fn program_mut(&mut self, call: &'static str, name: u32) -> GlResult<&mut Object> {
        match self.objects.get_mut(&name) {
            Some(object @ Object::Program { .. }) => Ok(object),
            _ => Err(GlError::new(call, GlError::INVALID_VALUE)),
        }
    }

    fn is_live(&self, name: u32, kind: ObjectKind) -> bool {
        self.objects.get(&name).is_some_and(|o| o.kind() == kind)
    }

    fn link(&mut self, program: u32) -> GlResult<()> {
        let attached = match self.objects.get(&program) {
            Some(Object::Program { attached, .. }) => attached.clone(),
            _ => return Err(GlError::new("glLinkProgram", GlError::INVALID_VALUE)),
        };

        let mut stages = Vec::new();
        let mut uniforms: Vec<String> = Vec::new();
        let mut problem = None;
        for name in &attached {
            match self.objects.get(name) {
                Some(Object::Shader { stage, source, compiled, .. }) => {
                    if !compiled {
                        problem = Some(format!("error: attached {stage} shader is not compiled"));
                    }
                    stages.push(*stage);
                    for uniform in declared_uniforms(source) {
                        if !uniforms.contains(&uniform) {
                            uniforms.push(uniform);
                        }
                    }
                }
                _ => problem = Some(format!("error: attached shader {name} no longer exists")),
            }
        }
        for stage in [ShaderStage::Vertex, ShaderStage::Fragment] {
            if !stages.contains(&stage) {
                problem = Some(format!("error: missing {stage} shader"));
            }
        }
        if self.fail_link {
            problem = Some("error: link failure injected".to_string());
        }

        if let Some(Object::Program { linked, info_log, uniforms: active, values, .. }) =
            self.objects.get_mut(&program)
        {
            values.clear();
            match problem {
                Some(log) => {
                    *linked = false;
                    *info_log = log;
                    active.clear();
                }
                None => {
                    *linked = true;
                    info_log.clear();
                    *active = uniforms;
                }
            }
        }
        Ok(())
    }
}

/// Names of the `uniform` variables declared in GLSL source.
fn declared_uniforms(source: &str) -> Vec<String> {
    source
        .lines()
        .map(|line| line.split("//").next().unwrap_or_default().trim())
        .filter_map(|line| line.strip_prefix("uniform "))
        .filter_map(|decl| decl.split(';').next())
        .filter_map(|decl| decl.split_whitespace().last())
        .map(|name| name.split('[').next().unwrap_or(name).to_string())
        .collect()
}

/// In-memory [`GraphicsBackend`] that records every call.
#[derive(Debug, Default)]
pub struct RecordingBackend {
    state: RefCell<State>,
}

impl RecordingBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records `call` and fails it when a failure was injected for its entry point.
    fn enter(&self, entry: &'static str, call: String) -> GlResult<std::cell::RefMut<'_, State>> {
        let mut state = self.state.borrow_mut();
        state.calls.push(call);
        if state.failing.contains(entry) {
            return Err(GlError::new(entry, GlError::INVALID_OPERATION));
        }
        Ok(state)
    }

    // ── failure injection ────────────────────────────────────────────────

    /// Makes every later call to `entry` (e.g. `"glUniform1i"`) fail with
    /// `GL_INVALID_OPERATION` until [`clear_failures`](Self::clear_failures).
    pub fn fail_call(&self, entry: &'static str) {
        self.state.borrow_mut().failing.insert(entry);
    }

    /// Makes later links report failure.
    pub fn fail_link(&self, fail: bool) {
        self.state.borrow_mut().fail_link = fail;
    }

    pub fn clear_failures(&self) {
        let mut state = self.state.borrow_mut();
        state.failing.clear();
        state.fail_link = false;
    }

    // ── call log ─────────────────────────────────────────────────────────

    pub fn calls(&self) -> Vec<String> {
        self.state.borrow().calls.clone()
    }

    /// Returns and clears the call log.
    pub fn take_calls(&self) -> Vec<String> {
        std::mem::take(&mut self.state.borrow_mut().calls)
    }

    /// Number of logged calls whose text starts with `prefix`.
    pub fn count_calls(&self, prefix: &str) -> usize {
        self.state
            .borrow()
            .calls
            .iter()
            .filter(|c| c.starts_with(prefix))
            .count()
    }

    // ── object queries ───────────────────────────────────────────────────

    /// Number of live objects of every kind.
    pub fn live_objects(&self) -> usize {
        self.state.borrow().objects.len()
    }

    pub fn live_count(&self, kind: ObjectKind) -> usize {
        self.state
            .borrow()
            .objects
            .values()
            .filter(|o| o.kind() == kind)
            .count()
    }

    /// Number of objects of `kind` ever created.
    pub fn created_count(&self, kind: ObjectKind) -> usize {
        self.state.borrow().created.get(&kind).copied().unwrap_or(0)
    }

    pub fn is_live(&self, name: u32) -> bool {
        self.state.borrow().objects.contains_key(&name)
    }

    /// Deletes of names that were not live (double frees).
    pub fn stale_deletes(&self) -> usize {
        self.state.borrow().stale_deletes
    }

    /// Every source handed to `glShaderSource`, in order.
    pub fn compiled_sources(&self) -> Vec<(ShaderStage, String)> {
        self.state.borrow().compiled_sources.clone()
    }

    /// Last value written to `name` in `program`.
    pub fn uniform_value(&self, program: u32, name: &str) -> Option<UniformValue> {
        let state = self.state.borrow();
        match state.objects.get(&program) {
            Some(Object::Program { uniforms, values, .. }) => {
                let location = uniforms.iter().position(|u| u == name)? as i32;
                values.get(&location).cloned()
            }
            _ => None,
        }
    }

    pub fn texture_parameter(&self, texture: u32, parameter: TextureParameter) -> Option<u32> {
        match self.state.borrow().objects.get(&texture) {
            Some(Object::Texture { parameters }) => parameters.get(&parameter).copied(),
            _ => None,
        }
    }

    pub fn buffer_contents(&self, buffer: u32) -> Option<Vec<u8>> {
        match self.state.borrow().objects.get(&buffer) {
            Some(Object::Buffer { data, .. }) => Some(data.clone()),
            _ => None,
        }
    }

    /// Buffer contents reinterpreted as `f32`s.
    pub fn buffer_floats(&self, buffer: u32) -> Option<Vec<f32>> {
        self.buffer_contents(buffer)
            .map(|bytes| bytemuck::pod_collect_to_vec::<u8, f32>(&bytes))
    }

    pub fn buffer_usage(&self, buffer: u32) -> Option<BufferUsage> {
        match self.state.borrow().objects.get(&buffer) {
            Some(Object::Buffer { usage, .. }) => *usage,
            _ => None,
        }
    }

    pub fn vertex_attribute(&self, vertex_array: u32, index: u32) -> Option<VertexAttribute> {
        match self.state.borrow().objects.get(&vertex_array) {
            Some(Object::VertexArray { attributes, .. }) => attributes.get(&index).copied(),
            _ => None,
        }
    }

    pub fn element_buffer(&self, vertex_array: u32) -> Option<u32> {
        match self.state.borrow().objects.get(&vertex_array) {
            Some(Object::VertexArray { element_buffer, .. }) => *element_buffer,
            _ => None,
        }
    }

    // ── context state ────────────────────────────────────────────────────

    pub fn current_program(&self) -> Option<u32> {
        self.state.borrow().current_program
    }

    pub fn active_texture_unit(&self) -> u32 {
        self.state.borrow().active_unit
    }

    /// Texture bound on `unit`, with the target it was bound under.
    pub fn bound_texture(&self, unit: u32) -> Option<(TextureTarget, u32)> {
        self.state.borrow().texture_units.get(&unit).copied()
    }

    pub fn depth_test_enabled(&self) -> bool {
        self.state.borrow().depth_test
    }

    pub fn depth_write_enabled(&self) -> bool {
        self.state.borrow().depth_write
    }

    pub fn blend_factors(&self) -> [BlendFactor; 4] {
        self.state.borrow().blend
    }

    pub fn viewport_rect(&self) -> [i32; 4] {
        self.state.borrow().viewport
    }

    pub fn clear_color_value(&self) -> [f32; 4] {
        self.state.borrow().clear_color
    }

    pub fn draw_count(&self) -> usize {
        self.state.borrow().draws
    }
}

fn name(handle: Option<GlHandle>) -> u32 {
    handle.map_or(0, GlHandle::get)
}

impl GraphicsBackend for RecordingBackend {
    fn create_shader(&self, stage: ShaderStage) -> GlResult<GlHandle> {
        let mut state = self.enter("glCreateShader", format!("glCreateShader({stage:?})"))?;
        Ok(state.allocate(Object::Shader {
            stage,
            source: String::new(),
            compiled: false,
            info_log: String::new(),
        }))
    }

    fn shader_source(&self, shader: GlHandle, text: &str) -> GlResult<()> {
        let mut state = self.enter("glShaderSource", format!("glShaderSource({})", shader.get()))?;
        let stage = match state.shader_mut("glShaderSource", shader.get())? {
            Object::Shader { stage, source, .. } => {
                *source = text.to_string();
                *stage
            }
            _ => unreachable!(),
        };
        state.compiled_sources.push((stage, text.to_string()));
        Ok(())
    }

    fn compile_shader(&self, shader: GlHandle) -> GlResult<()> {
        let mut state = self.enter("glCompileShader", format!("glCompileShader({})", shader.get()))?;
        if let Object::Shader { source, compiled, info_log, .. } =
            state.shader_mut("glCompileShader", shader.get())?
        {
            *compiled = source.contains("void main");
            *info_log = if *compiled {
                String::new()
            } else {
                "ERROR: 0:1: 'main' : function not defined".to_string()
            };
        }
        Ok(())
    }

    fn shader_compile_status(&self, shader: GlHandle) -> GlResult<bool> {
        let mut state = self.enter("glGetShaderiv", format!("glGetShaderiv({}, COMPILE_STATUS)", shader.get()))?;
        match state.shader_mut("glGetShaderiv", shader.get())? {
            Object::Shader { compiled, .. } => Ok(*compiled),
            _ => unreachable!(),
        }
    }

    fn shader_info_log(&self, shader: GlHandle) -> GlResult<String> {
        let mut state = self.enter("glGetShaderInfoLog", format!("glGetShaderInfoLog({})", shader.get()))?;
        match state.shader_mut("glGetShaderInfoLog", shader.get())? {
            Object::Shader { info_log, .. } => Ok(info_log.clone()),
            _ => unreachable!(),
        }
    }

    fn delete_shader(&self, shader: GlHandle) -> GlResult<()> {
        let mut state = self.enter("glDeleteShader", format!("glDeleteShader({})", shader.get()))?;
        state.delete(shader.get(), ObjectKind::Shader);
        Ok(())
    }

    fn create_program(&self) -> GlResult<GlHandle> {
        let mut state = self.enter("glCreateProgram", "glCreateProgram()".to_string())?;
        Ok(state.allocate(Object::Program {
            attached: Vec::new(),
            linked: false,
            info_log: String::new(),
            uniforms: Vec::new(),
            values: BTreeMap::new(),
        }))
    }

    fn attach_shader(&self, program: GlHandle, shader: GlHandle) -> GlResult<()> {
        let mut state = self.enter(
            "glAttachShader",
            format!("glAttachShader({}, {})", program.get(), shader.get()),
        )?;
        if !state.is_live(shader.get(), ObjectKind::Shader) {
            return Err(GlError::new("glAttachShader", GlError::INVALID_VALUE));
        }
        if let Object::Program { attached, .. } = state.program_mut("glAttachShader", program.get())? {
            attached.push(shader.get());
        }
        Ok(())
    }

    fn link_program(&self, program: GlHandle) -> GlResult<()> {
        let mut state = self.enter("glLinkProgram", format!("glLinkProgram({})", program.get()))?;
        state.link(program.get())
    }

    fn program_link_status(&self, program: GlHandle) -> GlResult<bool> {
        let mut state = self.enter("glGetProgramiv", format!("glGetProgramiv({}, LINK_STATUS)", program.get()))?;
        match state.program_mut("glGetProgramiv", program.get())? {
            Object::Program { linked, .. } => Ok(*linked),
            _ => unreachable!(),
        }
    }

    fn program_info_log(&self, program: GlHandle) -> GlResult<String> {
        let mut state = self.enter("glGetProgramInfoLog", format!("glGetProgramInfoLog({})", program.get()))?;
        match state.program_mut("glGetProgramInfoLog", program.get())? {
            Object::Program { info_log, .. } => Ok(info_log.clone()),
            _ => unreachable!(),
        }
    }

    fn delete_program(&self, program: GlHandle) -> GlResult<()> {
        let mut state = self.enter("glDeleteProgram", format!("glDeleteProgram({})", program.get()))?;
        state.delete(program.get(), ObjectKind::Program);
        if state.current_program == Some(program.get()) {
            state.current_program = None;
        }
        Ok(())
    }

    fn use_program(&self, program: Option<GlHandle>) -> GlResult<()> {
        let mut state = self.enter("glUseProgram", format!("glUseProgram({})", name(program)))?;
        if let Some(p) = program {
            match state.program_mut("glUseProgram", p.get())? {
                Object::Program { linked: true, .. } => {}
                _ => return Err(GlError::new("glUseProgram", GlError::INVALID_OPERATION)),
            }
        }
        state.current_program = program.map(GlHandle::get);
        Ok(())
    }

    fn uniform_location(&self, program: GlHandle, uniform: &str) -> GlResult<Option<UniformLocation>> {
        let mut state = self.enter(
            "glGetUniformLocation",
            format!("glGetUniformLocation({}, {uniform})", program.get()),
        )?;
        match state.program_mut("glGetUniformLocation", program.get())? {
            Object::Program { linked: true, uniforms, .. } => Ok(uniforms
                .iter()
                .position(|u| u == uniform)
                .map(|i| UniformLocation(i as i32))),
            _ => Err(GlError::new("glGetUniformLocation", GlError::INVALID_OPERATION)),
        }
    }

    fn uniform(&self, location: UniformLocation, value: &UniformValue) -> GlResult<()> {
        let entry = match value {
            UniformValue::Int(_) => "glUniform1i",
            UniformValue::Float(_) => "glUniform1f",
            UniformValue::Vec2(_) => "glUniform2f",
            UniformValue::Vec3(_) => "glUniform3f",
            UniformValue::Vec4(_) => "glUniform4f",
            UniformValue::Mat3(_) => "glUniformMatrix3fv",
            UniformValue::Mat4(_) => "glUniformMatrix4fv",
            UniformValue::IntArray(_) => "glUniform1iv",
            UniformValue::FloatArray(_) => "glUniform1fv",
        };
        let mut state = self.enter(entry, format!("{entry}({}, {value:?})", location.0))?;
        let Some(program) = state.current_program else {
            return Err(GlError::new(entry, GlError::INVALID_OPERATION));
        };
        if let Object::Program { uniforms, values, .. } = state.program_mut(entry, program)? {
            if location.0 < 0 || location.0 as usize >= uniforms.len() {
                return Err(GlError::new(entry, GlError::INVALID_OPERATION));
            }
            values.insert(location.0, value.clone());
        }
        Ok(())
    }

    fn blend_func_separate(
        &self,
        src_rgb: BlendFactor,
        dst_rgb: BlendFactor,
        src_alpha: BlendFactor,
        dst_alpha: BlendFactor,
    ) -> GlResult<()> {
        let mut state = self.enter(
            "glBlendFuncSeparate",
            format!("glBlendFuncSeparate({src_rgb:?}, {dst_rgb:?}, {src_alpha:?}, {dst_alpha:?})"),
        )?;
        state.blend = [src_rgb, dst_rgb, src_alpha, dst_alpha];
        Ok(())
    }

    fn depth_mask(&self, write: bool) -> GlResult<()> {
        let mut state = self.enter("glDepthMask", format!("glDepthMask({write})"))?;
        state.depth_write = write;
        Ok(())
    }

    fn set_depth_test(&self, enabled: bool) -> GlResult<()> {
        let mut state = if enabled {
            self.enter("glEnable", "glEnable(DEPTH_TEST)".to_string())?
        } else {
            self.enter("glDisable", "glDisable(DEPTH_TEST)".to_string())?
        };
        state.depth_test = enabled;
        Ok(())
    }

    fn create_texture(&self) -> GlResult<GlHandle> {
        let mut state = self.enter("glGenTextures", "glGenTextures()".to_string())?;
        Ok(state.allocate(Object::Texture {
            parameters: BTreeMap::new(),
        }))
    }

    fn bind_texture(&self, target: TextureTarget, texture: Option<GlHandle>) -> GlResult<()> {
        let mut state = self.enter(
            "glBindTexture",
            format!("glBindTexture({target:?}, {})", name(texture)),
        )?;
        let unit = state.active_unit;
        match texture {
            Some(t) => {
                if !state.is_live(t.get(), ObjectKind::Texture) {
                    return Err(GlError::new("glBindTexture", GlError::INVALID_VALUE));
                }
                state.texture_units.insert(unit, (target, t.get()));
            }
            None => {
                state.texture_units.remove(&unit);
            }
        }
        Ok(())
    }

    fn tex_parameter(
        &self,
        target: TextureTarget,
        parameter: TextureParameter,
        value: u32,
    ) -> GlResult<()> {
        let mut state = self.enter(
            "glTexParameteri",
            format!("glTexParameteri({target:?}, {parameter:?}, 0x{value:04X})"),
        )?;
        let unit = state.active_unit;
        let bound = match state.texture_units.get(&unit) {
            Some((bound_target, texture)) if *bound_target == target => *texture,
            _ => return Err(GlError::new("glTexParameteri", GlError::INVALID_OPERATION)),
        };
        if let Some(Object::Texture { parameters }) = state.objects.get_mut(&bound) {
            parameters.insert(parameter, value);
        }
        Ok(())
    }

    fn delete_texture(&self, texture: GlHandle) -> GlResult<()> {
        let mut state = self.enter("glDeleteTextures", format!("glDeleteTextures({})", texture.get()))?;
        state.delete(texture.get(), ObjectKind::Texture);
        state.texture_units.retain(|_, (_, t)| *t != texture.get());
        Ok(())
    }

    fn active_texture(&self, unit: u32) -> GlResult<()> {
        let mut state = self.enter("glActiveTexture", format!("glActiveTexture({unit})"))?;
        state.active_unit = unit;
        Ok(())
    }

    fn create_buffer(&self) -> GlResult<GlHandle> {
        let mut state = self.enter("glGenBuffers", "glGenBuffers()".to_string())?;
        Ok(state.allocate(Object::Buffer {
            data: Vec::new(),
            usage: None,
        }))
    }

    fn bind_buffer(&self, target: BufferTarget, buffer: Option<GlHandle>) -> GlResult<()> {
        let mut state = self.enter(
            "glBindBuffer",
            format!("glBindBuffer({target:?}, {})", name(buffer)),
        )?;
        match buffer {
            Some(b) => {
                if !state.is_live(b.get(), ObjectKind::Buffer) {
                    return Err(GlError::new("glBindBuffer", GlError::INVALID_VALUE));
                }
                state.bound_buffers.insert(target, b.get());
            }
            None => {
                state.bound_buffers.remove(&target);
            }
        }
        // The element binding is vertex array state.
        if target == BufferTarget::ElementArray {
            if let Some(vao) = state.bound_vertex_array {
                if let Some(Object::VertexArray { element_buffer, .. }) = state.objects.get_mut(&vao) {
                    *element_buffer = buffer.map(GlHandle::get);
                }
            }
        }
        Ok(())
    }

    fn buffer_data(&self, target: BufferTarget, bytes: &[u8], usage: BufferUsage) -> GlResult<()> {
        let mut state = self.enter(
            "glBufferData",
            format!("glBufferData({target:?}, {} bytes, {usage:?})", bytes.len()),
        )?;
        let Some(bound) = state.bound_buffers.get(&target).copied() else {
            return Err(GlError::new("glBufferData", GlError::INVALID_OPERATION));
        };
        if let Some(Object::Buffer { data, usage: u }) = state.objects.get_mut(&bound) {
            *data = bytes.to_vec();
            *u = Some(usage);
        }
        Ok(())
    }

    fn buffer_sub_data(&self, target: BufferTarget, offset: usize, bytes: &[u8]) -> GlResult<()> {
        let mut state = self.enter(
            "glBufferSubData",
            format!("glBufferSubData({target:?}, {offset}, {} bytes)", bytes.len()),
        )?;
        let Some(bound) = state.bound_buffers.get(&target).copied() else {
            return Err(GlError::new("glBufferSubData", GlError::INVALID_OPERATION));
        };
        if let Some(Object::Buffer { data, .. }) = state.objects.get_mut(&bound) {
            let end = offset + bytes.len();
            if end > data.len() {
                return Err(GlError::new("glBufferSubData", GlError::INVALID_VALUE));
            }
            data[offset..end].copy_from_slice(bytes);
        }
        Ok(())
    }

    fn delete_buffer(&self, buffer: GlHandle) -> GlResult<()> {
        let mut state = self.enter("glDeleteBuffers", format!("glDeleteBuffers({})", buffer.get()))?;
        state.delete(buffer.get(), ObjectKind::Buffer);
        state.bound_buffers.retain(|_, b| *b != buffer.get());
        Ok(())
    }

    fn create_vertex_array(&self) -> GlResult<GlHandle> {
        let mut state = self.enter("glGenVertexArrays", "glGenVertexArrays()".to_string())?;
        Ok(state.allocate(Object::VertexArray {
            attributes: BTreeMap::new(),
            element_buffer: None,
        }))
    }

    fn bind_vertex_array(&self, vertex_array: Option<GlHandle>) -> GlResult<()> {
        let mut state = self.enter(
            "glBindVertexArray",
            format!("glBindVertexArray({})", name(vertex_array)),
        )?;
        if let Some(v) = vertex_array {
            if !state.is_live(v.get(), ObjectKind::VertexArray) {
                return Err(GlError::new("glBindVertexArray", GlError::INVALID_OPERATION));
            }
        }
        state.bound_vertex_array = vertex_array.map(GlHandle::get);
        Ok(())
    }

    fn delete_vertex_array(&self, vertex_array: GlHandle) -> GlResult<()> {
        let mut state = self.enter(
            "glDeleteVertexArrays",
            format!("glDeleteVertexArrays({})", vertex_array.get()),
        )?;
        state.delete(vertex_array.get(), ObjectKind::VertexArray);
        if state.bound_vertex_array == Some(vertex_array.get()) {
            state.bound_vertex_array = None;
        }
        Ok(())
    }

    fn vertex_attrib_pointer_f32(&self, index: u32, components: u32) -> GlResult<()> {
        let mut state = self.enter(
            "glVertexAttribPointer",
            format!("glVertexAttribPointer({index}, {components}, FLOAT)"),
        )?;
        let (Some(vao), Some(buffer)) = (
            state.bound_vertex_array,
            state.bound_buffers.get(&BufferTarget::Array).copied(),
        ) else {
            return Err(GlError::new("glVertexAttribPointer", GlError::INVALID_OPERATION));
        };
        if let Some(Object::VertexArray { attributes, .. }) = state.objects.get_mut(&vao) {
            let attribute = attributes.entry(index).or_insert(VertexAttribute {
                buffer,
                components,
                enabled: false,
            });
            attribute.buffer = buffer;
            attribute.components = components;
        }
        Ok(())
    }

    fn enable_vertex_attrib_array(&self, index: u32) -> GlResult<()> {
        let mut state = self.enter(
            "glEnableVertexAttribArray",
            format!("glEnableVertexAttribArray({index})"),
        )?;
        let Some(vao) = state.bound_vertex_array else {
            return Err(GlError::new("glEnableVertexAttribArray", GlError::INVALID_OPERATION));
        };
        if let Some(Object::VertexArray { attributes, .. }) = state.objects.get_mut(&vao) {
            match attributes.get_mut(&index) {
                Some(attribute) => attribute.enabled = true,
                None => return Err(GlError::new("glEnableVertexAttribArray", GlError::INVALID_VALUE)),
            }
        }
        Ok(())
    }

    fn draw_arrays(&self, mode: PrimitiveMode, first: u32, count: u32) -> GlResult<()> {
        let mut state = self.enter(
            "glDrawArrays",
            format!("glDrawArrays({mode:?}, {first}, {count})"),
        )?;
        if state.current_program.is_none() || state.bound_vertex_array.is_none() {
            return Err(GlError::new("glDrawArrays", GlError::INVALID_OPERATION));
        }
        state.draws += 1;
        Ok(())
    }

    fn draw_elements_u32(&self, mode: PrimitiveMode, count: u32) -> GlResult<()> {
        let mut state = self.enter(
            "glDrawElements",
            format!("glDrawElements({mode:?}, {count}, UNSIGNED_INT)"),
        )?;
        let has_elements = state
            .bound_vertex_array
            .and_then(|vao| match state.objects.get(&vao) {
                Some(Object::VertexArray { element_buffer, .. }) => *element_buffer,
                _ => None,
            })
            .is_some();
        if state.current_program.is_none() || !has_elements {
            return Err(GlError::new("glDrawElements", GlError::INVALID_OPERATION));
        }
        state.draws += 1;
        Ok(())
    }

    fn viewport(&self, x: i32, y: i32, width: i32, height: i32) -> GlResult<()> {
        let mut state = self.enter("glViewport", format!("glViewport({x}, {y}, {width}, {height})"))?;
        state.viewport = [x, y, width, height];
        Ok(())
    }

    fn clear_color(&self, r: f32, g: f32, b: f32, a: f32) -> GlResult<()> {
        let mut state = self.enter("glClearColor", format!("glClearColor({r}, {g}, {b}, {a})"))?;
        state.clear_color = [r, g, b, a];
        Ok(())
    }

    fn clear(&self, buffers: ClearBuffers) -> GlResult<()> {
        let _state = self.enter("glClear", format!("glClear({buffers:?})"))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const VERT: &str = "#version 300 es\nuniform mat4 u_Mvp;\nvoid main() {}\n";
    const FRAG: &str = "#version 300 es\nprecision mediump float;\nuniform sampler2D u_Tex; // color\nuniform float u_Weights[4];\nvoid main() {}\n";

    fn linked(gl: &RecordingBackend) -> GlHandle {
        let vs = gl.create_shader(ShaderStage::Vertex).unwrap();
        gl.shader_source(vs, VERT).unwrap();
        gl.compile_shader(vs).unwrap();
        let fs = gl.create_shader(ShaderStage::Fragment).unwrap();
        gl.shader_source(fs, FRAG).unwrap();
        gl.compile_shader(fs).unwrap();
        let p = gl.create_program().unwrap();
        gl.attach_shader(p, vs).unwrap();
        gl.attach_shader(p, fs).unwrap();
        gl.link_program(p).unwrap();
        p
    }

    #[test]
    fn parses_uniform_declarations() {
        assert_eq!(
            declared_uniforms(FRAG),
            vec!["u_Tex".to_string(), "u_Weights".to_string()]
        );
    }

    #[test]
    fn linked_program_exposes_declared_uniforms() {
        let gl = RecordingBackend::new();
        let p = linked(&gl);
        assert!(gl.program_link_status(p).unwrap());
        assert_eq!(gl.uniform_location(p, "u_Mvp").unwrap(), Some(UniformLocation(0)));
        assert_eq!(gl.uniform_location(p, "u_Tex").unwrap(), Some(UniformLocation(1)));
        assert_eq!(gl.uniform_location(p, "u_Missing").unwrap(), None);
    }

    #[test]
    fn stage_without_main_fails_to_compile() {
        let gl = RecordingBackend::new();
        let s = gl.create_shader(ShaderStage::Fragment).unwrap();
        gl.shader_source(s, "#version 300 es\n").unwrap();
        gl.compile_shader(s).unwrap();
        assert!(!gl.shader_compile_status(s).unwrap());
        assert!(gl.shader_info_log(s).unwrap().contains("main"));
    }

    #[test]
    fn injected_failures_are_reported_and_logged() {
        let gl = RecordingBackend::new();
        gl.fail_call("glGenTextures");
        let err = gl.create_texture().unwrap_err();
        assert_eq!(err.code, GlError::INVALID_OPERATION);
        assert_eq!(gl.calls(), vec!["glGenTextures()".to_string()]);
        gl.clear_failures();
        assert!(gl.create_texture().is_ok());
    }

    #[test]
    fn deleting_a_dead_name_counts_as_stale() {
        let gl = RecordingBackend::new();
        let t = gl.create_texture().unwrap();
        gl.delete_texture(t).unwrap();
        assert_eq!(gl.stale_deletes(), 0);
        gl.delete_texture(t).unwrap();
        assert_eq!(gl.stale_deletes(), 1);
        assert_eq!(gl.live_objects(), 0);
    }

    #[test]
    fn sub_data_past_the_end_is_rejected() {
        let gl = RecordingBackend::new();
        let b = gl.create_buffer().unwrap();
        gl.bind_buffer(BufferTarget::Array, Some(b)).unwrap();
        gl.buffer_data(BufferTarget::Array, &[0; 8], BufferUsage::DynamicDraw).unwrap();
        assert!(gl.buffer_sub_data(BufferTarget::Array, 4, &[1; 4]).is_ok());
        assert!(gl.buffer_sub_data(BufferTarget::Array, 6, &[1; 4]).is_err());
        assert_eq!(gl.buffer_contents(b.get()).unwrap(), vec![0, 0, 0, 0, 1, 1, 1, 1]);
    }

    #[test]
    fn buffer_contents_read_back_as_floats() {
        let gl = RecordingBackend::new();
        let b = gl.create_buffer().unwrap();
        gl.bind_buffer(BufferTarget::Array, Some(b)).unwrap();
        let floats = [0.5f32, -1.0, 2.25];
        gl.buffer_data(BufferTarget::Array, bytemuck::cast_slice(&floats), BufferUsage::StaticDraw)
            .unwrap();
        assert_eq!(gl.buffer_floats(b.get()).unwrap(), floats.to_vec());
        assert_eq!(gl.buffer_floats(9999), None);
    }
}
