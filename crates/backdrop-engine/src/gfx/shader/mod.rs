//! Shader programs with deferred uniform state.
//!
//! A [`ShaderProgram`] caches uniform locations and queues uniform writes until
//! [`activate`](ShaderProgram::activate). Textures get a texture unit the first
//! time their uniform is set and keep it for the program's lifetime; activation
//! re-binds every texture, so the shared unit bindings may be clobbered between
//! draws.

mod defines;
mod uniform;

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::rc::Rc;

use crate::assets::AssetSource;
use crate::backend::{
    raw_or_zero, BlendFactor, GlHandle, GraphicsBackend, ShaderStage, UniformLocation,
    UniformValue,
};
use crate::error::{GlContext, RenderError, Result};
use crate::gfx::Texture;

pub use defines::{defines_code, insert_defines, Defines};
pub use uniform::PendingUniform;

/// A linked vertex + fragment program.
pub struct ShaderProgram<B: GraphicsBackend> {
    gl: Rc<B>,
    program: Option<GlHandle>,
    uniform_locations: HashMap<String, UniformLocation>,
    uniform_names: HashMap<UniformLocation, String>,
    pending: BTreeMap<UniformLocation, PendingUniform<B>>,
    next_texture_unit: u32,
    depth_test: bool,
    depth_write: bool,
    blend: [BlendFactor; 4],
}

impl<B: GraphicsBackend> ShaderProgram<B> {
    /// Compiles both stages and links them.
    ///
    /// `defines` are injected into both stages. Nothing native outlives a failed
    /// build: stage objects are always deleted and the program is released on error.
    pub fn new(
        gl: Rc<B>,
        vertex_source: &str,
        fragment_source: &str,
        defines: &Defines,
    ) -> Result<Self> {
        let code = defines_code(defines);
        let vertex_source = insert_defines(vertex_source, &code);
        let fragment_source = insert_defines(fragment_source, &code);

        let mut stages = StageSet::new(&*gl);
        let vertex = stages.compile(ShaderStage::Vertex, &vertex_source)?;
        let fragment = stages.compile(ShaderStage::Fragment, &fragment_source)?;

        let id = gl
            .create_program()
            .gl_context("shader program creation failed")?;
        let program = Self {
            gl: gl.clone(),
            program: Some(id),
            uniform_locations: HashMap::new(),
            uniform_names: HashMap::new(),
            pending: BTreeMap::new(),
            next_texture_unit: 0,
            depth_test: true,
            depth_write: true,
            blend: [BlendFactor::One, BlendFactor::Zero, BlendFactor::One, BlendFactor::Zero],
        };

        gl.attach_shader(id, vertex)
            .gl_context("failed to attach vertex shader")?;
        gl.attach_shader(id, fragment)
            .gl_context("failed to attach fragment shader")?;
        gl.link_program(id).gl_context("failed to link shader program")?;
        let linked = gl
            .program_link_status(id)
            .gl_context("failed to query link status")?;
        if !linked {
            let log = gl
                .program_info_log(id)
                .gl_context("failed to retrieve link log")?;
            log::error!("shader program link failed: {log}");
            return Err(RenderError::Link { log });
        }

        log::debug!("linked shader program {}", id.get());
        Ok(program)
    }

    /// Reads both stage sources from `assets`, then builds the program.
    pub fn from_assets(
        gl: Rc<B>,
        assets: &impl AssetSource,
        vertex_name: &str,
        fragment_name: &str,
        defines: &Defines,
    ) -> Result<Self> {
        let vertex_source = assets.read_text(vertex_name)?;
        let fragment_source = assets.read_text(fragment_name)?;
        Self::new(gl, &vertex_source, &fragment_source, defines)
    }

    fn live_program(&self) -> Result<GlHandle> {
        self.program
            .ok_or_else(|| RenderError::precondition("attempted to use a released shader program"))
    }

    /// Location of the active uniform `name`. Resolved once, then cached.
    pub fn uniform_location(&mut self, name: &str) -> Result<UniformLocation> {
        if let Some(&location) = self.uniform_locations.get(name) {
            return Ok(location);
        }
        let program = self.live_program()?;
        let location = self
            .gl
            .uniform_location(program, name)
            .gl_context("failed to find uniform")?
            .ok_or_else(|| RenderError::UniformNotFound {
                name: name.to_string(),
            })?;
        self.uniform_locations.insert(name.to_string(), location);
        self.uniform_names.insert(location, name.to_string());
        Ok(location)
    }

    /// Binds `texture` to the sampler uniform `name`.
    ///
    /// A sampler keeps the texture unit it was first given.
    pub fn set_texture(&mut self, name: &str, texture: Rc<Texture<B>>) -> Result<&mut Self> {
        let location = self.uniform_location(name)?;
        let unit = match self.pending.get(&location) {
            Some(PendingUniform::Texture { unit, .. }) => *unit,
            _ => {
                let unit = self.next_texture_unit;
                self.next_texture_unit += 1;
                unit
            }
        };
        self.pending
            .insert(location, PendingUniform::Texture { unit, texture });
        Ok(self)
    }

    /// Queues a value for uniform `name`, replacing whatever was queued for it.
    pub fn set_uniform(&mut self, name: &str, value: impl Into<UniformValue>) -> Result<&mut Self> {
        let location = self.uniform_location(name)?;
        self.pending
            .insert(location, PendingUniform::Value(value.into()));
        Ok(self)
    }

    pub fn set_bool(&mut self, name: &str, v: bool) -> Result<&mut Self> {
        self.set_uniform(name, v)
    }

    pub fn set_int(&mut self, name: &str, v: i32) -> Result<&mut Self> {
        self.set_uniform(name, v)
    }

    pub fn set_float(&mut self, name: &str, v: f32) -> Result<&mut Self> {
        self.set_uniform(name, v)
    }

    pub fn set_vec2(&mut self, name: &str, v: [f32; 2]) -> Result<&mut Self> {
        self.set_uniform(name, UniformValue::Vec2(v))
    }

    pub fn set_vec3(&mut self, name: &str, v: [f32; 3]) -> Result<&mut Self> {
        self.set_uniform(name, UniformValue::Vec3(v))
    }

    pub fn set_vec4(&mut self, name: &str, v: [f32; 4]) -> Result<&mut Self> {
        self.set_uniform(name, UniformValue::Vec4(v))
    }

    /// Column-major 3x3 matrix.
    pub fn set_mat3(&mut self, name: &str, m: [f32; 9]) -> Result<&mut Self> {
        self.set_uniform(name, UniformValue::Mat3(m))
    }

    /// Column-major 4x4 matrix.
    pub fn set_mat4(&mut self, name: &str, m: [f32; 16]) -> Result<&mut Self> {
        self.set_uniform(name, UniformValue::Mat4(m))
    }

    pub fn set_float_array(&mut self, name: &str, values: &[f32]) -> Result<&mut Self> {
        self.set_uniform(name, UniformValue::FloatArray(values.to_vec()))
    }

    pub fn set_int_array(&mut self, name: &str, values: &[i32]) -> Result<&mut Self> {
        self.set_uniform(name, UniformValue::IntArray(values.to_vec()))
    }

    pub fn set_depth_test(&mut self, enabled: bool) -> &mut Self {
        self.depth_test = enabled;
        self
    }

    pub fn set_depth_write(&mut self, enabled: bool) -> &mut Self {
        self.depth_write = enabled;
        self
    }

    /// Same factors for color and alpha.
    pub fn set_blend(&mut self, src: BlendFactor, dst: BlendFactor) -> &mut Self {
        self.blend = [src, dst, src, dst];
        self
    }

    /// Independent factors for color and alpha, e.g. premultiplied color over a
    /// destination whose alpha must stay opaque.
    pub fn set_blend_separate(
        &mut self,
        src_rgb: BlendFactor,
        dst_rgb: BlendFactor,
        src_alpha: BlendFactor,
        dst_alpha: BlendFactor,
    ) -> &mut Self {
        self.blend = [src_rgb, dst_rgb, src_alpha, dst_alpha];
        self
    }

    pub fn with_texture(mut self, name: &str, texture: Rc<Texture<B>>) -> Result<Self> {
        self.set_texture(name, texture)?;
        Ok(self)
    }

    pub fn with_depth_test(mut self, enabled: bool) -> Self {
        self.set_depth_test(enabled);
        self
    }

    pub fn with_depth_write(mut self, enabled: bool) -> Self {
        self.set_depth_write(enabled);
        self
    }

    /// Makes this the current program and flushes queued state.
    ///
    /// Applies blend, depth write and depth test, then every pending uniform in
    /// location order. Plain values are dropped once all entries applied; texture
    /// bindings stay queued and are re-applied on every activation. Texture unit 0
    /// is active again when this returns, whether it succeeds or not.
    pub fn activate(&mut self) -> Result<()> {
        let program = self.live_program()?;
        let gl = &*self.gl;

        gl.use_program(Some(program))
            .gl_context("failed to use shader program")?;
        let [src_rgb, dst_rgb, src_alpha, dst_alpha] = self.blend;
        gl.blend_func_separate(src_rgb, dst_rgb, src_alpha, dst_alpha)
            .gl_context("failed to set blend mode")?;
        gl.depth_mask(self.depth_write)
            .gl_context("failed to set depth write mask")?;
        gl.set_depth_test(self.depth_test)
            .gl_context("failed to set depth test mode")?;

        let _unit_reset = TextureUnitReset(gl);
        for (&location, uniform) in &self.pending {
            let name = self
                .uniform_names
                .get(&location)
                .map_or("<unnamed>", String::as_str);
            if let PendingUniform::Texture { texture, .. } = uniform {
                if texture.is_released() {
                    return Err(RenderError::precondition(format!(
                        "texture bound to uniform `{name}` was released"
                    )));
                }
            }
            uniform
                .apply(gl, location)
                .map_err(|source| RenderError::Uniform {
                    name: name.to_string(),
                    source,
                })?;
        }
        self.pending.retain(|_, uniform| uniform.is_texture());
        Ok(())
    }

    /// Deletes the native program. Idempotent.
    pub fn release(&mut self) {
        if let Some(id) = self.program.take() {
            match self.gl.delete_program(id) {
                Ok(()) => log::debug!("released shader program {}", id.get()),
                Err(err) => log::warn!("failed to free shader program {}: {err}", id.get()),
            }
        }
    }

    /// Native program name; `0` once released.
    pub fn program_id(&self) -> u32 {
        raw_or_zero(self.program)
    }

    pub fn is_released(&self) -> bool {
        self.program.is_none()
    }

    /// Number of texture units handed out so far.
    pub fn texture_units_in_use(&self) -> u32 {
        self.next_texture_unit
    }

    /// Whether a write to `name` is queued.
    pub fn has_pending(&self, name: &str) -> bool {
        self.uniform_locations
            .get(name)
            .is_some_and(|location| self.pending.contains_key(location))
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    pub fn depth_test(&self) -> bool {
        self.depth_test
    }

    pub fn depth_write(&self) -> bool {
        self.depth_write
    }

    pub fn blend(&self) -> [BlendFactor; 4] {
        self.blend
    }
}

impl<B: GraphicsBackend> Drop for ShaderProgram<B> {
    fn drop(&mut self) {
        self.release();
    }
}

impl<B: GraphicsBackend> fmt::Debug for ShaderProgram<B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ShaderProgram")
            .field("program", &self.program_id())
            .field("pending", &self.pending)
            .field("texture_units", &self.next_texture_unit)
            .field("depth_test", &self.depth_test)
            .field("depth_write", &self.depth_write)
            .field("blend", &self.blend)
            .finish()
    }
}

/// Compiled stages of a program under construction; deleted on drop.
///
/// A linked program keeps its own copy of the code, so stages are never needed
/// past linking.
struct StageSet<'a, B: GraphicsBackend> {
    gl: &'a B,
    stages: Vec<GlHandle>,
}

impl<'a, B: GraphicsBackend> StageSet<'a, B> {
    fn new(gl: &'a B) -> Self {
        Self {
            gl,
            stages: Vec::with_capacity(2),
        }
    }

    fn compile(&mut self, stage: ShaderStage, source: &str) -> Result<GlHandle> {
        let gl = self.gl;
        let id = gl
            .create_shader(stage)
            .gl_context("shader stage creation failed")?;
        self.stages.push(id);

        gl.shader_source(id, source)
            .gl_context("failed to set shader source")?;
        gl.compile_shader(id)
            .gl_context("failed to compile shader")?;
        let compiled = gl
            .shader_compile_status(id)
            .gl_context("failed to query compile status")?;
        if !compiled {
            let log = gl
                .shader_info_log(id)
                .gl_context("failed to retrieve compile log")?;
            log::error!("{stage} shader compilation failed: {log}");
            return Err(RenderError::Compile { stage, log });
        }
        Ok(id)
    }
}

impl<B: GraphicsBackend> Drop for StageSet<'_, B> {
    fn drop(&mut self) {
        for id in self.stages.drain(..) {
            if let Err(err) = self.gl.delete_shader(id) {
                log::warn!("failed to free shader stage {}: {err}", id.get());
            }
        }
    }
}

/// Re-selects texture unit 0 when dropped.
struct TextureUnitReset<'a, B: GraphicsBackend>(&'a B);

impl<B: GraphicsBackend> Drop for TextureUnitReset<'_, B> {
    fn drop(&mut self) {
        if let Err(err) = self.0.active_texture(0) {
            log::warn!("failed to reset active texture unit: {err}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assets::MemoryAssets;
    use crate::backend::recording::ObjectKind;
    use crate::backend::{RecordingBackend, TextureTarget, WrapMode};

    const VERT: &str = "#version 300 es\nuniform mat4 u_Mvp;\nvoid main() {}\n";
    const FRAG: &str = "#version 300 es\n\
        precision mediump float;\n\
        uniform sampler2D u_Tex;\n\
        uniform sampler2D u_Other;\n\
        uniform float u_Opacity;\n\
        void main() {}\n";

    fn gl() -> Rc<RecordingBackend> {
        Rc::new(RecordingBackend::new())
    }

    fn program(gl: &Rc<RecordingBackend>) -> ShaderProgram<RecordingBackend> {
        ShaderProgram::new(gl.clone(), VERT, FRAG, &Defines::new()).unwrap()
    }

    fn texture(gl: &Rc<RecordingBackend>) -> Rc<Texture<RecordingBackend>> {
        Rc::new(Texture::new(gl.clone(), TextureTarget::Texture2d, WrapMode::ClampToEdge, false).unwrap())
    }

    #[test]
    fn defines_reach_both_stages() {
        let gl = gl();
        let defines = Defines::from([("USE_FOO".to_string(), "1".to_string())]);
        let _program = ShaderProgram::new(gl.clone(), "#version 300 es\nvoid main(){}", FRAG, &defines).unwrap();

        let sources = gl.compiled_sources();
        assert_eq!(sources.len(), 2);
        assert_eq!(sources[0], (ShaderStage::Vertex, "#version 300 es\n#define USE_FOO 1\n\nvoid main(){}".to_string()));
        assert!(sources[1].1.starts_with("#version 300 es\n#define USE_FOO 1\n\nprecision"));
    }

    #[test]
    fn stages_are_deleted_after_linking() {
        let gl = gl();
        let program = program(&gl);
        assert_eq!(gl.live_count(ObjectKind::Shader), 0);
        assert_eq!(gl.live_count(ObjectKind::Program), 1);
        assert_ne!(program.program_id(), 0);
    }

    #[test]
    fn compile_failure_reports_stage_and_leaks_nothing() {
        let gl = gl();
        let err = ShaderProgram::new(gl.clone(), VERT, "#version 300 es\n", &Defines::new()).unwrap_err();
        match err {
            RenderError::Compile { stage, log } => {
                assert_eq!(stage, ShaderStage::Fragment);
                assert!(log.contains("main"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(gl.live_objects(), 0);
        assert_eq!(gl.created_count(ObjectKind::Program), 0);
    }

    #[test]
    fn link_failure_releases_program_and_stages() {
        let gl = gl();
        gl.fail_link(true);
        let err = ShaderProgram::new(gl.clone(), VERT, FRAG, &Defines::new()).unwrap_err();
        assert!(matches!(err, RenderError::Link { ref log } if log.contains("injected")));
        assert_eq!(gl.live_objects(), 0);
        assert_eq!(gl.stale_deletes(), 0);
    }

    #[test]
    fn from_assets_reads_both_stages() {
        let gl = gl();
        let assets = MemoryAssets::new().with("a.vert", VERT).with("a.frag", FRAG);
        assert!(ShaderProgram::from_assets(gl.clone(), &assets, "a.vert", "a.frag", &Defines::new()).is_ok());

        let err = ShaderProgram::from_assets(gl, &assets, "a.vert", "missing.frag", &Defines::new()).unwrap_err();
        assert!(matches!(err, RenderError::Asset { ref name, .. } if name == "missing.frag"));
    }

    #[test]
    fn uniform_locations_are_resolved_once() {
        let gl = gl();
        let mut program = program(&gl);
        let first = program.uniform_location("u_Opacity").unwrap();
        let second = program.uniform_location("u_Opacity").unwrap();
        assert_eq!(first, second);
        assert_eq!(gl.count_calls("glGetUniformLocation"), 1);
    }

    #[test]
    fn unknown_uniform_is_an_error() {
        let gl = gl();
        let mut program = program(&gl);
        let err = program.set_float("u_Missing", 1.0).unwrap_err();
        assert!(matches!(err, RenderError::UniformNotFound { ref name } if name == "u_Missing"));
    }

    #[test]
    fn resetting_a_texture_reuses_its_unit() {
        let gl = gl();
        let mut program = program(&gl);
        let a = texture(&gl);
        let b = texture(&gl);

        program.set_texture("u_Tex", a).unwrap();
        program.set_texture("u_Tex", b.clone()).unwrap();
        assert_eq!(program.texture_units_in_use(), 1);

        program.set_texture("u_Other", b.clone()).unwrap();
        assert_eq!(program.texture_units_in_use(), 2);

        program.activate().unwrap();
        let location = program.uniform_location("u_Tex").unwrap();
        assert!(matches!(
            program.pending.get(&location),
            Some(PendingUniform::Texture { unit: 0, .. })
        ));
        assert_eq!(gl.bound_texture(0), Some((TextureTarget::Texture2d, b.texture_id())));
        assert_eq!(gl.uniform_value(program.program_id(), "u_Tex"), Some(UniformValue::Int(0)));
        assert_eq!(gl.uniform_value(program.program_id(), "u_Other"), Some(UniformValue::Int(1)));
    }

    #[test]
    fn activation_flushes_values_and_keeps_textures() {
        let gl = gl();
        let mut program = program(&gl);
        program
            .set_texture("u_Tex", texture(&gl))
            .unwrap()
            .set_float("u_Opacity", 0.5)
            .unwrap();
        assert_eq!(program.pending_len(), 2);

        program.activate().unwrap();
        assert_eq!(gl.current_program(), Some(program.program_id()));
        assert_eq!(gl.uniform_value(program.program_id(), "u_Opacity"), Some(UniformValue::Float(0.5)));
        assert!(!program.has_pending("u_Opacity"));
        assert!(program.has_pending("u_Tex"));
        assert_eq!(program.pending_len(), 1);
        assert_eq!(gl.active_texture_unit(), 0);

        gl.take_calls();
        program.activate().unwrap();
        assert_eq!(gl.count_calls("glUniform1f"), 0);
        assert_eq!(gl.count_calls("glUniform1i"), 1);
    }

    #[test]
    fn failed_uniform_names_it_and_resets_the_unit() {
        let gl = gl();
        let mut program = program(&gl);
        program.set_texture("u_Tex", texture(&gl)).unwrap();
        program.set_texture("u_Other", texture(&gl)).unwrap();
        program.set_float("u_Opacity", 0.25).unwrap();
        gl.fail_call("glUniform1f");

        let err = program.activate().unwrap_err();
        assert!(matches!(err, RenderError::Uniform { ref name, .. } if name == "u_Opacity"));
        assert_eq!(gl.active_texture_unit(), 0);
        assert_eq!(gl.calls().last().map(String::as_str), Some("glActiveTexture(0)"));
        assert!(program.has_pending("u_Opacity"));
    }

    #[test]
    fn fixed_function_state_is_applied_on_activation() {
        let gl = gl();
        let mut program = program(&gl)
            .with_depth_test(false)
            .with_depth_write(false);
        program.set_blend(BlendFactor::SrcAlpha, BlendFactor::OneMinusSrcAlpha);
        program.activate().unwrap();

        assert!(!gl.depth_test_enabled());
        assert!(!gl.depth_write_enabled());
        assert_eq!(
            gl.blend_factors(),
            [
                BlendFactor::SrcAlpha,
                BlendFactor::OneMinusSrcAlpha,
                BlendFactor::SrcAlpha,
                BlendFactor::OneMinusSrcAlpha
            ]
        );
    }

    #[test]
    fn separate_alpha_blending_is_applied() {
        let gl = gl();
        let mut program = program(&gl);
        program
            .set_blend(BlendFactor::SrcAlpha, BlendFactor::OneMinusSrcAlpha)
            .set_blend_separate(
                BlendFactor::One,
                BlendFactor::OneMinusSrcAlpha,
                BlendFactor::Zero,
                BlendFactor::One,
            );
        program.activate().unwrap();
        assert_eq!(
            gl.blend_factors(),
            [BlendFactor::One, BlendFactor::OneMinusSrcAlpha, BlendFactor::Zero, BlendFactor::One]
        );
        assert_eq!(program.blend(), gl.blend_factors());
    }

    #[test]
    fn scalars_may_replace_a_texture() {
        let gl = gl();
        let mut program = program(&gl);
        program.set_texture("u_Tex", texture(&gl)).unwrap();
        program.set_int("u_Tex", 3).unwrap();
        program.activate().unwrap();
        assert_eq!(gl.uniform_value(program.program_id(), "u_Tex"), Some(UniformValue::Int(3)));
        assert_eq!(program.pending_len(), 0);
    }

    #[test]
    fn released_textures_cannot_be_activated() {
        let gl = gl();
        let tex = texture(&gl);
        let mut program = program(&gl).with_texture("u_Tex", tex.clone()).unwrap();
        tex.release();
        assert!(matches!(program.activate(), Err(RenderError::Precondition(_))));
        assert_eq!(gl.active_texture_unit(), 0);
    }

    #[test]
    fn release_is_idempotent_and_blocks_activation() {
        let gl = gl();
        let mut program = program(&gl);
        program.release();
        program.release();
        assert!(program.is_released());
        assert_eq!(program.program_id(), 0);
        assert!(matches!(program.activate(), Err(RenderError::Precondition(_))));
        drop(program);
        assert_eq!(gl.live_count(ObjectKind::Program), 0);
        assert_eq!(gl.stale_deletes(), 0);
    }
}
