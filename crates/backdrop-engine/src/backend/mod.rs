//! Graphics backend seam.
//!
//! Everything above this module reaches the GPU through [`GraphicsBackend`], a thin
//! GL-flavoured trait. Two implementations ship with the crate:
//! - [`GlowBackend`] drives a real OpenGL (ES) context through `glow` (feature `glow`)
//! - [`RecordingBackend`] emulates the GL object model in memory and records every call
//!
//! Conventions:
//! - every call returns `GlResult`; a backend reports the first native error of the call
//! - methods take `&self`; a backend is bound to one context and one thread

#[cfg(all(feature = "glow", not(target_arch = "wasm32")))]
mod glow_backend;
pub mod recording;
mod types;

#[cfg(all(feature = "glow", not(target_arch = "wasm32")))]
pub use glow_backend::GlowBackend;
pub use recording::RecordingBackend;
pub(crate) use types::raw_or_zero;
pub use types::{
    BlendFactor, BufferTarget, BufferUsage, ClearBuffers, GlError, GlHandle, GlResult,
    PrimitiveMode, ShaderStage, TextureFilter, TextureParameter, TextureTarget, UniformLocation,
    UniformValue, WrapMode,
};

/// Primitive GPU operations consumed by the resource wrappers.
pub trait GraphicsBackend {
    // ── shader stages ────────────────────────────────────────────────────

    fn create_shader(&self, stage: ShaderStage) -> GlResult<GlHandle>;
    fn shader_source(&self, shader: GlHandle, source: &str) -> GlResult<()>;
    fn compile_shader(&self, shader: GlHandle) -> GlResult<()>;
    fn shader_compile_status(&self, shader: GlHandle) -> GlResult<bool>;
    fn shader_info_log(&self, shader: GlHandle) -> GlResult<String>;
    fn delete_shader(&self, shader: GlHandle) -> GlResult<()>;

    // ── programs ─────────────────────────────────────────────────────────

    fn create_program(&self) -> GlResult<GlHandle>;
    fn attach_shader(&self, program: GlHandle, shader: GlHandle) -> GlResult<()>;
    fn link_program(&self, program: GlHandle) -> GlResult<()>;
    fn program_link_status(&self, program: GlHandle) -> GlResult<bool>;
    fn program_info_log(&self, program: GlHandle) -> GlResult<String>;
    fn delete_program(&self, program: GlHandle) -> GlResult<()>;
    fn use_program(&self, program: Option<GlHandle>) -> GlResult<()>;

    /// Looks up an active uniform. `Ok(None)` when the program has no such uniform.
    fn uniform_location(&self, program: GlHandle, name: &str) -> GlResult<Option<UniformLocation>>;

    /// Writes a value to a uniform of the program currently in use.
    fn uniform(&self, location: UniformLocation, value: &UniformValue) -> GlResult<()>;

    // ── fixed-function state ─────────────────────────────────────────────

    fn blend_func_separate(
        &self,
        src_rgb: BlendFactor,
        dst_rgb: BlendFactor,
        src_alpha: BlendFactor,
        dst_alpha: BlendFactor,
    ) -> GlResult<()>;
    fn depth_mask(&self, write: bool) -> GlResult<()>;
    /// Enables or disables `GL_DEPTH_TEST`.
    fn set_depth_test(&self, enabled: bool) -> GlResult<()>;

    // ── textures ─────────────────────────────────────────────────────────

    fn create_texture(&self) -> GlResult<GlHandle>;
    fn bind_texture(&self, target: TextureTarget, texture: Option<GlHandle>) -> GlResult<()>;
    /// Sets an integer texture parameter; `value` is a GL enum (filter or wrap mode).
    fn tex_parameter(
        &self,
        target: TextureTarget,
        parameter: TextureParameter,
        value: u32,
    ) -> GlResult<()>;
    fn delete_texture(&self, texture: GlHandle) -> GlResult<()>;
    /// Selects texture unit `unit` (relative to `GL_TEXTURE0`).
    fn active_texture(&self, unit: u32) -> GlResult<()>;

    // ── buffers ──────────────────────────────────────────────────────────

    fn create_buffer(&self) -> GlResult<GlHandle>;
    fn bind_buffer(&self, target: BufferTarget, buffer: Option<GlHandle>) -> GlResult<()>;
    /// (Re)allocates the data store of the bound buffer.
    fn buffer_data(&self, target: BufferTarget, data: &[u8], usage: BufferUsage) -> GlResult<()>;
    /// Overwrites part of the bound buffer's data store.
    fn buffer_sub_data(&self, target: BufferTarget, offset: usize, data: &[u8]) -> GlResult<()>;
    fn delete_buffer(&self, buffer: GlHandle) -> GlResult<()>;

    // ── vertex arrays ────────────────────────────────────────────────────

    fn create_vertex_array(&self) -> GlResult<GlHandle>;
    fn bind_vertex_array(&self, vertex_array: Option<GlHandle>) -> GlResult<()>;
    fn delete_vertex_array(&self, vertex_array: GlHandle) -> GlResult<()>;
    /// Points attribute `index` at the bound array buffer: tightly packed `f32`, offset 0.
    fn vertex_attrib_pointer_f32(&self, index: u32, components: u32) -> GlResult<()>;
    fn enable_vertex_attrib_array(&self, index: u32) -> GlResult<()>;

    // ── drawing ──────────────────────────────────────────────────────────

    fn draw_arrays(&self, mode: PrimitiveMode, first: u32, count: u32) -> GlResult<()>;
    /// Indexed draw from the bound element buffer (`u32` indices, offset 0).
    fn draw_elements_u32(&self, mode: PrimitiveMode, count: u32) -> GlResult<()>;
    fn viewport(&self, x: i32, y: i32, width: i32, height: i32) -> GlResult<()>;
    fn clear_color(&self, r: f32, g: f32, b: f32, a: f32) -> GlResult<()>;
    fn clear(&self, buffers: ClearBuffers) -> GlResult<()>;
}
