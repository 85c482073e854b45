//! AR camera background.
//!
//! [`BackgroundCompositor`] draws a full-screen quad beneath virtual content,
//! showing either the camera image or a false-color visualization of camera
//! depth. The quad carries three vertex streams:
//!
//! | attribute | stream                         | contents                         |
//! |-----------|--------------------------------|----------------------------------|
//! | 0         | [`SCREEN_COORDS_STREAM`]       | [`NDC_QUAD_COORDS`]              |
//! | 1         | [`CAMERA_TEX_COORDS_STREAM`]   | per display geometry             |
//! | 2         | [`VIRTUAL_SCENE_TEX_COORDS_STREAM`] | [`VIRTUAL_SCENE_TEX_COORDS`] |
//!
//! The camera stream is empty until the first display geometry update.

mod config;
mod geometry;

use std::rc::Rc;

use crate::assets::AssetSource;
use crate::backend::{GraphicsBackend, PrimitiveMode, TextureTarget, WrapMode};
use crate::error::{RenderError, Result};
use crate::gfx::{Mesh, ShaderProgram, Texture, VertexBuffer};
use crate::render::Renderer;

pub use config::{BackgroundConfig, ShaderAssets};
pub use geometry::{DisplayGeometry, NDC_QUAD_COORDS, VIRTUAL_SCENE_TEX_COORDS};

pub const SCREEN_COORDS_STREAM: usize = 0;
pub const CAMERA_TEX_COORDS_STREAM: usize = 1;
pub const VIRTUAL_SCENE_TEX_COORDS_STREAM: usize = 2;

/// What the background shows.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Default)]
pub enum VisualizationMode {
    /// The camera color image.
    #[default]
    CameraImage,
    /// Camera depth mapped to a color ramp.
    DepthVisualization,
}

impl VisualizationMode {
    pub fn from_depth_flag(use_depth_visualization: bool) -> Self {
        if use_depth_visualization {
            Self::DepthVisualization
        } else {
            Self::CameraImage
        }
    }

    /// Whether this mode samples the camera depth texture.
    pub fn is_depth(self) -> bool {
        self == Self::DepthVisualization
    }
}

/// Owns the camera textures, the background quad, and the active background program.
pub struct BackgroundCompositor<B: GraphicsBackend, A: AssetSource> {
    gl: Rc<B>,
    assets: A,
    config: BackgroundConfig,
    camera_color_texture: Rc<Texture<B>>,
    camera_depth_texture: Rc<Texture<B>>,
    mesh: Mesh<B>,
    active: Option<(VisualizationMode, ShaderProgram<B>)>,
    camera_tex_coords: [f32; 8],
}

impl<B: GraphicsBackend, A: AssetSource> BackgroundCompositor<B, A> {
    /// Allocates the camera textures and the background quad.
    ///
    /// No program is built yet; call [`set_mode`](Self::set_mode) before drawing.
    pub fn new(renderer: &Renderer<B>, assets: A, config: BackgroundConfig) -> Result<Self> {
        let gl = renderer.gl().clone();

        let camera_color_texture = Rc::new(Texture::new(
            gl.clone(),
            TextureTarget::ExternalOes,
            WrapMode::ClampToEdge,
            false,
        )?);
        let camera_depth_texture = Rc::new(Texture::new(
            gl.clone(),
            TextureTarget::Texture2d,
            WrapMode::ClampToEdge,
            false,
        )?);

        let streams = vec![
            VertexBuffer::new(gl.clone(), 2, &NDC_QUAD_COORDS)?,
            VertexBuffer::new(gl.clone(), 2, &[])?,
            VertexBuffer::new(gl.clone(), 2, &VIRTUAL_SCENE_TEX_COORDS)?,
        ];
        let mesh = Mesh::new(gl.clone(), PrimitiveMode::TriangleStrip, None, streams)?;

        Ok(Self {
            gl,
            assets,
            config,
            camera_color_texture,
            camera_depth_texture,
            mesh,
            active: None,
            camera_tex_coords: [0.0; 8],
        })
    }

    /// Switches what the background shows.
    ///
    /// Does nothing if `mode` is already active. Otherwise the new program is
    /// built first and replaces the current one only once it is complete, so a
    /// failed build leaves the previous mode in place.
    pub fn set_mode(&mut self, mode: VisualizationMode) -> Result<()> {
        if self.mode() == Some(mode) {
            return Ok(());
        }

        let program = self.build_program(mode)?;
        let previous = self.active.replace((mode, program));
        let texture = if mode.is_depth() { "depth" } else { "color" };
        match previous {
            Some((previous, _)) => {
                log::debug!("background mode {previous:?} -> {mode:?} (camera {texture} texture)")
            }
            None => log::debug!("background mode {mode:?}"),
        }
        Ok(())
    }

    pub fn set_use_depth_visualization(&mut self, use_depth_visualization: bool) -> Result<()> {
        self.set_mode(VisualizationMode::from_depth_flag(use_depth_visualization))
    }

    fn build_program(&self, mode: VisualizationMode) -> Result<ShaderProgram<B>> {
        let stages = self.config.shader_assets(mode);
        let texture = match mode {
            VisualizationMode::CameraImage => &self.camera_color_texture,
            VisualizationMode::DepthVisualization => &self.camera_depth_texture,
        };
        let program = ShaderProgram::from_assets(
            self.gl.clone(),
            &self.assets,
            &stages.vertex,
            &stages.fragment,
            &self.config.defines,
        )?
        .with_texture(self.config.texture_uniform(mode), texture.clone())?
        .with_depth_test(false)
        .with_depth_write(false);
        Ok(program)
    }

    /// Re-maps the camera texture coordinates when `changed` is set.
    ///
    /// `transform` receives [`NDC_QUAD_COORDS`] and returns the matching
    /// normalized camera texture coordinates. Only the camera stream is uploaded.
    pub fn update_geometry<F>(&mut self, changed: bool, transform: F) -> Result<()>
    where
        F: FnOnce(&[f32; 8]) -> [f32; 8],
    {
        if !changed {
            return Ok(());
        }
        let coords = transform(&NDC_QUAD_COORDS);
        self.mesh.set_vertex_data(CAMERA_TEX_COORDS_STREAM, &coords)?;
        self.camera_tex_coords = coords;
        Ok(())
    }

    /// [`update_geometry`](Self::update_geometry) fed from the tracking layer.
    /// Call once per frame before drawing.
    pub fn update_display_geometry(&mut self, geometry: &impl DisplayGeometry) -> Result<()> {
        self.update_geometry(geometry.has_display_geometry_changed(), |ndc| {
            geometry.transform_ndc_to_texture(ndc)
        })
    }

    /// Draws the background with the active program.
    ///
    /// `renderer` must drive the context this compositor was created with.
    pub fn draw(&mut self, renderer: &Renderer<B>) -> Result<()> {
        if !Rc::ptr_eq(renderer.gl(), &self.gl) {
            return Err(RenderError::precondition(
                "background drawn through a renderer of another graphics context",
            ));
        }
        let Some((_, program)) = &mut self.active else {
            return Err(RenderError::precondition(
                "background drawn before a visualization mode was set",
            ));
        };
        renderer.draw(&self.mesh, program)
    }

    /// External texture the camera frame producer writes into.
    pub fn camera_color_texture(&self) -> &Rc<Texture<B>> {
        &self.camera_color_texture
    }

    /// Texture the depth image producer writes into.
    pub fn camera_depth_texture(&self) -> &Rc<Texture<B>> {
        &self.camera_depth_texture
    }

    /// Active mode; `None` until a program was built.
    pub fn mode(&self) -> Option<VisualizationMode> {
        self.active.as_ref().map(|(mode, _)| *mode)
    }

    pub fn program(&self) -> Option<&ShaderProgram<B>> {
        self.active.as_ref().map(|(_, program)| program)
    }

    pub fn camera_tex_coords(&self) -> &[f32; 8] {
        &self.camera_tex_coords
    }

    pub fn mesh(&self) -> &Mesh<B> {
        &self.mesh
    }

    pub fn config(&self) -> &BackgroundConfig {
        &self.config
    }
}

impl<B: GraphicsBackend, A: AssetSource> Drop for BackgroundCompositor<B, A> {
    fn drop(&mut self) {
        self.active = None;
        self.camera_color_texture.release();
        self.camera_depth_texture.release();
    }
}

impl<B: GraphicsBackend, A: AssetSource> std::fmt::Debug for BackgroundCompositor<B, A> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BackgroundCompositor")
            .field("mode", &self.mode())
            .field("camera_color_texture", &self.camera_color_texture)
            .field("camera_depth_texture", &self.camera_depth_texture)
            .field("mesh", &self.mesh)
            .field("camera_tex_coords", &self.camera_tex_coords)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assets::{
        EmbeddedAssets, MemoryAssets, BACKGROUND_CAMERA_FRAG, BACKGROUND_CAMERA_VERT,
    };
    use crate::backend::recording::ObjectKind;
    use crate::backend::{RecordingBackend, UniformValue};

    /// Portrait display: texture space is the NDC quad rotated a quarter turn.
    struct Portrait {
        changed: bool,
    }

    impl DisplayGeometry for Portrait {
        fn has_display_geometry_changed(&self) -> bool {
            self.changed
        }

        fn transform_ndc_to_texture(&self, ndc: &[f32; 8]) -> [f32; 8] {
            let mut out = [0.0; 8];
            for (src, dst) in ndc.chunks_exact(2).zip(out.chunks_exact_mut(2)) {
                dst[0] = (1.0 - src[1]) * 0.5;
                dst[1] = (1.0 - src[0]) * 0.5;
            }
            out
        }
    }

    fn setup() -> (Rc<RecordingBackend>, Renderer<RecordingBackend>) {
        let gl = Rc::new(RecordingBackend::new());
        let mut renderer = Renderer::new(gl.clone());
        renderer.set_viewport(1080, 1920);
        (gl, renderer)
    }

    fn compositor(
        renderer: &Renderer<RecordingBackend>,
    ) -> BackgroundCompositor<RecordingBackend, EmbeddedAssets> {
        BackgroundCompositor::new(renderer, EmbeddedAssets, BackgroundConfig::default()).unwrap()
    }

    fn camera_stream(
        gl: &RecordingBackend,
        compositor: &BackgroundCompositor<RecordingBackend, impl AssetSource>,
    ) -> Vec<f32> {
        let id = compositor
            .mesh()
            .vertex_buffer(CAMERA_TEX_COORDS_STREAM)
            .unwrap()
            .buffer_id();
        gl.buffer_floats(id).unwrap()
    }

    #[test]
    fn allocates_textures_and_quad() {
        let (gl, renderer) = setup();
        let compositor = compositor(&renderer);

        assert_eq!(compositor.camera_color_texture().target(), TextureTarget::ExternalOes);
        assert_eq!(compositor.camera_depth_texture().target(), TextureTarget::Texture2d);
        assert_eq!(compositor.mode(), None);

        let mesh = compositor.mesh();
        assert_eq!(mesh.primitive_mode(), PrimitiveMode::TriangleStrip);
        assert!(mesh.index_buffer().is_none());
        let floats = |stream: usize| gl.buffer_floats(mesh.vertex_buffer(stream).unwrap().buffer_id()).unwrap();
        assert_eq!(floats(SCREEN_COORDS_STREAM), NDC_QUAD_COORDS.to_vec());
        assert!(floats(CAMERA_TEX_COORDS_STREAM).is_empty());
        assert_eq!(floats(VIRTUAL_SCENE_TEX_COORDS_STREAM), VIRTUAL_SCENE_TEX_COORDS.to_vec());
    }

    #[test]
    fn same_mode_twice_builds_once() {
        let (gl, renderer) = setup();
        let mut compositor = compositor(&renderer);
        compositor.set_mode(VisualizationMode::CameraImage).unwrap();
        compositor.set_use_depth_visualization(false).unwrap();
        assert_eq!(gl.created_count(ObjectKind::Program), 1);
        assert_eq!(compositor.mode(), Some(VisualizationMode::CameraImage));

        compositor.set_use_depth_visualization(true).unwrap();
        assert_eq!(gl.created_count(ObjectKind::Program), 2);
        compositor.set_use_depth_visualization(true).unwrap();
        compositor.set_mode(VisualizationMode::DepthVisualization).unwrap();
        assert_eq!(gl.created_count(ObjectKind::Program), 2);
        assert!(compositor.mode().is_some_and(VisualizationMode::is_depth));
    }

    #[test]
    fn drawing_through_another_context_is_refused() {
        let (gl, renderer) = setup();
        let mut compositor = compositor(&renderer);
        compositor.set_mode(VisualizationMode::CameraImage).unwrap();
        compositor.update_display_geometry(&Portrait { changed: true }).unwrap();

        let other = Renderer::new(Rc::new(RecordingBackend::new()));
        let err = compositor.draw(&other).unwrap_err();
        assert!(matches!(err, RenderError::Precondition(_)));
        assert_eq!(gl.draw_count(), 0);
        assert_eq!(other.gl().draw_count(), 0);

        compositor.draw(&renderer).unwrap();
        assert_eq!(gl.draw_count(), 1);
    }

    #[test]
    fn switching_modes_replaces_the_program() {
        let (gl, renderer) = setup();
        let mut compositor = compositor(&renderer);
        compositor.set_mode(VisualizationMode::CameraImage).unwrap();
        let camera_program = compositor.program().unwrap().program_id();

        compositor.set_use_depth_visualization(true).unwrap();
        assert_eq!(compositor.mode(), Some(VisualizationMode::DepthVisualization));
        assert_eq!(gl.created_count(ObjectKind::Program), 2);
        assert_eq!(gl.live_count(ObjectKind::Program), 1);
        assert!(!gl.is_live(camera_program));
    }

    #[test]
    fn failed_switch_keeps_the_previous_program() {
        let (gl, renderer) = setup();
        let assets = MemoryAssets::new()
            .with(BACKGROUND_CAMERA_VERT, EmbeddedAssets.read_text(BACKGROUND_CAMERA_VERT).unwrap())
            .with(BACKGROUND_CAMERA_FRAG, EmbeddedAssets.read_text(BACKGROUND_CAMERA_FRAG).unwrap());
        let mut compositor =
            BackgroundCompositor::new(&renderer, assets, BackgroundConfig::default()).unwrap();
        compositor.set_mode(VisualizationMode::CameraImage).unwrap();
        let program = compositor.program().unwrap().program_id();

        let err = compositor.set_mode(VisualizationMode::DepthVisualization).unwrap_err();
        assert!(matches!(err, RenderError::Asset { .. }));
        assert_eq!(compositor.mode(), Some(VisualizationMode::CameraImage));
        assert_eq!(compositor.program().unwrap().program_id(), program);
        assert!(gl.is_live(program));

        compositor.update_display_geometry(&Portrait { changed: true }).unwrap();
        compositor.draw(&renderer).unwrap();
        assert_eq!(gl.draw_count(), 1);
    }

    #[test]
    fn unchanged_geometry_leaves_the_camera_stream_alone() {
        let (gl, renderer) = setup();
        let mut compositor = compositor(&renderer);
        compositor.update_display_geometry(&Portrait { changed: true }).unwrap();
        let before = camera_stream(&gl, &compositor);
        let coords = *compositor.camera_tex_coords();
        gl.take_calls();

        compositor
            .update_geometry(false, |_| unreachable!("transform must not run"))
            .unwrap();
        assert_eq!(camera_stream(&gl, &compositor), before);
        assert_eq!(compositor.camera_tex_coords(), &coords);
        assert!(gl.calls().is_empty());
    }

    #[test]
    fn changed_geometry_overwrites_the_camera_stream() {
        let (gl, renderer) = setup();
        let mut compositor = compositor(&renderer);
        compositor.update_display_geometry(&Portrait { changed: true }).unwrap();
        assert_eq!(
            camera_stream(&gl, &compositor),
            vec![1.0, 1.0, 1.0, 0.0, 0.0, 1.0, 0.0, 0.0]
        );

        let flipped = [0.0, 1.0, 1.0, 1.0, 0.0, 0.0, 1.0, 0.0];
        compositor.update_geometry(true, |_| flipped).unwrap();
        assert_eq!(camera_stream(&gl, &compositor), flipped.to_vec());
        assert_eq!(compositor.camera_tex_coords(), &flipped);
        assert_eq!(gl.count_calls("glBufferSubData(Array"), 1);
    }

    #[test]
    fn drawing_without_a_mode_is_a_precondition_violation() {
        let (gl, renderer) = setup();
        let mut compositor = compositor(&renderer);
        let err = compositor.draw(&renderer).unwrap_err();
        assert!(matches!(err, RenderError::Precondition(_)));
        assert_eq!(gl.draw_count(), 0);
    }

    #[test]
    fn draws_the_camera_image_without_depth() {
        let (gl, renderer) = setup();
        let mut compositor = compositor(&renderer);
        compositor.set_mode(VisualizationMode::CameraImage).unwrap();
        compositor.update_display_geometry(&Portrait { changed: true }).unwrap();
        compositor.draw(&renderer).unwrap();

        let program = compositor.program().unwrap().program_id();
        let color = compositor.camera_color_texture().texture_id();
        assert_eq!(gl.draw_count(), 1);
        assert!(gl.calls().contains(&"glDrawArrays(TriangleStrip, 0, 4)".to_string()));
        assert!(!gl.depth_test_enabled());
        assert!(!gl.depth_write_enabled());
        assert_eq!(gl.bound_texture(0), Some((TextureTarget::ExternalOes, color)));
        assert_eq!(
            gl.uniform_value(program, "u_CameraColorTexture"),
            Some(UniformValue::Int(0))
        );
    }

    #[test]
    fn depth_mode_samples_the_depth_texture() {
        let (gl, renderer) = setup();
        let mut config = BackgroundConfig::default();
        config.defines.insert("MAX_DEPTH_MM".into(), "6500.0".into());
        let mut compositor = BackgroundCompositor::new(&renderer, EmbeddedAssets, config).unwrap();
        compositor.set_use_depth_visualization(true).unwrap();
        compositor.update_display_geometry(&Portrait { changed: true }).unwrap();
        compositor.draw(&renderer).unwrap();

        let depth = compositor.camera_depth_texture().texture_id();
        assert_eq!(gl.bound_texture(0), Some((TextureTarget::Texture2d, depth)));
        assert!(gl
            .compiled_sources()
            .iter()
            .all(|(_, source)| source.contains("#define MAX_DEPTH_MM 6500.0\n")));
    }

    #[test]
    fn dropping_frees_every_native_object() {
        let (gl, renderer) = setup();
        let mut compositor = compositor(&renderer);
        compositor.set_mode(VisualizationMode::DepthVisualization).unwrap();
        let shared = compositor.camera_color_texture().clone();
        drop(compositor);

        assert!(shared.is_released());
        assert_eq!(gl.live_objects(), 0);
        drop(shared);
        assert_eq!(gl.stale_deletes(), 0);
    }
}
