use crate::assets::{
    BACKGROUND_CAMERA_FRAG, BACKGROUND_CAMERA_VERT, BACKGROUND_DEPTH_FRAG, BACKGROUND_DEPTH_VERT,
};
use crate::gfx::Defines;

use super::VisualizationMode;

/// Vertex and fragment asset names of one background program.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShaderAssets {
    pub vertex: String,
    pub fragment: String,
}

impl ShaderAssets {
    pub fn new(vertex: impl Into<String>, fragment: impl Into<String>) -> Self {
        Self {
            vertex: vertex.into(),
            fragment: fragment.into(),
        }
    }
}

/// Configuration of the background compositor.
///
/// The defaults match the shaders served by [`EmbeddedAssets`](crate::assets::EmbeddedAssets).
#[derive(Debug, Clone)]
pub struct BackgroundConfig {
    /// Program drawing the camera image.
    pub camera_shader: ShaderAssets,

    /// Program drawing the depth visualization.
    pub depth_shader: ShaderAssets,

    /// Sampler uniform receiving the camera color texture.
    pub camera_color_uniform: String,

    /// Sampler uniform receiving the camera depth texture.
    pub camera_depth_uniform: String,

    /// Preprocessor definitions injected into both programs.
    ///
    /// Empty by default. The depth shader honors `MAX_DEPTH_MM`, the distance
    /// mapped to the far end of its color ramp.
    pub defines: Defines,
}

impl BackgroundConfig {
    pub fn shader_assets(&self, mode: VisualizationMode) -> &ShaderAssets {
        match mode {
            VisualizationMode::CameraImage => &self.camera_shader,
            VisualizationMode::DepthVisualization => &self.depth_shader,
        }
    }

    pub fn texture_uniform(&self, mode: VisualizationMode) -> &str {
        match mode {
            VisualizationMode::CameraImage => &self.camera_color_uniform,
            VisualizationMode::DepthVisualization => &self.camera_depth_uniform,
        }
    }
}

impl Default for BackgroundConfig {
    fn default() -> Self {
        Self {
            camera_shader: ShaderAssets::new(BACKGROUND_CAMERA_VERT, BACKGROUND_CAMERA_FRAG),
            depth_shader: ShaderAssets::new(BACKGROUND_DEPTH_VERT, BACKGROUND_DEPTH_FRAG),
            camera_color_uniform: "u_CameraColorTexture".to_string(),
            camera_depth_uniform: "u_CameraDepthTexture".to_string(),
            defines: Defines::new(),
        }
    }
}
