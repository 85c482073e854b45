use super::{not_found, AssetSource};
use crate::error::Result;

pub const BACKGROUND_CAMERA_VERT: &str = "shaders/background_show_camera.vert";
pub const BACKGROUND_CAMERA_FRAG: &str = "shaders/background_show_camera.frag";
pub const BACKGROUND_DEPTH_VERT: &str = "shaders/background_show_depth_color_visualization.vert";
pub const BACKGROUND_DEPTH_FRAG: &str = "shaders/background_show_depth_color_visualization.frag";

/// The background shaders compiled into the crate, under their default asset names.
#[derive(Debug, Copy, Clone, Default)]
pub struct EmbeddedAssets;

impl EmbeddedAssets {
    fn lookup(name: &str) -> Option<&'static str> {
        match name {
            BACKGROUND_CAMERA_VERT => Some(include_str!("../../shaders/background_show_camera.vert")),
            BACKGROUND_CAMERA_FRAG => Some(include_str!("../../shaders/background_show_camera.frag")),
            BACKGROUND_DEPTH_VERT => Some(include_str!(
                "../../shaders/background_show_depth_color_visualization.vert"
            )),
            BACKGROUND_DEPTH_FRAG => Some(include_str!(
                "../../shaders/background_show_depth_color_visualization.frag"
            )),
            _ => None,
        }
    }
}

impl AssetSource for EmbeddedAssets {
    fn read_text(&self, name: &str) -> Result<String> {
        Self::lookup(name)
            .map(str::to_string)
            .ok_or_else(|| not_found(name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serves_every_background_stage() {
        for name in [
            BACKGROUND_CAMERA_VERT,
            BACKGROUND_CAMERA_FRAG,
            BACKGROUND_DEPTH_VERT,
            BACKGROUND_DEPTH_FRAG,
        ] {
            let text = EmbeddedAssets.read_text(name).unwrap();
            assert!(text.starts_with("#version 300 es"), "{name}");
            assert!(text.contains("void main"), "{name}");
        }
    }

    #[test]
    fn unknown_names_are_not_found() {
        assert!(EmbeddedAssets.read_text("shaders/nope.frag").is_err());
    }
}
