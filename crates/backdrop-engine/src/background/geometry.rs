/// Full-screen quad in normalized device coordinates, as a triangle strip.
pub const NDC_QUAD_COORDS: [f32; 8] = [
    -1.0, -1.0, //
    1.0, -1.0, //
    -1.0, 1.0, //
    1.0, 1.0,
];

/// Unit texture quad matching [`NDC_QUAD_COORDS`] vertex for vertex.
pub const VIRTUAL_SCENE_TEX_COORDS: [f32; 8] = [
    0.0, 0.0, //
    1.0, 0.0, //
    0.0, 1.0, //
    1.0, 1.0,
];

/// Display geometry as reported by the AR tracking layer for the current frame.
pub trait DisplayGeometry {
    /// Whether rotation or viewport size changed since the previous frame.
    fn has_display_geometry_changed(&self) -> bool;

    /// Maps 4 NDC points `(x, y)` to normalized camera texture coordinates.
    fn transform_ndc_to_texture(&self, ndc: &[f32; 8]) -> [f32; 8];
}

impl<G: DisplayGeometry + ?Sized> DisplayGeometry for &G {
    fn has_display_geometry_changed(&self) -> bool {
        (**self).has_display_geometry_changed()
    }

    fn transform_ndc_to_texture(&self, ndc: &[f32; 8]) -> [f32; 8] {
        (**self).transform_ndc_to_texture(ndc)
    }
}
