use std::fmt;
use std::rc::Rc;

use crate::backend::{GlResult, GraphicsBackend, UniformLocation, UniformValue};
use crate::gfx::Texture;

/// A uniform write waiting for the next activation.
pub enum PendingUniform<B: GraphicsBackend> {
    /// A sampler bound to a fixed texture unit. Survives activation.
    Texture { unit: u32, texture: Rc<Texture<B>> },
    /// A plain value. Flushed by activation.
    Value(UniformValue),
}

impl<B: GraphicsBackend> PendingUniform<B> {
    pub fn is_texture(&self) -> bool {
        matches!(self, Self::Texture { .. })
    }

    /// Writes the entry through `gl`. Textures must be live.
    pub(super) fn apply(&self, gl: &B, location: UniformLocation) -> GlResult<()> {
        match self {
            Self::Texture { unit, texture } => {
                gl.active_texture(*unit)?;
                gl.bind_texture(texture.target(), texture.handle())?;
                gl.uniform(location, &UniformValue::Int(*unit as i32))
            }
            Self::Value(value) => gl.uniform(location, value),
        }
    }
}

impl<B: GraphicsBackend> fmt::Debug for PendingUniform<B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Texture { unit, texture } => f
                .debug_struct("Texture")
                .field("unit", unit)
                .field("texture", &texture.texture_id())
                .finish(),
            Self::Value(value) => f.debug_tuple("Value").field(value).finish(),
        }
    }
}
