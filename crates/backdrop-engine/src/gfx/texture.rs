use std::cell::Cell;
use std::fmt;
use std::rc::Rc;

use crate::backend::{
    raw_or_zero, GlHandle, GraphicsBackend, TextureFilter, TextureParameter, TextureTarget,
    WrapMode,
};
use crate::error::{GlContext, RenderError, Result};

/// A GPU-side texture.
///
/// Target, wrap mode, and filtering are fixed at creation. Pixel content is
/// uploaded by whoever produces it (e.g. the camera frame source); this type only
/// owns the object and its sampling parameters.
///
/// Textures are usually shared as `Rc<Texture<B>>` between their owner and the
/// shader programs sampling them, so [`release`](Self::release) takes `&self`.
pub struct Texture<B: GraphicsBackend> {
    gl: Rc<B>,
    id: Cell<Option<GlHandle>>,
    target: TextureTarget,
    wrap_mode: WrapMode,
    use_mipmaps: bool,
}

impl<B: GraphicsBackend> Texture<B> {
    /// Allocates a texture and configures filtering and wrapping.
    ///
    /// The texture is released again if any parameter cannot be set.
    pub fn new(
        gl: Rc<B>,
        target: TextureTarget,
        wrap_mode: WrapMode,
        use_mipmaps: bool,
    ) -> Result<Self> {
        let id = gl.create_texture().gl_context("texture creation failed")?;
        let texture = Self {
            gl,
            id: Cell::new(Some(id)),
            target,
            wrap_mode,
            use_mipmaps,
        };
        // On error `texture` drops here and frees the object.
        texture.configure(id)?;

        log::debug!("created {target:?} texture {}", id.get());
        Ok(texture)
    }

    fn configure(&self, id: GlHandle) -> Result<()> {
        let min_filter = if self.use_mipmaps {
            TextureFilter::LinearMipmapLinear
        } else {
            TextureFilter::Linear
        };

        let gl = &*self.gl;
        gl.bind_texture(self.target, Some(id))
            .gl_context("failed to bind texture")?;
        let parameters = [
            (TextureParameter::MinFilter, min_filter.gl_enum()),
            (TextureParameter::MagFilter, TextureFilter::Linear.gl_enum()),
            (TextureParameter::WrapS, self.wrap_mode.gl_enum()),
            (TextureParameter::WrapT, self.wrap_mode.gl_enum()),
        ];
        for (parameter, value) in parameters {
            gl.tex_parameter(self.target, parameter, value)
                .gl_context("failed to set texture parameter")?;
        }
        Ok(())
    }

    /// Binds the texture to its target on the active texture unit.
    ///
    /// Frame producers call this before uploading pixel data.
    pub fn bind(&self) -> Result<()> {
        let id = self
            .handle()
            .ok_or_else(|| RenderError::precondition("attempted to bind a released texture"))?;
        self.gl
            .bind_texture(self.target, Some(id))
            .gl_context("failed to bind texture")
    }

    /// Frees the native texture. Calling this more than once is a no-op.
    pub fn release(&self) {
        if let Some(id) = self.id.take() {
            match self.gl.delete_texture(id) {
                Ok(()) => log::debug!("released texture {}", id.get()),
                Err(err) => log::warn!("failed to free texture {}: {err}", id.get()),
            }
        }
    }

    /// Native texture name; `0` once released.
    pub fn texture_id(&self) -> u32 {
        raw_or_zero(self.id.get())
    }

    pub(crate) fn handle(&self) -> Option<GlHandle> {
        self.id.get()
    }

    pub fn is_released(&self) -> bool {
        self.id.get().is_none()
    }

    pub fn target(&self) -> TextureTarget {
        self.target
    }

    pub fn wrap_mode(&self) -> WrapMode {
        self.wrap_mode
    }

    pub fn uses_mipmaps(&self) -> bool {
        self.use_mipmaps
    }
}

impl<B: GraphicsBackend> Drop for Texture<B> {
    fn drop(&mut self) {
        self.release();
    }
}

impl<B: GraphicsBackend> fmt::Debug for Texture<B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Texture")
            .field("id", &self.texture_id())
            .field("target", &self.target)
            .field("wrap_mode", &self.wrap_mode)
            .field("use_mipmaps", &self.use_mipmaps)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::recording::ObjectKind;
    use crate::backend::RecordingBackend;

    fn gl() -> Rc<RecordingBackend> {
        Rc::new(RecordingBackend::new())
    }

    #[test]
    fn configures_sampling_on_creation() {
        let gl = gl();
        let tex = Texture::new(gl.clone(), TextureTarget::Texture2d, WrapMode::ClampToEdge, false)
            .unwrap();
        let id = tex.texture_id();
        assert_ne!(id, 0);
        assert_eq!(
            gl.texture_parameter(id, TextureParameter::MinFilter),
            Some(TextureFilter::Linear.gl_enum())
        );
        assert_eq!(
            gl.texture_parameter(id, TextureParameter::MagFilter),
            Some(TextureFilter::Linear.gl_enum())
        );
        assert_eq!(
            gl.texture_parameter(id, TextureParameter::WrapS),
            Some(WrapMode::ClampToEdge.gl_enum())
        );
        assert_eq!(
            gl.texture_parameter(id, TextureParameter::WrapT),
            Some(WrapMode::ClampToEdge.gl_enum())
        );
    }

    #[test]
    fn mipmapped_textures_use_trilinear_minification() {
        let gl = gl();
        let tex = Texture::new(gl.clone(), TextureTarget::Texture2d, WrapMode::Repeat, true).unwrap();
        assert_eq!(
            gl.texture_parameter(tex.texture_id(), TextureParameter::MinFilter),
            Some(TextureFilter::LinearMipmapLinear.gl_enum())
        );
        assert!(tex.uses_mipmaps());
    }

    #[test]
    fn release_is_idempotent() {
        let gl = gl();
        let tex = Texture::new(gl.clone(), TextureTarget::ExternalOes, WrapMode::ClampToEdge, false)
            .unwrap();
        tex.release();
        tex.release();
        assert!(tex.is_released());
        assert_eq!(tex.texture_id(), 0);
        drop(tex);
        assert_eq!(gl.live_count(ObjectKind::Texture), 0);
        assert_eq!(gl.stale_deletes(), 0);
    }

    #[test]
    fn failed_configuration_frees_the_texture() {
        let gl = gl();
        gl.fail_call("glTexParameteri");
        let err = Texture::new(gl.clone(), TextureTarget::Texture2d, WrapMode::ClampToEdge, false)
            .unwrap_err();
        assert!(matches!(err, RenderError::Gl { what: "failed to set texture parameter", .. }));
        assert_eq!(gl.created_count(ObjectKind::Texture), 1);
        assert_eq!(gl.live_count(ObjectKind::Texture), 0);
    }

    #[test]
    fn binding_a_released_texture_is_a_precondition_violation() {
        let gl = gl();
        let tex = Texture::new(gl, TextureTarget::Texture2d, WrapMode::ClampToEdge, false).unwrap();
        tex.release();
        assert!(matches!(tex.bind(), Err(RenderError::Precondition(_))));
    }
}
