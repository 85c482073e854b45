//! Draw entry point.
//!
//! Components hand a mesh and the shader to draw it with to [`Renderer::draw`];
//! nothing else issues draw calls.
//!
//! Convention:
//! - draws target the default framebuffer
//! - the viewport is in physical pixels, origin bottom-left (GL convention)

use std::rc::Rc;

use crate::backend::{ClearBuffers, GraphicsBackend};
use crate::error::{GlContext, Result};
use crate::gfx::{Mesh, ShaderProgram};

/// Issues draws against one graphics context.
pub struct Renderer<B: GraphicsBackend> {
    gl: Rc<B>,
    viewport: Option<(u32, u32)>,
}

impl<B: GraphicsBackend> Renderer<B> {
    pub fn new(gl: Rc<B>) -> Self {
        Self { gl, viewport: None }
    }

    /// Backend shared by every resource created for this renderer.
    pub fn gl(&self) -> &Rc<B> {
        &self.gl
    }

    /// Sets the viewport applied before every draw and clear.
    ///
    /// A zero-sized viewport (e.g. a minimized surface) leaves the context's
    /// viewport untouched.
    pub fn set_viewport(&mut self, width: u32, height: u32) {
        self.viewport = (width > 0 && height > 0).then_some((width, height));
    }

    pub fn viewport(&self) -> Option<(u32, u32)> {
        self.viewport
    }

    fn apply_viewport(&self) -> Result<()> {
        if let Some((width, height)) = self.viewport {
            self.gl
                .viewport(0, 0, width as i32, height as i32)
                .gl_context("failed to set viewport")?;
        }
        Ok(())
    }

    /// Clears color and depth. Depth writes are re-enabled first so the depth
    /// buffer clears even after a program that disabled them.
    pub fn clear(&self, r: f32, g: f32, b: f32, a: f32) -> Result<()> {
        self.apply_viewport()?;
        let gl = &*self.gl;
        gl.depth_mask(true)
            .gl_context("failed to enable depth writes")?;
        gl.clear_color(r, g, b, a)
            .gl_context("failed to set clear color")?;
        gl.clear(ClearBuffers::ColorAndDepth)
            .gl_context("failed to clear framebuffer")
    }

    /// Draws `mesh` with `shader`, flushing the shader's queued state first.
    pub fn draw(&self, mesh: &Mesh<B>, shader: &mut ShaderProgram<B>) -> Result<()> {
        self.apply_viewport()?;
        shader.activate()?;
        mesh.draw()
    }
}

impl<B: GraphicsBackend> std::fmt::Debug for Renderer<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Renderer")
            .field("viewport", &self.viewport)
            .finish_non_exhaustive()
    }
}
