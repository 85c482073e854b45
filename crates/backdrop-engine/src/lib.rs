//! Backdrop engine crate.
//!
//! GPU resources for compositing an AR camera feed beneath virtual content:
//! shader programs, textures, buffers and meshes, and the background compositor
//! built from them. Everything reaches the GPU through a
//! [`GraphicsBackend`](backend::GraphicsBackend).

pub mod assets;
pub mod backend;
pub mod background;
pub mod error;
pub mod gfx;
pub mod logging;
pub mod render;

pub use error::{RenderError, Result};
