//! GPU resource wrappers.
//!
//! Each wrapper owns one native object (or a small group of them), frees it on
//! `release()` or drop, and reaches the GPU only through a shared
//! [`GraphicsBackend`](crate::backend::GraphicsBackend).

mod buffer;
mod mesh;
pub mod shader;
mod texture;

pub use buffer::{GpuBuffer, IndexBuffer, VertexBuffer};
pub use mesh::Mesh;
pub use shader::{Defines, PendingUniform, ShaderProgram};
pub use texture::Texture;
