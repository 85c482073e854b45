use std::fmt;
use std::mem::size_of;
use std::rc::Rc;

use bytemuck::Pod;

use crate::backend::{raw_or_zero, BufferTarget, BufferUsage, GlHandle, GraphicsBackend};
use crate::error::{GlContext, RenderError, Result};

/// A GPU buffer of fixed-size entries.
///
/// The data store grows on demand: uploads that fit the current capacity are
/// written in place, larger ones re-specify the store.
pub struct GpuBuffer<B: GraphicsBackend> {
    gl: Rc<B>,
    id: Option<GlHandle>,
    target: BufferTarget,
    entry_size: usize,
    len: usize,
    capacity: usize,
}

impl<B: GraphicsBackend> GpuBuffer<B> {
    /// Creates a buffer of `T` entries. `entries` may be empty; the buffer can be
    /// populated later with [`set`](Self::set).
    pub fn new<T: Pod>(gl: Rc<B>, target: BufferTarget, entries: &[T]) -> Result<Self> {
        let id = gl.create_buffer().gl_context("failed to allocate buffer")?;
        let mut buffer = Self {
            gl,
            id: Some(id),
            target,
            entry_size: size_of::<T>(),
            len: 0,
            capacity: 0,
        };
        if !entries.is_empty() {
            buffer.set(entries)?;
        }
        Ok(buffer)
    }

    /// Replaces the buffer contents with `entries`.
    pub fn set<T: Pod>(&mut self, entries: &[T]) -> Result<()> {
        if size_of::<T>() != self.entry_size {
            return Err(RenderError::InvalidData(format!(
                "buffer holds {}-byte entries, got {}-byte entries",
                self.entry_size,
                size_of::<T>()
            )));
        }
        let id = self
            .id
            .ok_or_else(|| RenderError::precondition("attempted to upload to a released buffer"))?;
        if entries.is_empty() {
            self.len = 0;
            return Ok(());
        }

        let gl = &*self.gl;
        // Binding an element buffer while a vertex array is bound would rewire that
        // vertex array.
        gl.bind_vertex_array(None)
            .gl_context("failed to unbind vertex array")?;
        gl.bind_buffer(self.target, Some(id))
            .gl_context("failed to bind buffer")?;

        let bytes: &[u8] = bytemuck::cast_slice(entries);
        if entries.len() <= self.capacity {
            gl.buffer_sub_data(self.target, 0, bytes)
                .gl_context("failed to populate buffer")?;
        } else {
            gl.buffer_data(self.target, bytes, BufferUsage::DynamicDraw)
                .gl_context("failed to allocate buffer storage")?;
            self.capacity = entries.len();
        }
        self.len = entries.len();
        Ok(())
    }

    /// Frees the native buffer. Idempotent.
    pub fn release(&mut self) {
        if let Some(id) = self.id.take() {
            if let Err(err) = self.gl.delete_buffer(id) {
                log::warn!("failed to free buffer {}: {err}", id.get());
            }
        }
    }

    /// Native buffer name; `0` once released.
    pub fn buffer_id(&self) -> u32 {
        raw_or_zero(self.id)
    }

    pub(crate) fn handle(&self) -> Option<GlHandle> {
        self.id
    }

    /// Number of entries currently stored.
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Number of entries the data store can hold without reallocation.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn target(&self) -> BufferTarget {
        self.target
    }
}

impl<B: GraphicsBackend> Drop for GpuBuffer<B> {
    fn drop(&mut self) {
        self.release();
    }
}

impl<B: GraphicsBackend> fmt::Debug for GpuBuffer<B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GpuBuffer")
            .field("id", &self.buffer_id())
            .field("target", &self.target)
            .field("len", &self.len)
            .field("capacity", &self.capacity)
            .finish()
    }
}

/// A vertex attribute stream of `f32` components.
#[derive(Debug)]
pub struct VertexBuffer<B: GraphicsBackend> {
    buffer: GpuBuffer<B>,
    components_per_vertex: u32,
}

impl<B: GraphicsBackend> VertexBuffer<B> {
    /// Creates a stream with `components_per_vertex` floats per vertex.
    ///
    /// `entries` may be empty for streams filled in later (per-frame data).
    pub fn new(gl: Rc<B>, components_per_vertex: u32, entries: &[f32]) -> Result<Self> {
        if components_per_vertex == 0 {
            return Err(RenderError::InvalidData(
                "vertex buffers need at least one component per vertex".into(),
            ));
        }
        check_stride(entries, components_per_vertex)?;
        Ok(Self {
            buffer: GpuBuffer::new(gl, BufferTarget::Array, entries)?,
            components_per_vertex,
        })
    }

    pub fn set(&mut self, entries: &[f32]) -> Result<()> {
        check_stride(entries, self.components_per_vertex)?;
        self.buffer.set(entries)
    }

    pub fn vertex_count(&self) -> usize {
        self.buffer.len() / self.components_per_vertex as usize
    }

    pub fn components_per_vertex(&self) -> u32 {
        self.components_per_vertex
    }

    pub fn buffer_id(&self) -> u32 {
        self.buffer.buffer_id()
    }

    pub(crate) fn handle(&self) -> Option<GlHandle> {
        self.buffer.handle()
    }

    pub fn release(&mut self) {
        self.buffer.release();
    }
}

fn check_stride(entries: &[f32], components_per_vertex: u32) -> Result<()> {
    if entries.len() % components_per_vertex as usize != 0 {
        return Err(RenderError::InvalidData(format!(
            "{} floats do not divide into vertices of {components_per_vertex} components",
            entries.len()
        )));
    }
    Ok(())
}

/// An index stream of `u32` entries.
#[derive(Debug)]
pub struct IndexBuffer<B: GraphicsBackend> {
    buffer: GpuBuffer<B>,
}

impl<B: GraphicsBackend> IndexBuffer<B> {
    pub fn new(gl: Rc<B>, indices: &[u32]) -> Result<Self> {
        Ok(Self {
            buffer: GpuBuffer::new(gl, BufferTarget::ElementArray, indices)?,
        })
    }

    /// Replaces the indices. Meshes draw `len()` indices from the next draw on.
    pub fn set(&mut self, indices: &[u32]) -> Result<()> {
        self.buffer.set(indices)
    }

    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    pub fn buffer_id(&self) -> u32 {
        self.buffer.buffer_id()
    }

    pub(crate) fn handle(&self) -> Option<GlHandle> {
        self.buffer.handle()
    }

    pub fn release(&mut self) {
        self.buffer.release();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::recording::ObjectKind;
    use crate::backend::RecordingBackend;

    #[test]
    fn empty_buffers_allocate_no_storage() {
        let gl = Rc::new(RecordingBackend::new());
        let vb = VertexBuffer::new(gl.clone(), 2, &[]).unwrap();
        assert_eq!(vb.vertex_count(), 0);
        assert_ne!(vb.buffer_id(), 0);
        assert_eq!(gl.count_calls("glBufferData"), 0);
    }

    #[test]
    fn uploads_within_capacity_are_partial() {
        let gl = Rc::new(RecordingBackend::new());
        let mut vb = VertexBuffer::new(gl.clone(), 2, &[0.0; 8]).unwrap();
        assert_eq!(gl.count_calls("glBufferData"), 1);

        vb.set(&[1.0, 2.0, 3.0, 4.0]).unwrap();
        assert_eq!(gl.count_calls("glBufferSubData"), 1);
        assert_eq!(vb.vertex_count(), 2);

        vb.set(&[5.0; 12]).unwrap();
        assert_eq!(gl.count_calls("glBufferData"), 2);
        assert_eq!(gl.buffer_floats(vb.buffer_id()).unwrap(), vec![5.0; 12]);
        assert_eq!(gl.buffer_usage(vb.buffer_id()), Some(BufferUsage::DynamicDraw));
    }

    #[test]
    fn rejects_partial_vertices() {
        let gl = Rc::new(RecordingBackend::new());
        let err = VertexBuffer::new(gl.clone(), 3, &[0.0; 4]).unwrap_err();
        assert!(matches!(err, RenderError::InvalidData(_)));
        let mut vb = VertexBuffer::new(gl, 2, &[]).unwrap();
        assert!(matches!(vb.set(&[1.0; 3]), Err(RenderError::InvalidData(_))));
    }

    #[test]
    fn index_buffers_hold_u32() {
        let gl = Rc::new(RecordingBackend::new());
        let ib = IndexBuffer::new(gl.clone(), &[0, 1, 2, 2, 1, 3]).unwrap();
        assert_eq!(ib.len(), 6);
        assert_eq!(gl.buffer_contents(ib.buffer_id()).unwrap().len(), 24);
    }

    #[test]
    fn index_buffers_can_shrink_and_grow() {
        let gl = Rc::new(RecordingBackend::new());
        let mut ib = IndexBuffer::new(gl.clone(), &[0, 1, 2, 2, 1, 3]).unwrap();
        ib.set(&[0, 1, 2]).unwrap();
        assert_eq!(ib.len(), 3);
        assert_eq!(gl.count_calls("glBufferSubData(ElementArray"), 1);

        ib.set(&[0; 9]).unwrap();
        assert_eq!(ib.len(), 9);
        assert_eq!(gl.count_calls("glBufferData(ElementArray"), 2);
    }

    #[test]
    fn release_frees_once() {
        let gl = Rc::new(RecordingBackend::new());
        let mut buffer = GpuBuffer::new(gl.clone(), BufferTarget::Array, &[1.0f32]).unwrap();
        buffer.release();
        buffer.release();
        drop(buffer);
        assert_eq!(gl.live_count(ObjectKind::Buffer), 0);
        assert_eq!(gl.stale_deletes(), 0);
    }
}
