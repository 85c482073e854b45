use std::fmt;
use std::rc::Rc;

use crate::backend::{raw_or_zero, BufferTarget, GlHandle, GraphicsBackend, PrimitiveMode};
use crate::error::{GlContext, RenderError, Result};

use super::{IndexBuffer, VertexBuffer};

/// A drawable collection of vertex streams.
///
/// Vertex buffer `i` feeds attribute location `i`. With an index buffer the mesh
/// draws indexed; without one it draws the vertices in order.
pub struct Mesh<B: GraphicsBackend> {
    gl: Rc<B>,
    vertex_array: Option<GlHandle>,
    primitive_mode: PrimitiveMode,
    index_buffer: Option<IndexBuffer<B>>,
    vertex_buffers: Vec<VertexBuffer<B>>,
}

impl<B: GraphicsBackend> Mesh<B> {
    /// Builds the vertex array wiring `vertex_buffers` (and `index_buffer`).
    ///
    /// The mesh takes ownership of its buffers.
    pub fn new(
        gl: Rc<B>,
        primitive_mode: PrimitiveMode,
        index_buffer: Option<IndexBuffer<B>>,
        vertex_buffers: Vec<VertexBuffer<B>>,
    ) -> Result<Self> {
        if vertex_buffers.is_empty() {
            return Err(RenderError::InvalidData(
                "a mesh needs at least one vertex buffer".into(),
            ));
        }

        let id = gl
            .create_vertex_array()
            .gl_context("failed to create vertex array")?;
        let mesh = Self {
            gl,
            vertex_array: Some(id),
            primitive_mode,
            index_buffer,
            vertex_buffers,
        };
        mesh.wire(id)?;

        log::debug!(
            "created {:?} mesh {} with {} vertex streams",
            primitive_mode,
            id.get(),
            mesh.vertex_buffers.len()
        );
        Ok(mesh)
    }

    fn wire(&self, id: GlHandle) -> Result<()> {
        let gl = &*self.gl;
        gl.bind_vertex_array(Some(id))
            .gl_context("failed to bind vertex array")?;

        if let Some(index_buffer) = &self.index_buffer {
            gl.bind_buffer(BufferTarget::ElementArray, index_buffer.handle())
                .gl_context("failed to bind index buffer")?;
        }

        for (index, vertex_buffer) in (0u32..).zip(&self.vertex_buffers) {
            gl.bind_buffer(BufferTarget::Array, vertex_buffer.handle())
                .gl_context("failed to bind vertex buffer")?;
            gl.vertex_attrib_pointer_f32(index, vertex_buffer.components_per_vertex())
                .gl_context("failed to associate vertex buffer with vertex array")?;
            gl.enable_vertex_attrib_array(index)
                .gl_context("failed to enable vertex attribute")?;
        }

        gl.bind_vertex_array(None)
            .gl_context("failed to unbind vertex array")
    }

    /// Issues the draw call. The shader must already be active.
    ///
    /// Every vertex stream must hold the same number of vertices.
    pub fn draw(&self) -> Result<()> {
        let id = self
            .vertex_array
            .ok_or_else(|| RenderError::precondition("attempted to draw a released mesh"))?;

        let vertex_count = self.vertex_buffers[0].vertex_count();
        if self
            .vertex_buffers
            .iter()
            .any(|vb| vb.vertex_count() != vertex_count)
        {
            let counts: Vec<usize> = self.vertex_buffers.iter().map(VertexBuffer::vertex_count).collect();
            return Err(RenderError::precondition(format!(
                "vertex buffers have mismatching numbers of vertices: {counts:?}"
            )));
        }

        let gl = &*self.gl;
        gl.bind_vertex_array(Some(id))
            .gl_context("failed to bind vertex array")?;
        match &self.index_buffer {
            Some(index_buffer) => gl
                .draw_elements_u32(self.primitive_mode, index_buffer.len() as u32)
                .gl_context("failed to draw indexed mesh")?,
            None => gl
                .draw_arrays(self.primitive_mode, 0, vertex_count as u32)
                .gl_context("failed to draw mesh")?,
        }
        gl.bind_vertex_array(None)
            .gl_context("failed to unbind vertex array")
    }

    /// Re-uploads a single vertex stream, leaving the others untouched.
    pub fn set_vertex_data(&mut self, stream: usize, entries: &[f32]) -> Result<()> {
        let count = self.vertex_buffers.len();
        let vertex_buffer = self.vertex_buffers.get_mut(stream).ok_or_else(|| {
            RenderError::InvalidData(format!("mesh has {count} vertex streams, no stream {stream}"))
        })?;
        vertex_buffer.set(entries)
    }

    pub fn vertex_buffer(&self, stream: usize) -> Option<&VertexBuffer<B>> {
        self.vertex_buffers.get(stream)
    }

    /// Mutable access to one stream, e.g. to re-upload it in place. The
    /// attribute wiring stays valid since the buffer name never changes.
    pub fn vertex_buffer_mut(&mut self, stream: usize) -> Option<&mut VertexBuffer<B>> {
        self.vertex_buffers.get_mut(stream)
    }

    pub fn vertex_buffers(&self) -> &[VertexBuffer<B>] {
        &self.vertex_buffers
    }

    pub fn index_buffer(&self) -> Option<&IndexBuffer<B>> {
        self.index_buffer.as_ref()
    }

    pub fn primitive_mode(&self) -> PrimitiveMode {
        self.primitive_mode
    }

    /// Native vertex array name; `0` once released.
    pub fn vertex_array_id(&self) -> u32 {
        raw_or_zero(self.vertex_array)
    }

    /// Frees the vertex array and every owned buffer. Idempotent.
    pub fn release(&mut self) {
        if let Some(id) = self.vertex_array.take() {
            if let Err(err) = self.gl.delete_vertex_array(id) {
                log::warn!("failed to free vertex array {}: {err}", id.get());
            }
        }
        if let Some(index_buffer) = &mut self.index_buffer {
            index_buffer.release();
        }
        for vertex_buffer in &mut self.vertex_buffers {
            vertex_buffer.release();
        }
    }
}

impl<B: GraphicsBackend> Drop for Mesh<B> {
    fn drop(&mut self) {
        self.release();
    }
}

impl<B: GraphicsBackend> fmt::Debug for Mesh<B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Mesh")
            .field("vertex_array", &self.vertex_array_id())
            .field("primitive_mode", &self.primitive_mode)
            .field("indexed", &self.index_buffer.is_some())
            .field("vertex_streams", &self.vertex_buffers.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::recording::ObjectKind;
    use crate::backend::RecordingBackend;

    fn quad(gl: &Rc<RecordingBackend>) -> Vec<VertexBuffer<RecordingBackend>> {
        vec![
            VertexBuffer::new(gl.clone(), 2, &[-1.0, -1.0, 1.0, -1.0, -1.0, 1.0, 1.0, 1.0]).unwrap(),
            VertexBuffer::new(gl.clone(), 2, &[]).unwrap(),
        ]
    }

    fn activate_any_program(gl: &RecordingBackend) {
        use crate::backend::ShaderStage;
        let p = gl.create_program().unwrap();
        for stage in [ShaderStage::Vertex, ShaderStage::Fragment] {
            let s = gl.create_shader(stage).unwrap();
            gl.shader_source(s, "void main() {}").unwrap();
            gl.compile_shader(s).unwrap();
            gl.attach_shader(p, s).unwrap();
        }
        gl.link_program(p).unwrap();
        gl.use_program(Some(p)).unwrap();
    }

    #[test]
    fn wires_each_stream_to_its_attribute() {
        let gl = Rc::new(RecordingBackend::new());
        let mesh = Mesh::new(gl.clone(), PrimitiveMode::TriangleStrip, None, quad(&gl)).unwrap();
        let vao = mesh.vertex_array_id();
        for (i, vb) in mesh.vertex_buffers().iter().enumerate() {
            let attribute = gl.vertex_attribute(vao, i as u32).unwrap();
            assert_eq!(attribute.buffer, vb.buffer_id());
            assert_eq!(attribute.components, 2);
            assert!(attribute.enabled);
        }
    }

    #[test]
    fn refuses_to_draw_mismatched_streams() {
        let gl = Rc::new(RecordingBackend::new());
        let mesh = Mesh::new(gl.clone(), PrimitiveMode::TriangleStrip, None, quad(&gl)).unwrap();
        activate_any_program(&gl);
        assert!(matches!(mesh.draw(), Err(RenderError::Precondition(_))));
        assert_eq!(gl.draw_count(), 0);
    }

    #[test]
    fn draws_all_vertices_once_streams_agree() {
        let gl = Rc::new(RecordingBackend::new());
        let mut mesh = Mesh::new(gl.clone(), PrimitiveMode::TriangleStrip, None, quad(&gl)).unwrap();
        mesh.set_vertex_data(1, &[0.0, 0.0, 1.0, 0.0, 0.0, 1.0, 1.0, 1.0]).unwrap();
        activate_any_program(&gl);
        gl.take_calls();

        mesh.draw().unwrap();
        assert!(gl.calls().contains(&"glDrawArrays(TriangleStrip, 0, 4)".to_string()));
        assert_eq!(gl.draw_count(), 1);
    }

    #[test]
    fn indexed_meshes_draw_elements() {
        let gl = Rc::new(RecordingBackend::new());
        let indices = IndexBuffer::new(gl.clone(), &[0, 1, 2, 2, 1, 3]).unwrap();
        let positions = VertexBuffer::new(gl.clone(), 2, &[0.0; 8]).unwrap();
        let mesh = Mesh::new(gl.clone(), PrimitiveMode::Triangles, Some(indices), vec![positions]).unwrap();
        assert_eq!(gl.element_buffer(mesh.vertex_array_id()), mesh.index_buffer().map(IndexBuffer::buffer_id));
        activate_any_program(&gl);
        mesh.draw().unwrap();
        assert!(gl.calls().contains(&"glDrawElements(Triangles, 6, UNSIGNED_INT)".to_string()));
    }

    #[test]
    fn streams_can_be_refilled_in_place() {
        let gl = Rc::new(RecordingBackend::new());
        let mut mesh = Mesh::new(gl.clone(), PrimitiveMode::TriangleStrip, None, quad(&gl)).unwrap();
        let vao = mesh.vertex_array_id();
        let stream = mesh.vertex_buffer_mut(1).unwrap();
        stream.set(&[0.5; 8]).unwrap();
        let id = stream.buffer_id();

        assert_eq!(gl.buffer_floats(id).unwrap(), vec![0.5; 8]);
        assert_eq!(gl.vertex_attribute(vao, 1).unwrap().buffer, id);
        assert!(mesh.vertex_buffer_mut(3).is_none());
    }

    #[test]
    fn set_vertex_data_rejects_unknown_streams() {
        let gl = Rc::new(RecordingBackend::new());
        let mut mesh = Mesh::new(gl.clone(), PrimitiveMode::TriangleStrip, None, quad(&gl)).unwrap();
        assert!(matches!(mesh.set_vertex_data(5, &[0.0; 8]), Err(RenderError::InvalidData(_))));
    }

    #[test]
    fn dropping_frees_vertex_array_and_buffers() {
        let gl = Rc::new(RecordingBackend::new());
        let mesh = Mesh::new(gl.clone(), PrimitiveMode::TriangleStrip, None, quad(&gl)).unwrap();
        drop(mesh);
        assert_eq!(gl.live_count(ObjectKind::VertexArray), 0);
        assert_eq!(gl.live_count(ObjectKind::Buffer), 0);
        assert_eq!(gl.stale_deletes(), 0);
    }
}
