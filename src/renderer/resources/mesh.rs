use crate::renderer::contexts::device_ctx::DeviceContext;
use crate::renderer::contexts::resource_ctx::transfer_ctx::TransferContext;
use crate::renderer::error::ResourceError;
use crate::renderer::resources::buffer::GpuBuffer;
use crate::renderer::shader_data::Vertex;
use ash::vk;

/// Host-side geometry of one mesh, before it is uploaded.
#[derive(Debug, Clone, PartialEq)]
pub struct MeshData {
    pub vertices: Vec<Vertex>,
    pub indices: Vec<u32>,
    /// Index of the texture sampled when drawing this mesh.
    pub texture: usize,
}

impl MeshData {
    pub fn new_triangle(texture: usize) -> Self {
        let vertices = vec![
            // Bottom left
            Vertex::new([-0.5, -0.5, 0.0].into(), [1.0, 0.0, 0.0].into(), [0.0, 1.0].into()),
            // Bottom right
            Vertex::new([0.5, -0.5, 0.0].into(), [0.0, 1.0, 0.0].into(), [1.0, 1.0].into()),
            // Top
            Vertex::new([0.0, 0.5, 0.0].into(), [0.0, 0.0, 1.0].into(), [0.5, 0.0].into()),
        ];

        Self {
            vertices,
            indices: vec![0, 1, 2],
            texture,
        }
    }

    pub fn new_quad(texture: usize) -> Self {
        let vertices = vec![
            // Top left
            Vertex::new([-1.0, 1.0, 0.0].into(), [1.0, 1.0, 1.0].into(), [0.0, 0.0].into()),
            // Bottom left
            Vertex::new([-1.0, -1.0, 0.0].into(), [1.0, 1.0, 1.0].into(), [0.0, 1.0].into()),
            // Bottom right
            Vertex::new([1.0, -1.0, 0.0].into(), [1.0, 1.0, 1.0].into(), [1.0, 1.0].into()),
            // Top right
            Vertex::new([1.0, 1.0, 0.0].into(), [1.0, 1.0, 1.0].into(), [1.0, 0.0].into()),
        ];

        Self {
            vertices,
            indices: vec![0, 1, 2, 2, 3, 0],
            texture,
        }
    }
}

/// Device-local vertex and index buffers of one mesh.
#[derive(Debug)]
pub struct Mesh {
    pub vertex_buffer: GpuBuffer,
    pub index_buffer: GpuBuffer,
    pub vertex_count: u32,
    pub index_count: u32,
    pub texture: usize,
}

impl Mesh {
    pub fn new(
        dev: &DeviceContext,
        transfer: &TransferContext,
        data: &MeshData,
    ) -> Result<Self, ResourceError> {
        let vertex_buffer =
            transfer.upload_via_staging(dev, &data.vertices, vk::BufferUsageFlags::VERTEX_BUFFER)?;
        let index_buffer =
            match transfer.upload_via_staging(dev, &data.indices, vk::BufferUsageFlags::INDEX_BUFFER) {
                Ok(buffer) => buffer,
                Err(e) => {
                    vertex_buffer.destroy(dev);
                    return Err(e);
                }
            };

        Ok(Self {
            vertex_buffer,
            index_buffer,
            vertex_count: data.vertices.len() as u32,
            index_count: data.indices.len() as u32,
            texture: data.texture,
        })
    }

    pub fn destroy(self, dev: &DeviceContext) {
        self.index_buffer.destroy(dev);
        self.vertex_buffer.destroy(dev);
    }
}
