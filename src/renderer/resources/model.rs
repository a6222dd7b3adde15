use crate::renderer::contexts::device_ctx::DeviceContext;
use crate::renderer::contexts::resource_ctx::transfer_ctx::TransferContext;
use crate::renderer::error::ResourceError;
use crate::renderer::resources::mesh::{Mesh, MeshData};
use glam::Mat4;

/// Meshes loaded from one model file, drawn with a shared transform.
#[derive(Debug)]
pub struct MeshModel {
    pub meshes: Vec<Mesh>,
    pub transform: Mat4,
}

impl MeshModel {
    pub fn new(
        dev: &DeviceContext,
        transfer: &TransferContext,
        meshes: &[MeshData],
    ) -> Result<Self, ResourceError> {
        if meshes.is_empty() {
            return Err(ResourceError::EmptyData);
        }

        let mut uploaded = Vec::with_capacity(meshes.len());
        for data in meshes {
            match Mesh::new(dev, transfer, data) {
                Ok(mesh) => uploaded.push(mesh),
                Err(e) => {
                    for mesh in uploaded {
                        mesh.destroy(dev);
                    }
                    return Err(e);
                }
            }
        }

        Ok(Self {
            meshes: uploaded,
            transform: Mat4::IDENTITY,
        })
    }

    pub fn destroy(self, dev: &DeviceContext) {
        for mesh in self.meshes {
            mesh.destroy(dev);
        }
    }
}
