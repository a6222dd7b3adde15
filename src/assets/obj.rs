use crate::renderer::error::AssetError;
use crate::renderer::shader_data::Vertex;
use glam::{Vec2, Vec3};
use std::path::Path;

/// One OBJ object, triangulated with a single index stream.
#[derive(Debug, Clone, PartialEq)]
pub struct ObjMesh {
    pub vertices: Vec<Vertex>,
    pub indices: Vec<u32>,
    /// Index into `ObjScene::diffuse_maps`.
    pub material: Option<usize>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ObjScene {
    pub meshes: Vec<ObjMesh>,
    /// Diffuse texture file name of each material, relative to the texture directory.
    pub diffuse_maps: Vec<Option<String>>,
}

pub fn load_obj(path: impl AsRef<Path>) -> Result<ObjScene, AssetError> {
    let path = path.as_ref();
    let (models, materials) = tobj::load_obj(
        path,
        &tobj::LoadOptions {
            triangulate: true,
            single_index: true,
            ..Default::default()
        },
    )
    .map_err(|source| AssetError::Model {
        path: path.to_path_buf(),
        source,
    })?;

    // A model without its material library still has usable geometry
    let materials = materials.unwrap_or_else(|e| {
        log::warn!("Ignoring materials of {}: {e}", path.display());
        Vec::new()
    });
    let diffuse_maps = materials
        .into_iter()
        .map(|material| material.diffuse_texture.filter(|name| !name.is_empty()))
        .collect::<Vec<_>>();

    let meshes = models
        .into_iter()
        .map(|model| {
            let mesh = model.mesh;
            let vertex_count = mesh.positions.len() / 3;
            let vertices = (0..vertex_count)
                .map(|i| {
                    let position = Vec3::from_slice(&mesh.positions[i * 3..i * 3 + 3]);
                    let color = mesh
                        .vertex_color
                        .get(i * 3..i * 3 + 3)
                        .map_or(Vec3::ONE, Vec3::from_slice);
                    // OBJ puts v = 0 at the bottom, Vulkan samples it at the top
                    let texcoord = mesh
                        .texcoords
                        .get(i * 2..i * 2 + 2)
                        .map_or(Vec2::ZERO, |t| Vec2::new(t[0], 1.0 - t[1]));
                    Vertex::new(position, color, texcoord)
                })
                .collect();

            ObjMesh {
                vertices,
                indices: mesh.indices,
                material: mesh.material_id.filter(|id| *id < diffuse_maps.len()),
            }
        })
        .collect::<Vec<_>>();

    log::debug!(
        "Loaded model {} ({} meshes, {} materials)",
        path.display(),
        meshes.len(),
        diffuse_maps.len()
    );

    Ok(ObjScene {
        meshes,
        diffuse_maps,
    })
}
