//! "Resources" refers to middle-level objects built from device memory and
//! handed to the renderer by the user: buffers, images, meshes, and textures.

pub mod buffer;
pub mod image;
pub mod mesh;
pub mod model;
pub mod shader;
pub mod texture;
