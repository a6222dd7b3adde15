//! Loaders that turn files on disk into the host-side data the renderer uploads.

pub mod image;
pub mod obj;
pub mod spirv;
