use crate::renderer::error::AssetError;
use crate::renderer::resources::texture::TextureData;
use std::path::Path;

/// Decodes any supported image file into RGBA8 pixels.
pub fn load_rgba(path: impl AsRef<Path>) -> Result<TextureData, AssetError> {
    let path = path.as_ref();
    let image = image::open(path).map_err(|source| AssetError::Image {
        path: path.to_path_buf(),
        source,
    })?;

    let width = image.width();
    let height = image.height();
    let pixels = image.to_rgba8().into_raw();
    log::debug!("Loaded image {} ({width}x{height})", path.display());

    Ok(TextureData {
        width,
        height,
        pixels,
    })
}
