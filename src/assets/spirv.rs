use crate::renderer::error::AssetError;
use std::fs::File;
use std::io;
use std::path::Path;

#[cfg(test)]
const SPIRV_MAGIC: u32 = 0x0723_0203;

/// Reads a SPIR-V binary into words. Modules written with the opposite byte
/// order are swapped to native order.
pub fn read_spirv(path: impl AsRef<Path>) -> Result<Vec<u32>, AssetError> {
    let path = path.as_ref();
    let mut file = File::open(path).map_err(|source| AssetError::Io {
        path: path.to_path_buf(),
        source,
    })?;

    let words = ash::util::read_spv(&mut file).map_err(|source| match source.kind() {
        io::ErrorKind::InvalidData => AssetError::InvalidSpirv {
            path: path.to_path_buf(),
        },
        _ => AssetError::Io {
            path: path.to_path_buf(),
            source,
        },
    })?;

    log::debug!("Loaded shader {} ({} words)", path.display(), words.len());
    Ok(words)
}
