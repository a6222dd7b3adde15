use crate::renderer::contexts::device_ctx::DeviceContext;
use crate::renderer::contexts::resource_ctx::descriptor_ctx::DescriptorContext;
use crate::renderer::contexts::resource_ctx::transfer_ctx::TransferContext;
use crate::renderer::error::ResourceError;
use crate::renderer::resources::image::GpuImage;
use ash::vk;

/// Tightly packed RGBA8 pixels, row by row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextureData {
    pub width: u32,
    pub height: u32,
    pub pixels: Vec<u8>,
}

impl TextureData {
    /// Single opaque white texel, sampled by meshes without a material texture.
    pub fn white() -> Self {
        Self {
            width: 1,
            height: 1,
            pixels: vec![u8::MAX; 4],
        }
    }

    pub fn validate(&self) -> Result<(), ResourceError> {
        let expected = self.width as usize * self.height as usize * 4;
        if expected == 0 {
            return Err(ResourceError::EmptyData);
        }
        if self.pixels.len() != expected {
            return Err(ResourceError::PixelSizeMismatch {
                expected,
                actual: self.pixels.len(),
            });
        }
        Ok(())
    }
}

pub struct Texture {
    pub image: GpuImage,
    /// Freed together with the descriptor pool it came from.
    pub descriptor_set: vk::DescriptorSet,
}

impl Texture {
    pub fn new(
        dev: &DeviceContext,
        transfer: &TransferContext,
        descriptors: &mut DescriptorContext,
        data: &TextureData,
    ) -> Result<Self, ResourceError> {
        data.validate()?;
        let image = transfer.upload_image(dev, &data.pixels, data.width, data.height)?;
        let descriptor_set = match descriptors.allocate_texture_set(dev, image.view) {
            Ok(set) => set,
            Err(e) => {
                image.destroy(dev);
                return Err(e);
            }
        };

        Ok(Self {
            image,
            descriptor_set,
        })
    }

    pub fn destroy(self, dev: &DeviceContext) {
        self.image.destroy(dev);
    }
}
