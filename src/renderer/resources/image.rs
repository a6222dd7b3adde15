use crate::renderer::contexts::device_ctx::DeviceContext;
use crate::renderer::contexts::resource_ctx::memory;
use crate::renderer::error::ResourceError;
use ash::vk;

pub struct ImageCreateInfo {
    pub format: vk::Format,
    pub extent: vk::Extent2D,
    pub usage: vk::ImageUsageFlags,
    pub aspect: vk::ImageAspectFlags,
}

/// A 2D image with dedicated device-local memory and a matching view.
#[derive(Debug, Default)]
pub struct GpuImage {
    pub image: vk::Image,
    pub view: vk::ImageView,
    pub memory: vk::DeviceMemory,
    pub format: vk::Format,
    pub extent: vk::Extent2D,
}

impl GpuImage {
    pub const TEXTURE_FORMAT: vk::Format = vk::Format::R8G8B8A8_UNORM;

    pub fn new(dev: &DeviceContext, create_info: &ImageCreateInfo) -> Result<Self, ResourceError> {
        let image = {
            let info = vk::ImageCreateInfo::default()
                .format(create_info.format)
                .usage(create_info.usage)
                .extent(vk::Extent3D {
                    width: create_info.extent.width,
                    height: create_info.extent.height,
                    depth: 1,
                })
                .image_type(vk::ImageType::TYPE_2D)
                .mip_levels(1)
                .array_layers(1)
                .samples(vk::SampleCountFlags::TYPE_1)
                .tiling(vk::ImageTiling::OPTIMAL)
                .sharing_mode(vk::SharingMode::EXCLUSIVE)
                .initial_layout(vk::ImageLayout::UNDEFINED);
            dev.driver
                .create_image(&info)
                .map_err(ResourceError::creation("image"))?
        };

        let requirements = dev.driver.image_memory_requirements(image);
        let memory = match memory::allocate(dev, requirements, vk::MemoryPropertyFlags::DEVICE_LOCAL) {
            Ok(memory) => memory,
            Err(e) => {
                dev.driver.destroy_image(image);
                return Err(e);
            }
        };

        if let Err(result) = dev.driver.bind_image_memory(image, memory, 0) {
            dev.driver.free_memory(memory);
            dev.driver.destroy_image(image);
            return Err(ResourceError::CreationFailed {
                what: "image memory binding",
                result,
            });
        }

        let view = match create_image_view(dev, image, create_info.format, create_info.aspect) {
            Ok(view) => view,
            Err(e) => {
                dev.driver.free_memory(memory);
                dev.driver.destroy_image(image);
                return Err(e);
            }
        };

        log::debug!(
            "Created image {:?} ({}x{}, {:?})",
            image,
            create_info.extent.width,
            create_info.extent.height,
            create_info.format
        );

        Ok(Self {
            image,
            view,
            memory,
            format: create_info.format,
            extent: create_info.extent,
        })
    }

    /// Sampled image that is filled through a transfer
    pub fn new_texture_image(dev: &DeviceContext, width: u32, height: u32) -> Result<Self, ResourceError> {
        Self::new(
            dev,
            &ImageCreateInfo {
                format: Self::TEXTURE_FORMAT,
                extent: vk::Extent2D { width, height },
                usage: vk::ImageUsageFlags::SAMPLED | vk::ImageUsageFlags::TRANSFER_DST,
                aspect: vk::ImageAspectFlags::COLOR,
            },
        )
    }

    /// Create a special type of image used for depth buffer
    pub fn new_depth_image(
        dev: &DeviceContext,
        format: vk::Format,
        extent: vk::Extent2D,
    ) -> Result<Self, ResourceError> {
        Self::new(
            dev,
            &ImageCreateInfo {
                format,
                extent,
                usage: vk::ImageUsageFlags::DEPTH_STENCIL_ATTACHMENT,
                aspect: vk::ImageAspectFlags::DEPTH,
            },
        )
    }

    pub fn destroy(self, dev: &DeviceContext) {
        dev.driver.destroy_image_view(self.view);
        dev.driver.destroy_image(self.image);
        dev.driver.free_memory(self.memory);
    }
}

pub fn create_image_view(
    dev: &DeviceContext,
    image: vk::Image,
    format: vk::Format,
    aspect: vk::ImageAspectFlags,
) -> Result<vk::ImageView, ResourceError> {
    let view_info = vk::ImageViewCreateInfo::default()
        .view_type(vk::ImageViewType::TYPE_2D)
        .format(format)
        .components(vk::ComponentMapping {
            r: vk::ComponentSwizzle::IDENTITY,
            g: vk::ComponentSwizzle::IDENTITY,
            b: vk::ComponentSwizzle::IDENTITY,
            a: vk::ComponentSwizzle::IDENTITY,
        })
        .subresource_range(vk::ImageSubresourceRange {
            aspect_mask: aspect,
            base_mip_level: 0,
            level_count: 1,
            base_array_layer: 0,
            layer_count: 1,
        })
        .image(image);
    dev.driver
        .create_image_view(&view_info)
        .map_err(ResourceError::creation("image view"))
}
