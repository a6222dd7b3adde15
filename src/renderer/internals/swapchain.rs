use crate::renderer::contexts::device_ctx::DeviceContext;
use crate::renderer::error::SwapchainError;
use crate::renderer::resources::image;
use ash::vk;

/// A single `UNDEFINED` entry means the surface takes anything, so use RGBA8.
/// Otherwise take the first 8-bit RGBA/BGRA UNORM format, or whatever comes first.
pub fn choose_surface_format(
    formats: &[vk::SurfaceFormatKHR],
) -> Result<vk::SurfaceFormatKHR, SwapchainError> {
    match formats {
        [] => Err(SwapchainError::NoSurfaceFormats),
        [only] if only.format == vk::Format::UNDEFINED => Ok(vk::SurfaceFormatKHR {
            format: vk::Format::R8G8B8A8_UNORM,
            color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
        }),
        [first, ..] => Ok(formats
            .iter()
            .find(|f| {
                f.format == vk::Format::R8G8B8A8_UNORM || f.format == vk::Format::B8G8R8A8_UNORM
            })
            .copied()
            .unwrap_or(*first)),
    }
}

/// MAILBOX when available and vsync is off, FIFO otherwise (always supported).
pub fn choose_present_mode(
    modes: &[vk::PresentModeKHR],
    vsync: bool,
) -> Result<vk::PresentModeKHR, SwapchainError> {
    if modes.is_empty() {
        return Err(SwapchainError::NoPresentModes);
    }
    if !vsync && modes.contains(&vk::PresentModeKHR::MAILBOX) {
        Ok(vk::PresentModeKHR::MAILBOX)
    } else {
        Ok(vk::PresentModeKHR::FIFO)
    }
}

pub fn choose_extent(
    capabilities: &vk::SurfaceCapabilitiesKHR,
    window_extent: vk::Extent2D,
) -> vk::Extent2D {
    if capabilities.current_extent.width != u32::MAX {
        capabilities.current_extent
    } else {
        vk::Extent2D {
            width: window_extent.width.clamp(
                capabilities.min_image_extent.width,
                capabilities.max_image_extent.width,
            ),
            height: window_extent.height.clamp(
                capabilities.min_image_extent.height,
                capabilities.max_image_extent.height,
            ),
        }
    }
}

/// One more than the minimum so the driver never blocks acquisition, capped by
/// the maximum when the surface has one (0 means unbounded).
pub fn choose_image_count(min: u32, max: u32) -> u32 {
    if max > 0 && min + 1 > max {
        max
    } else {
        min + 1
    }
}

#[derive(Debug, Default)]
pub struct Swapchain {
    pub swapchain: vk::SwapchainKHR,
    pub images: Vec<vk::Image>,
    pub image_views: Vec<vk::ImageView>,
    pub format: vk::Format,
    pub color_space: vk::ColorSpaceKHR,
    pub present_mode: vk::PresentModeKHR,
    pub extent: vk::Extent2D,
}

impl Swapchain {
    pub fn new(dev: &DeviceContext, vsync: bool) -> Result<Self, SwapchainError> {
        let driver = dev.driver.as_ref();
        let capabilities = driver
            .surface_capabilities()
            .map_err(SwapchainError::vk("vkGetPhysicalDeviceSurfaceCapabilitiesKHR"))?;
        let surface_format = choose_surface_format(
            &driver
                .surface_formats()
                .map_err(SwapchainError::vk("vkGetPhysicalDeviceSurfaceFormatsKHR"))?,
        )?;
        let present_mode = choose_present_mode(
            &driver
                .surface_present_modes()
                .map_err(SwapchainError::vk("vkGetPhysicalDeviceSurfacePresentModesKHR"))?,
            vsync,
        )?;
        let extent = choose_extent(&capabilities, driver.window_extent());
        let min_image_count =
            choose_image_count(capabilities.min_image_count, capabilities.max_image_count);

        let pre_transform = if capabilities
            .supported_transforms
            .contains(vk::SurfaceTransformFlagsKHR::IDENTITY)
        {
            vk::SurfaceTransformFlagsKHR::IDENTITY
        } else {
            capabilities.current_transform
        };

        let families = dev.queues.families();
        let family_indices = families.unique();
        let mut swapchain_info = vk::SwapchainCreateInfoKHR::default()
            .min_image_count(min_image_count)
            .image_format(surface_format.format)
            .image_color_space(surface_format.color_space)
            .image_extent(extent)
            .image_usage(vk::ImageUsageFlags::COLOR_ATTACHMENT)
            .image_sharing_mode(families.sharing_mode())
            .pre_transform(pre_transform)
            .composite_alpha(vk::CompositeAlphaFlagsKHR::OPAQUE)
            .present_mode(present_mode)
            .clipped(true)
            .image_array_layers(1);
        if !families.is_shared() {
            swapchain_info = swapchain_info.queue_family_indices(&family_indices);
        }

        let swapchain = driver
            .create_swapchain(&swapchain_info)
            .map_err(SwapchainError::vk("vkCreateSwapchainKHR"))?;

        let images = match driver.swapchain_images(swapchain) {
            Ok(images) => images,
            Err(result) => {
                driver.destroy_swapchain(swapchain);
                return Err(SwapchainError::vk("vkGetSwapchainImagesKHR")(result));
            }
        };

        let mut image_views = Vec::with_capacity(images.len());
        for image in &images {
            match image::create_image_view(dev, *image, surface_format.format, vk::ImageAspectFlags::COLOR) {
                Ok(view) => image_views.push(view),
                Err(e) => {
                    for view in image_views {
                        driver.destroy_image_view(view);
                    }
                    driver.destroy_swapchain(swapchain);
                    return Err(e.into());
                }
            }
        }

        log::info!(
            "Created swapchain: {} images, {}x{}, {:?}, {:?}",
            images.len(),
            extent.width,
            extent.height,
            surface_format.format,
            present_mode,
        );

        Ok(Self {
            swapchain,
            images,
            image_views,
            format: surface_format.format,
            color_space: surface_format.color_space,
            present_mode,
            extent,
        })
    }

    pub fn image_count(&self) -> usize {
        self.images.len()
    }

    /// Views first, then the swapchain (which owns the images).
    pub fn destroy(self, dev: &DeviceContext) {
        for view in self.image_views {
            dev.driver.destroy_image_view(view);
        }
        dev.driver.destroy_swapchain(self.swapchain);
    }
}
