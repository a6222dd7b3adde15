use crate::renderer::contexts::device_ctx::DeviceContext;
use crate::renderer::error::SwapchainError;
use crate::renderer::internals::swapchain::Swapchain;
use crate::renderer::resources::image::GpuImage;
use ash::vk;

const DEPTH_FORMAT_CANDIDATES: [vk::Format; 3] = [
    vk::Format::D32_SFLOAT_S8_UINT,
    vk::Format::D32_SFLOAT,
    vk::Format::D24_UNORM_S8_UINT,
];

/// First candidate usable as an optimal-tiling depth attachment.
pub fn choose_depth_format(dev: &DeviceContext) -> Result<vk::Format, SwapchainError> {
    DEPTH_FORMAT_CANDIDATES
        .into_iter()
        .find(|format| {
            dev.driver
                .format_properties(*format)
                .optimal_tiling_features
                .contains(vk::FormatFeatureFlags::DEPTH_STENCIL_ATTACHMENT)
        })
        .ok_or(SwapchainError::NoDepthFormat)
}

/// Presentation target of the renderer: the swapchain, a depth buffer matching
/// its extent, and one framebuffer per swapchain image
#[derive(Debug, Default)]
pub struct RenderTarget {
    pub swapchain: Swapchain,
    pub depth_image: GpuImage,
    pub framebuffers: Vec<vk::Framebuffer>,
}

impl RenderTarget {
    /// Framebuffers are created later, once a render pass for this target exists.
    pub fn new(
        dev: &DeviceContext,
        vsync: bool,
        depth_format: vk::Format,
    ) -> Result<Self, SwapchainError> {
        let swapchain = Swapchain::new(dev, vsync)?;
        let depth_image = match GpuImage::new_depth_image(dev, depth_format, swapchain.extent) {
            Ok(image) => image,
            Err(e) => {
                swapchain.destroy(dev);
                return Err(e.into());
            }
        };

        Ok(Self {
            swapchain,
            depth_image,
            framebuffers: Vec::new(),
        })
    }

    pub fn create_framebuffers(
        &mut self,
        dev: &DeviceContext,
        render_pass: vk::RenderPass,
    ) -> Result<(), SwapchainError> {
        self.destroy_framebuffers(dev);
        let extent = self.swapchain.extent;
        for view in &self.swapchain.image_views {
            let attachments = [*view, self.depth_image.view];
            let framebuffer_info = vk::FramebufferCreateInfo::default()
                .render_pass(render_pass)
                .attachments(&attachments)
                .width(extent.width)
                .height(extent.height)
                .layers(1);
            let framebuffer = dev
                .driver
                .create_framebuffer(&framebuffer_info)
                .map_err(SwapchainError::vk("vkCreateFramebuffer"))?;
            self.framebuffers.push(framebuffer);
        }
        Ok(())
    }

    pub fn destroy_framebuffers(&mut self, dev: &DeviceContext) {
        for framebuffer in self.framebuffers.drain(..) {
            dev.driver.destroy_framebuffer(framebuffer);
        }
    }

    pub fn extent(&self) -> vk::Extent2D {
        self.swapchain.extent
    }

    pub fn image_count(&self) -> usize {
        self.swapchain.image_count()
    }

    pub fn aspect_ratio(&self) -> f32 {
        let extent = self.extent();
        extent.width as f32 / extent.height.max(1) as f32
    }

    /// Framebuffers, then the depth buffer, then the swapchain and its views.
    pub fn destroy(mut self, dev: &DeviceContext) {
        self.destroy_framebuffers(dev);
        self.depth_image.destroy(dev);
        self.swapchain.destroy(dev);
    }
}
