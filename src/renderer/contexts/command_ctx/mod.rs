use crate::renderer::config::ObjectTransforms;
use crate::renderer::contexts::device_ctx::DeviceContext;
use crate::renderer::contexts::device_ctx::driver::SubmitDesc;
use crate::renderer::contexts::frame_ctx::frame::Frame;
use crate::renderer::error::{DeviceError, SwapchainError};
use crate::renderer::resources::model::MeshModel;
use crate::renderer::resources::texture::Texture;
use crate::renderer::shader_data::ModelData;
use ash::vk;

/// Everything needed to record the scene into one swapchain image.
pub struct PassInfo<'a> {
    pub render_pass: vk::RenderPass,
    pub framebuffer: vk::Framebuffer,
    pub extent: vk::Extent2D,
    pub clear_color: [f32; 4],
    pub pipeline: vk::Pipeline,
    pub layout: vk::PipelineLayout,
    pub uniform_set: vk::DescriptorSet,
    pub transforms: ObjectTransforms,
    pub model_stride: u32,
    pub textures: &'a [Texture],
    pub models: &'a [MeshModel],
}

/// Responsibilities:
/// - Own one primary command buffer per swapchain image
/// - Record the scene pass for an image every frame
/// - Submit it against a frame slot and present the result
#[derive(Default)]
pub struct CommandContext {
    pool: vk::CommandPool,
    command_buffers: Vec<vk::CommandBuffer>,
}

impl CommandContext {
    pub fn new(dev: &DeviceContext, image_count: usize) -> Result<Self, DeviceError> {
        let pool_info = vk::CommandPoolCreateInfo::default()
            .queue_family_index(dev.queues.graphics.family_index)
            .flags(vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER);
        let pool = dev
            .driver
            .create_command_pool(&pool_info)
            .map_err(DeviceError::vk("vkCreateCommandPool"))?;

        let mut ctx = Self {
            pool,
            command_buffers: Vec::new(),
        };
        if let Err(e) = ctx.recreate(dev, image_count) {
            ctx.destroy(dev);
            return Err(e);
        }
        Ok(ctx)
    }

    /// Replace the command buffers to match a swapchain with `image_count` images.
    pub fn recreate(&mut self, dev: &DeviceContext, image_count: usize) -> Result<(), DeviceError> {
        if !self.command_buffers.is_empty() {
            dev.driver
                .free_command_buffers(self.pool, &self.command_buffers);
            self.command_buffers.clear();
        }

        let alloc_info = vk::CommandBufferAllocateInfo::default()
            .command_pool(self.pool)
            .level(vk::CommandBufferLevel::PRIMARY)
            .command_buffer_count(image_count as u32);
        self.command_buffers = dev
            .driver
            .allocate_command_buffers(&alloc_info)
            .map_err(DeviceError::vk("vkAllocateCommandBuffers"))?;
        Ok(())
    }

    pub fn command_buffer(&self, image_index: usize) -> vk::CommandBuffer {
        self.command_buffers[image_index]
    }

    pub fn record(
        &self,
        dev: &DeviceContext,
        image_index: usize,
        pass: &PassInfo,
    ) -> Result<(), DeviceError> {
        let driver = dev.driver.as_ref();
        let cmd = self.command_buffers[image_index];

        driver
            .begin_command_buffer(cmd, vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT)
            .map_err(DeviceError::vk("vkBeginCommandBuffer"))?;

        let clear_values = [
            vk::ClearValue {
                color: vk::ClearColorValue {
                    float32: pass.clear_color,
                },
            },
            vk::ClearValue {
                depth_stencil: vk::ClearDepthStencilValue {
                    depth: 1.0,
                    stencil: 0,
                },
            },
        ];
        let render_pass_info = vk::RenderPassBeginInfo::default()
            .render_pass(pass.render_pass)
            .framebuffer(pass.framebuffer)
            .render_area(vk::Rect2D {
                offset: vk::Offset2D { x: 0, y: 0 },
                extent: pass.extent,
            })
            .clear_values(&clear_values);

        driver.cmd_begin_render_pass(cmd, &render_pass_info);
        driver.cmd_bind_pipeline(cmd, pass.pipeline);

        for (model_index, model) in pass.models.iter().enumerate() {
            for mesh in &model.meshes {
                let Some(texture) = pass.textures.get(mesh.texture) else {
                    log::warn!("Skipping mesh of model {model_index}: no texture {}", mesh.texture);
                    continue;
                };

                driver.cmd_bind_vertex_buffer(cmd, mesh.vertex_buffer.buffer, 0);
                driver.cmd_bind_index_buffer(cmd, mesh.index_buffer.buffer, 0, vk::IndexType::UINT32);

                let dynamic_offsets = match pass.transforms {
                    ObjectTransforms::PushConstants => {
                        let model_data = ModelData {
                            model: model.transform,
                        };
                        driver.cmd_push_constants(
                            cmd,
                            pass.layout,
                            vk::ShaderStageFlags::VERTEX,
                            0,
                            bytemuck::bytes_of(&model_data),
                        );
                        Vec::new()
                    }
                    ObjectTransforms::DynamicUniform => {
                        vec![model_index as u32 * pass.model_stride]
                    }
                };

                driver.cmd_bind_descriptor_sets(
                    cmd,
                    pass.layout,
                    &[pass.uniform_set, texture.descriptor_set],
                    &dynamic_offsets,
                );
                driver.cmd_draw_indexed(cmd, mesh.index_count, 1, 0, 0, 0);
            }
        }

        driver.cmd_end_render_pass(cmd);
        driver
            .end_command_buffer(cmd)
            .map_err(DeviceError::vk("vkEndCommandBuffer"))
    }

    /// Submits image `image_index`'s commands once `frame`'s image is available;
    /// `frame`'s fence signals when the GPU is done with them.
    pub fn submit(
        &self,
        dev: &DeviceContext,
        image_index: usize,
        frame: &mut Frame,
    ) -> Result<(), DeviceError> {
        let command_buffers = [self.command_buffers[image_index]];
        let wait_semaphores = [frame.image_available];
        let wait_stages = [vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT];
        let signal_semaphores = [frame.render_finished];
        let submit = SubmitDesc {
            command_buffers: &command_buffers,
            wait_semaphores: &wait_semaphores,
            wait_stages: &wait_stages,
            signal_semaphores: &signal_semaphores,
        };

        dev.driver
            .queue_submit(dev.queues.graphics.handle, &submit, frame.in_flight)
            .map_err(DeviceError::vk("vkQueueSubmit"))?;
        frame.mark_submitted();
        Ok(())
    }

    /// Returns whether the swapchain no longer matches the surface exactly.
    pub fn present(
        &self,
        dev: &DeviceContext,
        swapchain: vk::SwapchainKHR,
        image_index: usize,
        frame: &Frame,
    ) -> Result<bool, SwapchainError> {
        dev.driver
            .queue_present(
                dev.queues.present.handle,
                swapchain,
                image_index as u32,
                frame.render_finished,
            )
            .map_err(SwapchainError::vk("vkQueuePresentKHR"))
    }

    /// Destroying the pool frees its command buffers.
    pub fn destroy(self, dev: &DeviceContext) {
        dev.driver.destroy_command_pool(self.pool);
    }
}
