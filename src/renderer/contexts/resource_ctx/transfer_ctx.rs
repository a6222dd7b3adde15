use crate::renderer::contexts::device_ctx::DeviceContext;
use crate::renderer::contexts::device_ctx::driver::{Driver, SubmitDesc};
use crate::renderer::error::ResourceError;
use crate::renderer::resources::buffer::GpuBuffer;
use crate::renderer::resources::image::GpuImage;
use ash::vk;
use bytemuck::Pod;

/// Access masks and pipeline stages for one supported layout transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LayoutTransition {
    pub src_access: vk::AccessFlags,
    pub dst_access: vk::AccessFlags,
    pub src_stage: vk::PipelineStageFlags,
    pub dst_stage: vk::PipelineStageFlags,
}

impl LayoutTransition {
    /// Only the two transitions needed to upload a sampled texture are allowed.
    pub fn lookup(old: vk::ImageLayout, new: vk::ImageLayout) -> Result<Self, ResourceError> {
        match (old, new) {
            (vk::ImageLayout::UNDEFINED, vk::ImageLayout::TRANSFER_DST_OPTIMAL) => Ok(Self {
                src_access: vk::AccessFlags::empty(),
                dst_access: vk::AccessFlags::TRANSFER_WRITE,
                src_stage: vk::PipelineStageFlags::TOP_OF_PIPE,
                dst_stage: vk::PipelineStageFlags::TRANSFER,
            }),
            (vk::ImageLayout::TRANSFER_DST_OPTIMAL, vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL) => {
                Ok(Self {
                    src_access: vk::AccessFlags::TRANSFER_WRITE,
                    dst_access: vk::AccessFlags::SHADER_READ,
                    src_stage: vk::PipelineStageFlags::TRANSFER,
                    dst_stage: vk::PipelineStageFlags::FRAGMENT_SHADER,
                })
            }
            (old, new) => Err(ResourceError::UnsupportedLayoutTransition { old, new }),
        }
    }
}

/// Records a layout transition barrier for the single color subresource of `image`.
pub fn record_layout_transition(
    driver: &dyn Driver,
    cmd: vk::CommandBuffer,
    image: vk::Image,
    old_layout: vk::ImageLayout,
    new_layout: vk::ImageLayout,
) -> Result<(), ResourceError> {
    let transition = LayoutTransition::lookup(old_layout, new_layout)?;
    let barrier = vk::ImageMemoryBarrier::default()
        .old_layout(old_layout)
        .new_layout(new_layout)
        .src_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
        .dst_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
        .image(image)
        .subresource_range(vk::ImageSubresourceRange {
            aspect_mask: vk::ImageAspectFlags::COLOR,
            base_mip_level: 0,
            level_count: 1,
            base_array_layer: 0,
            layer_count: 1,
        })
        .src_access_mask(transition.src_access)
        .dst_access_mask(transition.dst_access);
    driver.cmd_pipeline_barrier(cmd, transition.src_stage, transition.dst_stage, &[barrier]);
    Ok(())
}

/// Synchronous host-to-device uploads on the graphics queue.
///
/// Every submission blocks on `vkQueueWaitIdle`, so this is only meant for
/// load-time work, never inside the frame loop.
#[derive(Default)]
pub struct TransferContext {
    command_pool: vk::CommandPool,
    queue: vk::Queue,
}

impl TransferContext {
    pub fn new(dev: &DeviceContext) -> Result<Self, ResourceError> {
        let command_pool_info = vk::CommandPoolCreateInfo::default()
            .queue_family_index(dev.queues.graphics.family_index)
            .flags(vk::CommandPoolCreateFlags::TRANSIENT);
        let command_pool = dev
            .driver
            .create_command_pool(&command_pool_info)
            .map_err(ResourceError::creation("transfer command pool"))?;

        Ok(Self {
            command_pool,
            queue: dev.queues.graphics.handle,
        })
    }

    /// Record `func` into a fresh one-time command buffer, submit it, and wait
    /// for the queue to drain before freeing the command buffer.
    pub fn immediate_submit<F>(
        &self,
        dev: &DeviceContext,
        func: F,
    ) -> Result<(), ResourceError>
    where
        F: FnOnce(vk::CommandBuffer, &dyn Driver) -> Result<(), ResourceError>,
    {
        let alloc_info = vk::CommandBufferAllocateInfo::default()
            .command_pool(self.command_pool)
            .level(vk::CommandBufferLevel::PRIMARY)
            .command_buffer_count(1);
        let cmd = dev
            .driver
            .allocate_command_buffers(&alloc_info)
            .map_err(ResourceError::creation("transfer command buffer"))?
            .first()
            .copied()
            .ok_or(ResourceError::CreationFailed {
                what: "transfer command buffer",
                result: vk::Result::ERROR_UNKNOWN,
            })?;

        let result = Self::record_and_submit(dev, self.queue, cmd, func);
        dev.driver.free_command_buffers(self.command_pool, &[cmd]);
        result
    }

    fn record_and_submit<F>(
        dev: &DeviceContext,
        queue: vk::Queue,
        cmd: vk::CommandBuffer,
        func: F,
    ) -> Result<(), ResourceError>
    where
        F: FnOnce(vk::CommandBuffer, &dyn Driver) -> Result<(), ResourceError>,
    {
        let driver = dev.driver.as_ref();
        driver
            .begin_command_buffer(cmd, vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT)
            .map_err(ResourceError::vk("vkBeginCommandBuffer"))?;

        if let Err(e) = func(cmd, driver) {
            // Leave the buffer in a state that can be freed
            let _ = driver.end_command_buffer(cmd);
            return Err(e);
        }

        driver
            .end_command_buffer(cmd)
            .map_err(ResourceError::vk("vkEndCommandBuffer"))?;

        let cmds = [cmd];
        let submit = SubmitDesc {
            command_buffers: &cmds,
            ..Default::default()
        };
        driver
            .queue_submit(queue, &submit, vk::Fence::null())
            .map_err(ResourceError::vk("vkQueueSubmit"))?;
        driver
            .queue_wait_idle(queue)
            .map_err(ResourceError::vk("vkQueueWaitIdle"))
    }

    /// Copy `data` into a new device-local buffer with `usage | TRANSFER_DST`
    /// through a temporary host-visible staging buffer.
    pub fn upload_via_staging<T>(
        &self,
        dev: &DeviceContext,
        data: &[T],
        usage: vk::BufferUsageFlags,
    ) -> Result<GpuBuffer, ResourceError>
    where
        T: Pod,
    {
        let size = std::mem::size_of_val(data) as vk::DeviceSize;
        let staging = GpuBuffer::new_host_visible(dev, size, vk::BufferUsageFlags::TRANSFER_SRC)?;

        let result = staging.write(dev, data, 0).and_then(|_| {
            let dst = GpuBuffer::new(
                dev,
                size,
                usage | vk::BufferUsageFlags::TRANSFER_DST,
                vk::MemoryPropertyFlags::DEVICE_LOCAL,
            )?;
            let copied = self.immediate_submit(dev, |cmd, driver| {
                let region = vk::BufferCopy {
                    src_offset: 0,
                    dst_offset: 0,
                    size,
                };
                driver.cmd_copy_buffer(cmd, staging.buffer, dst.buffer, &[region]);
                Ok(())
            });
            match copied {
                Ok(()) => Ok(dst),
                Err(e) => {
                    dst.destroy(dev);
                    Err(e)
                }
            }
        });

        staging.destroy(dev);
        result
    }

    /// Upload tightly packed RGBA8 pixels into a new sampled image left in
    /// `SHADER_READ_ONLY_OPTIMAL`.
    pub fn upload_image(
        &self,
        dev: &DeviceContext,
        pixels: &[u8],
        width: u32,
        height: u32,
    ) -> Result<GpuImage, ResourceError> {
        let size = std::mem::size_of_val(pixels) as vk::DeviceSize;
        let staging = GpuBuffer::new_host_visible(dev, size, vk::BufferUsageFlags::TRANSFER_SRC)?;

        let result = staging.write(dev, pixels, 0).and_then(|_| {
            let image = GpuImage::new_texture_image(dev, width, height)?;
            let copied = self.immediate_submit(dev, |cmd, driver| {
                record_layout_transition(
                    driver,
                    cmd,
                    image.image,
                    vk::ImageLayout::UNDEFINED,
                    vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                )?;
                let region = vk::BufferImageCopy {
                    buffer_offset: 0,
                    buffer_row_length: 0,
                    buffer_image_height: 0,
                    image_subresource: vk::ImageSubresourceLayers {
                        aspect_mask: vk::ImageAspectFlags::COLOR,
                        mip_level: 0,
                        base_array_layer: 0,
                        layer_count: 1,
                    },
                    image_offset: vk::Offset3D { x: 0, y: 0, z: 0 },
                    image_extent: vk::Extent3D {
                        width,
                        height,
                        depth: 1,
                    },
                };
                driver.cmd_copy_buffer_to_image(
                    cmd,
                    staging.buffer,
                    image.image,
                    vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                    &[region],
                );
                record_layout_transition(
                    driver,
                    cmd,
                    image.image,
                    vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                    vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
                )
            });
            match copied {
                Ok(()) => Ok(image),
                Err(e) => {
                    image.destroy(dev);
                    Err(e)
                }
            }
        });

        staging.destroy(dev);
        result
    }

    /// Transition `image` in its own submission.
    pub fn transition_image_layout(
        &self,
        dev: &DeviceContext,
        image: vk::Image,
        old_layout: vk::ImageLayout,
        new_layout: vk::ImageLayout,
    ) -> Result<(), ResourceError> {
        // Reject before touching the queue
        LayoutTransition::lookup(old_layout, new_layout)?;
        self.immediate_submit(dev, |cmd, driver| {
            record_layout_transition(driver, cmd, image, old_layout, new_layout)
        })
    }

    pub fn destroy(self, dev: &DeviceContext) {
        dev.driver.destroy_command_pool(self.command_pool);
    }
}
