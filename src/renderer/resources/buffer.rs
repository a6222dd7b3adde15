use crate::renderer::contexts::device_ctx::DeviceContext;
use crate::renderer::contexts::resource_ctx::memory;
use crate::renderer::error::ResourceError;
use ash::vk;
use bytemuck::Pod;

/// A buffer with its own dedicated memory block.
///
/// Never frees itself: the owner must hand it back through `destroy`.
#[derive(Debug)]
pub struct GpuBuffer {
    pub buffer: vk::Buffer,
    pub memory: vk::DeviceMemory,
    pub size: vk::DeviceSize,
}

impl GpuBuffer {
    pub fn new(
        dev: &DeviceContext,
        size: vk::DeviceSize,
        usage: vk::BufferUsageFlags,
        properties: vk::MemoryPropertyFlags,
    ) -> Result<Self, ResourceError> {
        if size == 0 {
            return Err(ResourceError::EmptyData);
        }

        let buffer_info = vk::BufferCreateInfo::default()
            .size(size)
            .usage(usage)
            .sharing_mode(vk::SharingMode::EXCLUSIVE);
        let buffer = dev
            .driver
            .create_buffer(&buffer_info)
            .map_err(ResourceError::creation("buffer"))?;

        let requirements = dev.driver.buffer_memory_requirements(buffer);
        let memory = match memory::allocate(dev, requirements, properties) {
            Ok(memory) => memory,
            Err(e) => {
                dev.driver.destroy_buffer(buffer);
                return Err(e);
            }
        };

        if let Err(result) = dev.driver.bind_buffer_memory(buffer, memory, 0) {
            dev.driver.free_memory(memory);
            dev.driver.destroy_buffer(buffer);
            return Err(ResourceError::CreationFailed {
                what: "buffer memory binding",
                result,
            });
        }

        log::debug!("Created buffer {:?} ({} bytes, {:?})", buffer, size, usage);

        Ok(Self {
            buffer,
            memory,
            size,
        })
    }

    /// Host-visible, host-coherent buffer that can be written with `write`.
    pub fn new_host_visible(
        dev: &DeviceContext,
        size: vk::DeviceSize,
        usage: vk::BufferUsageFlags,
    ) -> Result<Self, ResourceError> {
        Self::new(
            dev,
            size,
            usage,
            vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT,
        )
    }

    pub fn write<T>(
        &self,
        dev: &DeviceContext,
        data: &[T],
        offset: vk::DeviceSize,
    ) -> Result<(), ResourceError>
    where
        T: Pod,
    {
        let bytes: &[u8] = bytemuck::cast_slice(data);
        let len = bytes.len() as vk::DeviceSize;
        if offset + len > self.size {
            return Err(ResourceError::WriteOutOfBounds {
                offset,
                len,
                size: self.size,
            });
        }
        dev.driver
            .write_memory(self.memory, offset, bytes)
            .map_err(ResourceError::vk("vkMapMemory"))
    }

    pub fn destroy(self, dev: &DeviceContext) {
        dev.driver.destroy_buffer(self.buffer);
        dev.driver.free_memory(self.memory);
    }
}
