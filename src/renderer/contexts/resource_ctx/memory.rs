use crate::renderer::contexts::device_ctx::DeviceContext;
use crate::renderer::error::ResourceError;
use ash::vk;

/// Lowest memory type index that is both allowed by `allowed` and carries every
/// flag in `required`.
pub fn find_memory_type(
    properties: &vk::PhysicalDeviceMemoryProperties,
    allowed: u32,
    required: vk::MemoryPropertyFlags,
) -> Result<u32, ResourceError> {
    properties
        .memory_types_as_slice()
        .iter()
        .enumerate()
        .position(|(i, memory_type)| {
            allowed & (1 << i) != 0 && memory_type.property_flags.contains(required)
        })
        .map(|i| i as u32)
        .ok_or(ResourceError::NoSuitableMemoryType { allowed, required })
}

/// Allocates a block satisfying `requirements` from the first matching memory type.
pub fn allocate(
    dev: &DeviceContext,
    requirements: vk::MemoryRequirements,
    properties: vk::MemoryPropertyFlags,
) -> Result<vk::DeviceMemory, ResourceError> {
    let memory_type_index = find_memory_type(
        &dev.memory_properties,
        requirements.memory_type_bits,
        properties,
    )?;
    let allocate_info = vk::MemoryAllocateInfo::default()
        .allocation_size(requirements.size)
        .memory_type_index(memory_type_index);
    dev.driver
        .allocate_memory(&allocate_info)
        .map_err(ResourceError::creation("device memory"))
}
