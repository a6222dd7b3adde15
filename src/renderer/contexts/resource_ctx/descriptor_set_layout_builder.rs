use crate::renderer::contexts::device_ctx::DeviceContext;
use crate::renderer::error::ResourceError;
use ash::vk;

pub struct DescriptorSetLayoutBuilder<'a> {
    bindings: Vec<vk::DescriptorSetLayoutBinding<'a>>,
}

impl DescriptorSetLayoutBuilder<'_> {
    pub fn new() -> Self {
        Self {
            bindings: Vec::new(),
        }
    }

    pub fn add_binding(
        mut self,
        binding: u32,
        descriptor_type: vk::DescriptorType,
        stages: vk::ShaderStageFlags,
    ) -> Self {
        let binding = vk::DescriptorSetLayoutBinding::default()
            .binding(binding)
            .descriptor_type(descriptor_type)
            .descriptor_count(1)
            .stage_flags(stages);

        self.bindings.push(binding);
        self
    }

    /// Descriptor counts per type, for sizing a pool that serves `sets` layouts like this one.
    pub fn pool_sizes(&self, sets: u32) -> Vec<vk::DescriptorPoolSize> {
        self.bindings
            .iter()
            .map(|binding| vk::DescriptorPoolSize {
                ty: binding.descriptor_type,
                descriptor_count: binding.descriptor_count * sets,
            })
            .collect()
    }

    pub fn build(&self, dev: &DeviceContext) -> Result<vk::DescriptorSetLayout, ResourceError> {
        let layout_info = vk::DescriptorSetLayoutCreateInfo::default().bindings(&self.bindings);

        dev.driver
            .create_descriptor_set_layout(&layout_info)
            .map_err(ResourceError::creation("descriptor set layout"))
    }
}
