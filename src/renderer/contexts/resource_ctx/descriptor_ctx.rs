use crate::renderer::config::{ObjectTransforms, RenderConfig};
use crate::renderer::contexts::device_ctx::DeviceContext;
use crate::renderer::contexts::resource_ctx::descriptor_set_layout_builder::DescriptorSetLayoutBuilder;
use crate::renderer::error::ResourceError;
use crate::renderer::resources::buffer::GpuBuffer;
use crate::renderer::shader_data::{ModelData, ViewProjection};
use ash::vk;
use glam::Mat4;

const VIEW_PROJECTION_SIZE: vk::DeviceSize = size_of::<ViewProjection>() as vk::DeviceSize;
const MODEL_DATA_SIZE: vk::DeviceSize = size_of::<ModelData>() as vk::DeviceSize;

/// Rounds `size` up to the next multiple of `alignment`.
pub fn align_up(size: vk::DeviceSize, alignment: vk::DeviceSize) -> vk::DeviceSize {
    if alignment == 0 {
        return size;
    }
    size.div_ceil(alignment) * alignment
}

/// Set 0: view/projection, plus the dynamic model array when that strategy is active.
fn uniform_layout_builder(transforms: ObjectTransforms) -> DescriptorSetLayoutBuilder<'static> {
    let builder = DescriptorSetLayoutBuilder::new().add_binding(
        0,
        vk::DescriptorType::UNIFORM_BUFFER,
        vk::ShaderStageFlags::VERTEX,
    );
    match transforms {
        ObjectTransforms::PushConstants => builder,
        ObjectTransforms::DynamicUniform => builder.add_binding(
            1,
            vk::DescriptorType::UNIFORM_BUFFER_DYNAMIC,
            vk::ShaderStageFlags::VERTEX,
        ),
    }
}

/// Set 1: the texture sampled by the fragment stage.
fn sampler_layout_builder() -> DescriptorSetLayoutBuilder<'static> {
    DescriptorSetLayoutBuilder::new().add_binding(
        0,
        vk::DescriptorType::COMBINED_IMAGE_SAMPLER,
        vk::ShaderStageFlags::FRAGMENT,
    )
}

/// Uniform buffers and their descriptor sets, one of each per swapchain image.
#[derive(Debug, Default)]
struct PerImageUniforms {
    pool: vk::DescriptorPool,
    sets: Vec<vk::DescriptorSet>,
    view_projection: Vec<GpuBuffer>,
    model_transforms: Vec<GpuBuffer>,
}

impl PerImageUniforms {
    fn destroy(self, dev: &DeviceContext) {
        dev.driver.destroy_descriptor_pool(self.pool);
        for buffer in self.view_projection.into_iter().chain(self.model_transforms) {
            buffer.destroy(dev);
        }
    }
}

/// Responsibilities:
/// - Own the descriptor set layouts shared with the pipeline layout
/// - Own the per-image uniform buffers and sets, rebuilt with the swapchain
/// - Hand out one sampler set per texture from a fixed-size pool
#[derive(Debug, Default)]
pub struct DescriptorContext {
    pub uniform_layout: vk::DescriptorSetLayout,
    pub sampler_layout: vk::DescriptorSetLayout,

    transforms: ObjectTransforms,
    max_objects: usize,
    model_stride: vk::DeviceSize,

    sampler: vk::Sampler,
    sampler_pool: vk::DescriptorPool,
    texture_sets: usize,

    per_image: PerImageUniforms,
}

impl DescriptorContext {
    pub fn new(
        dev: &DeviceContext,
        config: &RenderConfig,
        image_count: usize,
    ) -> Result<Self, ResourceError> {
        let mut ctx = Self {
            transforms: config.object_transforms,
            max_objects: config.max_objects,
            model_stride: align_up(MODEL_DATA_SIZE, dev.limits.min_uniform_buffer_offset_alignment),
            ..Default::default()
        };

        // Everything still null is skipped by destroy
        if let Err(e) = ctx.init(dev, image_count) {
            ctx.destroy(dev);
            return Err(e);
        }
        Ok(ctx)
    }

    fn init(&mut self, dev: &DeviceContext, image_count: usize) -> Result<(), ResourceError> {
        self.uniform_layout = uniform_layout_builder(self.transforms).build(dev)?;
        self.sampler_layout = sampler_layout_builder().build(dev)?;

        let sampler_info = vk::SamplerCreateInfo::default()
            .mag_filter(vk::Filter::LINEAR)
            .min_filter(vk::Filter::LINEAR)
            .address_mode_u(vk::SamplerAddressMode::REPEAT)
            .address_mode_v(vk::SamplerAddressMode::REPEAT)
            .address_mode_w(vk::SamplerAddressMode::REPEAT)
            .anisotropy_enable(false)
            .max_anisotropy(1.0)
            .border_color(vk::BorderColor::INT_OPAQUE_BLACK)
            .unnormalized_coordinates(false)
            .compare_enable(false)
            .compare_op(vk::CompareOp::ALWAYS)
            .mipmap_mode(vk::SamplerMipmapMode::LINEAR);
        self.sampler = dev
            .driver
            .create_sampler(&sampler_info)
            .map_err(ResourceError::creation("sampler"))?;

        let max_textures = self.max_objects as u32;
        let pool_sizes = sampler_layout_builder().pool_sizes(max_textures);
        let pool_info = vk::DescriptorPoolCreateInfo::default()
            .pool_sizes(&pool_sizes)
            .max_sets(max_textures);
        self.sampler_pool = dev
            .driver
            .create_descriptor_pool(&pool_info)
            .map_err(ResourceError::creation("sampler descriptor pool"))?;

        self.recreate_per_image(dev, image_count)
    }

    /// Replace the per-image buffers and sets for a swapchain with `image_count` images.
    ///
    /// The device must be idle: the old sets may still be referenced by recorded commands.
    pub fn recreate_per_image(
        &mut self,
        dev: &DeviceContext,
        image_count: usize,
    ) -> Result<(), ResourceError> {
        std::mem::take(&mut self.per_image).destroy(dev);
        self.per_image = self.create_per_image(dev, image_count)?;
        log::debug!("Created uniform sets for {image_count} swapchain images");
        Ok(())
    }

    fn create_per_image(
        &self,
        dev: &DeviceContext,
        image_count: usize,
    ) -> Result<PerImageUniforms, ResourceError> {
        let mut uniforms = PerImageUniforms::default();
        match self.fill_per_image(dev, image_count, &mut uniforms) {
            Ok(()) => Ok(uniforms),
            Err(e) => {
                uniforms.destroy(dev);
                Err(e)
            }
        }
    }

    fn fill_per_image(
        &self,
        dev: &DeviceContext,
        image_count: usize,
        uniforms: &mut PerImageUniforms,
    ) -> Result<(), ResourceError> {
        let count = image_count as u32;
        let pool_sizes = uniform_layout_builder(self.transforms).pool_sizes(count);
        let pool_info = vk::DescriptorPoolCreateInfo::default()
            .pool_sizes(&pool_sizes)
            .max_sets(count);
        uniforms.pool = dev
            .driver
            .create_descriptor_pool(&pool_info)
            .map_err(ResourceError::creation("uniform descriptor pool"))?;

        let layouts = vec![self.uniform_layout; image_count];
        let alloc_info = vk::DescriptorSetAllocateInfo::default()
            .descriptor_pool(uniforms.pool)
            .set_layouts(&layouts);
        uniforms.sets = dev
            .driver
            .allocate_descriptor_sets(&alloc_info)
            .map_err(ResourceError::vk("vkAllocateDescriptorSets"))?;

        for set in uniforms.sets.clone() {
            let view_projection = GpuBuffer::new_host_visible(
                dev,
                VIEW_PROJECTION_SIZE,
                vk::BufferUsageFlags::UNIFORM_BUFFER,
            )?;
            let view_projection_info = [vk::DescriptorBufferInfo {
                buffer: view_projection.buffer,
                offset: 0,
                range: VIEW_PROJECTION_SIZE,
            }];
            uniforms.view_projection.push(view_projection);

            let mut model_info = None;
            if self.transforms == ObjectTransforms::DynamicUniform {
                let models = GpuBuffer::new_host_visible(
                    dev,
                    self.model_stride * self.max_objects as vk::DeviceSize,
                    vk::BufferUsageFlags::UNIFORM_BUFFER,
                )?;
                // The dynamic offset selects the element, the range covers one matrix
                model_info = Some([vk::DescriptorBufferInfo {
                    buffer: models.buffer,
                    offset: 0,
                    range: MODEL_DATA_SIZE,
                }]);
                uniforms.model_transforms.push(models);
            }

            let mut writes = vec![
                vk::WriteDescriptorSet::default()
                    .dst_set(set)
                    .dst_binding(0)
                    .dst_array_element(0)
                    .descriptor_type(vk::DescriptorType::UNIFORM_BUFFER)
                    .buffer_info(&view_projection_info),
            ];
            if let Some(model_info) = &model_info {
                writes.push(
                    vk::WriteDescriptorSet::default()
                        .dst_set(set)
                        .dst_binding(1)
                        .dst_array_element(0)
                        .descriptor_type(vk::DescriptorType::UNIFORM_BUFFER_DYNAMIC)
                        .buffer_info(model_info),
                );
            }
            dev.driver.update_descriptor_sets(&writes);
        }

        Ok(())
    }

    pub fn transforms(&self) -> ObjectTransforms {
        self.transforms
    }

    /// Byte distance between consecutive model matrices in the dynamic buffer.
    pub fn model_stride(&self) -> u32 {
        self.model_stride as u32
    }

    pub fn uniform_set(&self, image_index: usize) -> vk::DescriptorSet {
        self.per_image.sets[image_index]
    }

    pub fn texture_count(&self) -> usize {
        self.texture_sets
    }

    pub fn update_uniforms(
        &self,
        dev: &DeviceContext,
        image_index: usize,
        view_projection: &ViewProjection,
    ) -> Result<(), ResourceError> {
        self.per_image.view_projection[image_index].write(dev, &[*view_projection], 0)
    }

    /// Writes the model matrices for image `image_index`; a no-op with push constants.
    pub fn update_model_transforms(
        &self,
        dev: &DeviceContext,
        image_index: usize,
        transforms: &[Mat4],
    ) -> Result<(), ResourceError> {
        let Some(buffer) = self.per_image.model_transforms.get(image_index) else {
            return Ok(());
        };
        if transforms.is_empty() {
            return Ok(());
        }
        if transforms.len() > self.max_objects {
            return Err(ResourceError::ObjectLimitReached(self.max_objects));
        }

        let stride = self.model_stride as usize;
        let mut bytes = vec![0u8; stride * transforms.len()];
        for (chunk, transform) in bytes.chunks_exact_mut(stride).zip(transforms) {
            let model = ModelData { model: *transform };
            chunk[..MODEL_DATA_SIZE as usize].copy_from_slice(bytemuck::bytes_of(&model));
        }
        buffer.write(dev, &bytes, 0)
    }

    /// Allocates the sampler set for a texture whose image is in `SHADER_READ_ONLY_OPTIMAL`.
    pub fn allocate_texture_set(
        &mut self,
        dev: &DeviceContext,
        view: vk::ImageView,
    ) -> Result<vk::DescriptorSet, ResourceError> {
        let layouts = [self.sampler_layout];
        let alloc_info = vk::DescriptorSetAllocateInfo::default()
            .descriptor_pool(self.sampler_pool)
            .set_layouts(&layouts);
        let set = match dev.driver.allocate_descriptor_sets(&alloc_info) {
            Ok(sets) => sets[0],
            Err(vk::Result::ERROR_OUT_OF_POOL_MEMORY | vk::Result::ERROR_FRAGMENTED_POOL) => {
                return Err(ResourceError::DescriptorPoolExhausted);
            }
            Err(result) => return Err(ResourceError::vk("vkAllocateDescriptorSets")(result)),
        };

        let image_info = [vk::DescriptorImageInfo {
            sampler: self.sampler,
            image_view: view,
            image_layout: vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
        }];
        let write = vk::WriteDescriptorSet::default()
            .dst_set(set)
            .dst_binding(0)
            .dst_array_element(0)
            .descriptor_type(vk::DescriptorType::COMBINED_IMAGE_SAMPLER)
            .image_info(&image_info);
        dev.driver.update_descriptor_sets(&[write]);

        self.texture_sets += 1;
        Ok(set)
    }

    /// Destroying the pools releases every set allocated from them.
    pub fn destroy(self, dev: &DeviceContext) {
        self.per_image.destroy(dev);
        dev.driver.destroy_descriptor_pool(self.sampler_pool);
        dev.driver.destroy_sampler(self.sampler);
        dev.driver.destroy_descriptor_set_layout(self.sampler_layout);
        dev.driver.destroy_descriptor_set_layout(self.uniform_layout);
    }
}
