use crate::renderer::config::ObjectTransforms;
use crate::renderer::contexts::device_ctx::DeviceContext;
use crate::renderer::contexts::device_ctx::target::RenderTarget;
use crate::renderer::error::ResourceError;
use crate::renderer::resources::shader::{GraphicsShader, ShaderCode};
use crate::renderer::shader_data::{ModelData, Vertex};
use ash::vk;

/// Responsibilities:
/// - Own the shader modules and the pipeline layout, which outlive swapchain rebuilds
/// - Build the render pass and graphics pipeline for the current render target
/// - Tear both down when the target is rebuilt
#[derive(Default)]
pub struct PipelineContext {
    shader: GraphicsShader,
    pub layout: vk::PipelineLayout,
    pub render_pass: vk::RenderPass,
    pub pipeline: vk::Pipeline,
    pub transforms: ObjectTransforms,
}

impl PipelineContext {
    pub const PUSH_CONSTANT_SIZE: u32 = size_of::<ModelData>() as u32;

    /// Set 0 holds the per-image uniforms, set 1 the texture sampler.
    pub fn new(
        dev: &DeviceContext,
        code: &ShaderCode,
        set_layouts: [vk::DescriptorSetLayout; 2],
        transforms: ObjectTransforms,
    ) -> Result<Self, ResourceError> {
        let shader = GraphicsShader::new(dev, code)?;

        let push_constant_ranges = match transforms {
            ObjectTransforms::PushConstants => vec![vk::PushConstantRange {
                stage_flags: vk::ShaderStageFlags::VERTEX,
                offset: 0,
                size: Self::PUSH_CONSTANT_SIZE,
            }],
            ObjectTransforms::DynamicUniform => Vec::new(),
        };
        let layout_info = vk::PipelineLayoutCreateInfo::default()
            .set_layouts(&set_layouts)
            .push_constant_ranges(&push_constant_ranges);
        let layout = match dev.driver.create_pipeline_layout(&layout_info) {
            Ok(layout) => layout,
            Err(result) => {
                shader.destroy(dev);
                return Err(ResourceError::creation("pipeline layout")(result));
            }
        };

        Ok(Self {
            shader,
            layout,
            render_pass: vk::RenderPass::null(),
            pipeline: vk::Pipeline::null(),
            transforms,
        })
    }

    /// (Re)creates the render pass and pipeline for `target`'s formats and extent.
    pub fn build(&mut self, dev: &DeviceContext, target: &RenderTarget) -> Result<(), ResourceError> {
        self.destroy_pass_and_pipeline(dev);
        self.render_pass = create_render_pass(
            dev,
            target.swapchain.format,
            target.depth_image.format,
        )?;
        self.pipeline = self.create_pipeline(dev, target.extent())?;
        log::debug!(
            "Built graphics pipeline for {}x{}",
            target.extent().width,
            target.extent().height
        );
        Ok(())
    }

    fn create_pipeline(
        &self,
        dev: &DeviceContext,
        extent: vk::Extent2D,
    ) -> Result<vk::Pipeline, ResourceError> {
        let entry_point = c"main";
        let stages = [
            vk::PipelineShaderStageCreateInfo::default()
                .stage(vk::ShaderStageFlags::VERTEX)
                .module(self.shader.vert_mod)
                .name(entry_point),
            vk::PipelineShaderStageCreateInfo::default()
                .stage(vk::ShaderStageFlags::FRAGMENT)
                .module(self.shader.frag_mod)
                .name(entry_point),
        ];

        let bindings = [Vertex::binding_description()];
        let attributes = Vertex::attribute_descriptions();
        let vertex_input = vk::PipelineVertexInputStateCreateInfo::default()
            .vertex_binding_descriptions(&bindings)
            .vertex_attribute_descriptions(&attributes);

        let input_assembly = vk::PipelineInputAssemblyStateCreateInfo::default()
            .topology(vk::PrimitiveTopology::TRIANGLE_LIST)
            .primitive_restart_enable(false);

        let viewports = [vk::Viewport {
            x: 0.0,
            y: 0.0,
            width: extent.width as f32,
            height: extent.height as f32,
            min_depth: 0.0,
            max_depth: 1.0,
        }];
        let scissors = [vk::Rect2D {
            offset: vk::Offset2D { x: 0, y: 0 },
            extent,
        }];
        let viewport_state = vk::PipelineViewportStateCreateInfo::default()
            .viewports(&viewports)
            .scissors(&scissors);

        let rasterization = vk::PipelineRasterizationStateCreateInfo::default()
            .depth_clamp_enable(false)
            .rasterizer_discard_enable(false)
            .polygon_mode(vk::PolygonMode::FILL)
            .line_width(1.0)
            .cull_mode(vk::CullModeFlags::BACK)
            .front_face(vk::FrontFace::COUNTER_CLOCKWISE)
            .depth_bias_enable(false);

        let multisample = vk::PipelineMultisampleStateCreateInfo::default()
            .sample_shading_enable(false)
            .rasterization_samples(vk::SampleCountFlags::TYPE_1);

        let blend_attachments = [vk::PipelineColorBlendAttachmentState::default()
            .color_write_mask(vk::ColorComponentFlags::RGBA)
            .blend_enable(true)
            .src_color_blend_factor(vk::BlendFactor::SRC_ALPHA)
            .dst_color_blend_factor(vk::BlendFactor::ONE_MINUS_SRC_ALPHA)
            .color_blend_op(vk::BlendOp::ADD)
            .src_alpha_blend_factor(vk::BlendFactor::ONE)
            .dst_alpha_blend_factor(vk::BlendFactor::ZERO)
            .alpha_blend_op(vk::BlendOp::ADD)];
        let color_blend = vk::PipelineColorBlendStateCreateInfo::default()
            .logic_op_enable(false)
            .attachments(&blend_attachments);

        let depth_stencil = vk::PipelineDepthStencilStateCreateInfo::default()
            .depth_test_enable(true)
            .depth_write_enable(true)
            .depth_compare_op(vk::CompareOp::LESS)
            .depth_bounds_test_enable(false)
            .stencil_test_enable(false);

        let pipeline_info = vk::GraphicsPipelineCreateInfo::default()
            .stages(&stages)
            .vertex_input_state(&vertex_input)
            .input_assembly_state(&input_assembly)
            .viewport_state(&viewport_state)
            .rasterization_state(&rasterization)
            .multisample_state(&multisample)
            .color_blend_state(&color_blend)
            .depth_stencil_state(&depth_stencil)
            .layout(self.layout)
            .render_pass(self.render_pass)
            .subpass(0);

        dev.driver
            .create_graphics_pipeline(&pipeline_info)
            .map_err(ResourceError::creation("graphics pipeline"))
    }

    /// Leaves the layout and shader modules alive for the next `build`.
    pub fn destroy_pass_and_pipeline(&mut self, dev: &DeviceContext) {
        dev.driver
            .destroy_pipeline(std::mem::take(&mut self.pipeline));
        dev.driver
            .destroy_render_pass(std::mem::take(&mut self.render_pass));
    }

    pub fn destroy(mut self, dev: &DeviceContext) {
        self.destroy_pass_and_pipeline(dev);
        dev.driver.destroy_pipeline_layout(self.layout);
        self.shader.destroy(dev);
    }
}

/// One subpass with a color attachment that ends up presentable and a
/// depth attachment whose contents are discarded.
fn create_render_pass(
    dev: &DeviceContext,
    color_format: vk::Format,
    depth_format: vk::Format,
) -> Result<vk::RenderPass, ResourceError> {
    let attachments = [
        vk::AttachmentDescription::default()
            .format(color_format)
            .samples(vk::SampleCountFlags::TYPE_1)
            .load_op(vk::AttachmentLoadOp::CLEAR)
            .store_op(vk::AttachmentStoreOp::STORE)
            .stencil_load_op(vk::AttachmentLoadOp::DONT_CARE)
            .stencil_store_op(vk::AttachmentStoreOp::DONT_CARE)
            .initial_layout(vk::ImageLayout::UNDEFINED)
            .final_layout(vk::ImageLayout::PRESENT_SRC_KHR),
        vk::AttachmentDescription::default()
            .format(depth_format)
            .samples(vk::SampleCountFlags::TYPE_1)
            .load_op(vk::AttachmentLoadOp::CLEAR)
            .store_op(vk::AttachmentStoreOp::DONT_CARE)
            .stencil_load_op(vk::AttachmentLoadOp::DONT_CARE)
            .stencil_store_op(vk::AttachmentStoreOp::DONT_CARE)
            .initial_layout(vk::ImageLayout::UNDEFINED)
            .final_layout(vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL),
    ];

    let color_refs = [vk::AttachmentReference {
        attachment: 0,
        layout: vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
    }];
    let depth_ref = vk::AttachmentReference {
        attachment: 1,
        layout: vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL,
    };
    let subpasses = [vk::SubpassDescription::default()
        .pipeline_bind_point(vk::PipelineBindPoint::GRAPHICS)
        .color_attachments(&color_refs)
        .depth_stencil_attachment(&depth_ref)];

    let attachment_stages = vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT
        | vk::PipelineStageFlags::EARLY_FRAGMENT_TESTS;
    let attachment_access = vk::AccessFlags::COLOR_ATTACHMENT_READ
        | vk::AccessFlags::COLOR_ATTACHMENT_WRITE
        | vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_WRITE;
    let dependencies = [
        vk::SubpassDependency::default()
            .src_subpass(vk::SUBPASS_EXTERNAL)
            .dst_subpass(0)
            .src_stage_mask(vk::PipelineStageFlags::BOTTOM_OF_PIPE)
            .dst_stage_mask(attachment_stages)
            .src_access_mask(vk::AccessFlags::MEMORY_READ)
            .dst_access_mask(attachment_access)
            .dependency_flags(vk::DependencyFlags::BY_REGION),
        vk::SubpassDependency::default()
            .src_subpass(0)
            .dst_subpass(vk::SUBPASS_EXTERNAL)
            .src_stage_mask(attachment_stages)
            .dst_stage_mask(vk::PipelineStageFlags::BOTTOM_OF_PIPE)
            .src_access_mask(attachment_access)
            .dst_access_mask(vk::AccessFlags::MEMORY_READ)
            .dependency_flags(vk::DependencyFlags::BY_REGION),
    ];

    let render_pass_info = vk::RenderPassCreateInfo::default()
        .attachments(&attachments)
        .subpasses(&subpasses)
        .dependencies(&dependencies);

    dev.driver
        .create_render_pass(&render_pass_info)
        .map_err(ResourceError::creation("render pass"))
}
