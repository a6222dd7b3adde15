use crate::renderer::contexts::device_ctx::driver::{Driver, SubmitDesc};
use crate::renderer::contexts::device_ctx::instance::RenderInstance;
use crate::renderer::contexts::device_ctx::queue::{Queue, QueueFamilyIndices, Queues};
use crate::renderer::error::DeviceError;
use ash::prelude::VkResult;
use ash::vk;
use std::ffi::{CStr, c_char};
use std::ptr::NonNull;
use std::sync::Arc;
use winit::window::Window;

/// `Driver` backed by a real Vulkan device presenting to a winit window
pub struct AshDriver {
    window: Arc<Window>,
    surface: vk::SurfaceKHR,
    physical: vk::PhysicalDevice,
    logical: ash::Device,
    swapchain_loader: ash::khr::swapchain::Device,
    memory_properties: vk::PhysicalDeviceMemoryProperties,
    limits: vk::PhysicalDeviceLimits,

    // Dropped last
    instance: RenderInstance,
}

impl AshDriver {
    pub fn new(window: Arc<Window>, validation: bool) -> Result<(Self, Queues), DeviceError> {
        let instance = RenderInstance::new(&window, validation)?;
        let surface = instance.create_surface(&window)?;

        let (physical, families) = match Self::select_physical_device(&instance, surface) {
            Ok(selected) => selected,
            Err(e) => {
                unsafe { instance.surface_loader.destroy_surface(surface, None) };
                return Err(e);
            }
        };

        let logical = match Self::create_logical_device(&instance.instance, physical, families) {
            Ok(logical) => logical,
            Err(e) => {
                unsafe { instance.surface_loader.destroy_surface(surface, None) };
                return Err(e);
            }
        };

        let queues = unsafe {
            Queues {
                graphics: Queue::new(families.graphics, logical.get_device_queue(families.graphics, 0)),
                present: Queue::new(families.present, logical.get_device_queue(families.present, 0)),
            }
        };

        let (memory_properties, properties) = unsafe {
            (
                instance.instance.get_physical_device_memory_properties(physical),
                instance.instance.get_physical_device_properties(physical),
            )
        };
        log::info!(
            "Using {:?} ({:?}), graphics family {}, present family {}",
            properties.device_name_as_c_str().unwrap_or(c"unknown"),
            properties.device_type,
            families.graphics,
            families.present,
        );

        let swapchain_loader = ash::khr::swapchain::Device::new(&instance.instance, &logical);

        Ok((
            Self {
                window,
                surface,
                physical,
                logical,
                swapchain_loader,
                memory_properties,
                limits: properties.limits,
                instance,
            },
            queues,
        ))
    }

    fn select_physical_device(
        instance: &RenderInstance,
        surface: vk::SurfaceKHR,
    ) -> Result<(vk::PhysicalDevice, QueueFamilyIndices), DeviceError> {
        let req_device_exts = Self::required_device_extensions();
        let devices = unsafe {
            instance
                .instance
                .enumerate_physical_devices()
                .map_err(DeviceError::vk("vkEnumeratePhysicalDevices"))?
        };

        unsafe {
            devices
                .into_iter()
                // Filter out devices that do not contain the required device extensions
                .filter(|device| {
                    let supported_extensions = instance
                        .instance
                        .enumerate_device_extension_properties(*device)
                        .unwrap_or_default();

                    req_device_exts.iter().all(|req_ext| {
                        let req_ext_supported = supported_extensions
                            .iter()
                            .any(|sup_ext| {
                                sup_ext
                                    .extension_name_as_c_str()
                                    .is_ok_and(|name| name == *req_ext)
                            });
                        if !req_ext_supported {
                            log::debug!("Device extension not supported: {:?}", req_ext);
                        }
                        req_ext_supported
                    })
                })
                // Filter out devices that cannot present anything to the surface
                .filter(|device| {
                    let formats = instance
                        .surface_loader
                        .get_physical_device_surface_formats(*device, surface)
                        .unwrap_or_default();
                    let present_modes = instance
                        .surface_loader
                        .get_physical_device_surface_present_modes(*device, surface)
                        .unwrap_or_default();
                    !formats.is_empty() && !present_modes.is_empty()
                })
                // Filter out devices that do not contain the required queues
                .filter_map(|device| {
                    let props = instance
                        .instance
                        .get_physical_device_queue_family_properties(device);
                    QueueFamilyIndices::select(&props, |i| {
                        instance
                            .surface_loader
                            .get_physical_device_surface_support(device, i, surface)
                            .unwrap_or(false)
                    })
                    .map(|families| (device, families))
                })
                .min_by_key(|(device, _)| {
                    let props = instance.instance.get_physical_device_properties(*device);
                    match props.device_type {
                        vk::PhysicalDeviceType::DISCRETE_GPU => 0,
                        vk::PhysicalDeviceType::INTEGRATED_GPU => 1,
                        vk::PhysicalDeviceType::VIRTUAL_GPU => 2,
                        vk::PhysicalDeviceType::CPU => 3,
                        vk::PhysicalDeviceType::OTHER => 4,
                        _ => 5,
                    }
                })
                .ok_or(DeviceError::NoSuitableDevice)
        }
    }

    fn create_logical_device(
        instance: &ash::Instance,
        physical: vk::PhysicalDevice,
        families: QueueFamilyIndices,
    ) -> Result<ash::Device, DeviceError> {
        let queue_priorities = [1.0];
        let queue_create_infos = families
            .unique()
            .iter()
            .map(|index| {
                vk::DeviceQueueCreateInfo::default()
                    .queue_family_index(*index)
                    .queue_priorities(&queue_priorities)
            })
            .collect::<Vec<_>>();

        let enabled_extension_names = Self::required_device_extensions()
            .iter()
            .map(|ext| ext.as_ptr())
            .collect::<Vec<*const c_char>>();
        let enabled_features = vk::PhysicalDeviceFeatures::default();

        let device_create_info = vk::DeviceCreateInfo::default()
            .queue_create_infos(&queue_create_infos)
            .enabled_extension_names(&enabled_extension_names)
            .enabled_features(&enabled_features);

        unsafe {
            instance
                .create_device(physical, &device_create_info, None)
                .map_err(DeviceError::vk("vkCreateDevice"))
        }
    }

    fn required_device_extensions() -> Vec<&'static CStr> {
        vec![
            ash::khr::swapchain::NAME,
            #[cfg(target_os = "macos")]
            ash::khr::portability_subset::NAME,
        ]
    }
}

impl Drop for AshDriver {
    fn drop(&mut self) {
        unsafe {
            if let Err(e) = self.logical.device_wait_idle() {
                log::error!("vkDeviceWaitIdle failed during shutdown: {}", e);
            }
            self.logical.destroy_device(None);
            self.instance.surface_loader.destroy_surface(self.surface, None);
        }
    }
}

impl Driver for AshDriver {
    fn memory_properties(&self) -> vk::PhysicalDeviceMemoryProperties {
        self.memory_properties
    }

    fn limits(&self) -> vk::PhysicalDeviceLimits {
        self.limits
    }

    fn format_properties(&self, format: vk::Format) -> vk::FormatProperties {
        unsafe {
            self.instance
                .instance
                .get_physical_device_format_properties(self.physical, format)
        }
    }

    fn surface_capabilities(&self) -> VkResult<vk::SurfaceCapabilitiesKHR> {
        unsafe {
            self.instance
                .surface_loader
                .get_physical_device_surface_capabilities(self.physical, self.surface)
        }
    }

    fn surface_formats(&self) -> VkResult<Vec<vk::SurfaceFormatKHR>> {
        unsafe {
            self.instance
                .surface_loader
                .get_physical_device_surface_formats(self.physical, self.surface)
        }
    }

    fn surface_present_modes(&self) -> VkResult<Vec<vk::PresentModeKHR>> {
        unsafe {
            self.instance
                .surface_loader
                .get_physical_device_surface_present_modes(self.physical, self.surface)
        }
    }

    fn window_extent(&self) -> vk::Extent2D {
        let size = self.window.inner_size();
        vk::Extent2D {
            width: size.width,
            height: size.height,
        }
    }

    fn device_wait_idle(&self) -> VkResult<()> {
        unsafe { self.logical.device_wait_idle() }
    }

    fn queue_wait_idle(&self, queue: vk::Queue) -> VkResult<()> {
        unsafe { self.logical.queue_wait_idle(queue) }
    }

    fn allocate_memory(&self, info: &vk::MemoryAllocateInfo<'_>) -> VkResult<vk::DeviceMemory> {
        unsafe { self.logical.allocate_memory(info, None) }
    }

    fn free_memory(&self, memory: vk::DeviceMemory) {
        unsafe { self.logical.free_memory(memory, None) }
    }

    fn write_memory(&self, memory: vk::DeviceMemory, offset: vk::DeviceSize, data: &[u8]) -> VkResult<()> {
        if data.is_empty() {
            return Ok(());
        }
        let size = data.len() as vk::DeviceSize;
        unsafe {
            let mapped = self
                .logical
                .map_memory(memory, offset, size, vk::MemoryMapFlags::empty())?;
            let Some(mapped) = NonNull::new(mapped.cast::<u8>()) else {
                self.logical.unmap_memory(memory);
                return Err(vk::Result::ERROR_MEMORY_MAP_FAILED);
            };
            let mut raw_allocation = presser::RawAllocation::from_raw_parts(mapped, data.len());
            let mut slab = raw_allocation.borrow_as_slab();
            let copied = presser::copy_from_slice_to_offset(data, &mut slab, 0);
            self.logical.unmap_memory(memory);
            copied
                .map(|_| ())
                .map_err(|_| vk::Result::ERROR_MEMORY_MAP_FAILED)
        }
    }

    fn create_buffer(&self, info: &vk::BufferCreateInfo<'_>) -> VkResult<vk::Buffer> {
        unsafe { self.logical.create_buffer(info, None) }
    }

    fn destroy_buffer(&self, buffer: vk::Buffer) {
        unsafe { self.logical.destroy_buffer(buffer, None) }
    }

    fn buffer_memory_requirements(&self, buffer: vk::Buffer) -> vk::MemoryRequirements {
        unsafe { self.logical.get_buffer_memory_requirements(buffer) }
    }

    fn bind_buffer_memory(&self, buffer: vk::Buffer, memory: vk::DeviceMemory, offset: vk::DeviceSize) -> VkResult<()> {
        unsafe { self.logical.bind_buffer_memory(buffer, memory, offset) }
    }

    fn create_image(&self, info: &vk::ImageCreateInfo<'_>) -> VkResult<vk::Image> {
        unsafe { self.logical.create_image(info, None) }
    }

    fn destroy_image(&self, image: vk::Image) {
        unsafe { self.logical.destroy_image(image, None) }
    }

    fn image_memory_requirements(&self, image: vk::Image) -> vk::MemoryRequirements {
        unsafe { self.logical.get_image_memory_requirements(image) }
    }

    fn bind_image_memory(&self, image: vk::Image, memory: vk::DeviceMemory, offset: vk::DeviceSize) -> VkResult<()> {
        unsafe { self.logical.bind_image_memory(image, memory, offset) }
    }

    fn create_image_view(&self, info: &vk::ImageViewCreateInfo<'_>) -> VkResult<vk::ImageView> {
        unsafe { self.logical.create_image_view(info, None) }
    }

    fn destroy_image_view(&self, view: vk::ImageView) {
        unsafe { self.logical.destroy_image_view(view, None) }
    }

    fn create_sampler(&self, info: &vk::SamplerCreateInfo<'_>) -> VkResult<vk::Sampler> {
        unsafe { self.logical.create_sampler(info, None) }
    }

    fn destroy_sampler(&self, sampler: vk::Sampler) {
        unsafe { self.logical.destroy_sampler(sampler, None) }
    }

    fn create_descriptor_set_layout(&self, info: &vk::DescriptorSetLayoutCreateInfo<'_>) -> VkResult<vk::DescriptorSetLayout> {
        unsafe { self.logical.create_descriptor_set_layout(info, None) }
    }

    fn destroy_descriptor_set_layout(&self, layout: vk::DescriptorSetLayout) {
        unsafe { self.logical.destroy_descriptor_set_layout(layout, None) }
    }

    fn create_descriptor_pool(&self, info: &vk::DescriptorPoolCreateInfo<'_>) -> VkResult<vk::DescriptorPool> {
        unsafe { self.logical.create_descriptor_pool(info, None) }
    }

    fn destroy_descriptor_pool(&self, pool: vk::DescriptorPool) {
        unsafe { self.logical.destroy_descriptor_pool(pool, None) }
    }

    fn allocate_descriptor_sets(&self, info: &vk::DescriptorSetAllocateInfo<'_>) -> VkResult<Vec<vk::DescriptorSet>> {
        unsafe { self.logical.allocate_descriptor_sets(info) }
    }

    fn update_descriptor_sets(&self, writes: &[vk::WriteDescriptorSet<'_>]) {
        unsafe { self.logical.update_descriptor_sets(writes, &[]) }
    }

    fn create_shader_module(&self, code: &[u32]) -> VkResult<vk::ShaderModule> {
        let info = vk::ShaderModuleCreateInfo::default().code(code);
        unsafe { self.logical.create_shader_module(&info, None) }
    }

    fn destroy_shader_module(&self, module: vk::ShaderModule) {
        unsafe { self.logical.destroy_shader_module(module, None) }
    }

    fn create_render_pass(&self, info: &vk::RenderPassCreateInfo<'_>) -> VkResult<vk::RenderPass> {
        unsafe { self.logical.create_render_pass(info, None) }
    }

    fn destroy_render_pass(&self, render_pass: vk::RenderPass) {
        unsafe { self.logical.destroy_render_pass(render_pass, None) }
    }

    fn create_pipeline_layout(&self, info: &vk::PipelineLayoutCreateInfo<'_>) -> VkResult<vk::PipelineLayout> {
        unsafe { self.logical.create_pipeline_layout(info, None) }
    }

    fn destroy_pipeline_layout(&self, layout: vk::PipelineLayout) {
        unsafe { self.logical.destroy_pipeline_layout(layout, None) }
    }

    fn create_graphics_pipeline(&self, info: &vk::GraphicsPipelineCreateInfo<'_>) -> VkResult<vk::Pipeline> {
        let pipelines = unsafe {
            self.logical
                .create_graphics_pipelines(vk::PipelineCache::null(), std::slice::from_ref(info), None)
                .map_err(|(_, result)| result)?
        };
        pipelines
            .first()
            .copied()
            .ok_or(vk::Result::ERROR_INITIALIZATION_FAILED)
    }

    fn destroy_pipeline(&self, pipeline: vk::Pipeline) {
        unsafe { self.logical.destroy_pipeline(pipeline, None) }
    }

    fn create_framebuffer(&self, info: &vk::FramebufferCreateInfo<'_>) -> VkResult<vk::Framebuffer> {
        unsafe { self.logical.create_framebuffer(info, None) }
    }

    fn destroy_framebuffer(&self, framebuffer: vk::Framebuffer) {
        unsafe { self.logical.destroy_framebuffer(framebuffer, None) }
    }

    fn create_command_pool(&self, info: &vk::CommandPoolCreateInfo<'_>) -> VkResult<vk::CommandPool> {
        unsafe { self.logical.create_command_pool(info, None) }
    }

    fn destroy_command_pool(&self, pool: vk::CommandPool) {
        unsafe { self.logical.destroy_command_pool(pool, None) }
    }

    fn allocate_command_buffers(&self, info: &vk::CommandBufferAllocateInfo<'_>) -> VkResult<Vec<vk::CommandBuffer>> {
        unsafe { self.logical.allocate_command_buffers(info) }
    }

    fn free_command_buffers(&self, pool: vk::CommandPool, command_buffers: &[vk::CommandBuffer]) {
        unsafe { self.logical.free_command_buffers(pool, command_buffers) }
    }

    fn begin_command_buffer(&self, cmd: vk::CommandBuffer, flags: vk::CommandBufferUsageFlags) -> VkResult<()> {
        let begin_info = vk::CommandBufferBeginInfo::default().flags(flags);
        unsafe { self.logical.begin_command_buffer(cmd, &begin_info) }
    }

    fn end_command_buffer(&self, cmd: vk::CommandBuffer) -> VkResult<()> {
        unsafe { self.logical.end_command_buffer(cmd) }
    }

    fn cmd_pipeline_barrier(
        &self,
        cmd: vk::CommandBuffer,
        src_stage: vk::PipelineStageFlags,
        dst_stage: vk::PipelineStageFlags,
        image_barriers: &[vk::ImageMemoryBarrier<'_>],
    ) {
        unsafe {
            self.logical.cmd_pipeline_barrier(
                cmd,
                src_stage,
                dst_stage,
                vk::DependencyFlags::empty(),
                &[],
                &[],
                image_barriers,
            )
        }
    }

    fn cmd_copy_buffer(&self, cmd: vk::CommandBuffer, src: vk::Buffer, dst: vk::Buffer, regions: &[vk::BufferCopy]) {
        unsafe { self.logical.cmd_copy_buffer(cmd, src, dst, regions) }
    }

    fn cmd_copy_buffer_to_image(
        &self,
        cmd: vk::CommandBuffer,
        src: vk::Buffer,
        dst: vk::Image,
        layout: vk::ImageLayout,
        regions: &[vk::BufferImageCopy],
    ) {
        unsafe { self.logical.cmd_copy_buffer_to_image(cmd, src, dst, layout, regions) }
    }

    fn cmd_begin_render_pass(&self, cmd: vk::CommandBuffer, info: &vk::RenderPassBeginInfo<'_>) {
        unsafe {
            self.logical
                .cmd_begin_render_pass(cmd, info, vk::SubpassContents::INLINE)
        }
    }

    fn cmd_end_render_pass(&self, cmd: vk::CommandBuffer) {
        unsafe { self.logical.cmd_end_render_pass(cmd) }
    }

    fn cmd_bind_pipeline(&self, cmd: vk::CommandBuffer, pipeline: vk::Pipeline) {
        unsafe {
            self.logical
                .cmd_bind_pipeline(cmd, vk::PipelineBindPoint::GRAPHICS, pipeline)
        }
    }

    fn cmd_bind_vertex_buffer(&self, cmd: vk::CommandBuffer, buffer: vk::Buffer, offset: vk::DeviceSize) {
        unsafe { self.logical.cmd_bind_vertex_buffers(cmd, 0, &[buffer], &[offset]) }
    }

    fn cmd_bind_index_buffer(&self, cmd: vk::CommandBuffer, buffer: vk::Buffer, offset: vk::DeviceSize, index_type: vk::IndexType) {
        unsafe { self.logical.cmd_bind_index_buffer(cmd, buffer, offset, index_type) }
    }

    fn cmd_push_constants(
        &self,
        cmd: vk::CommandBuffer,
        layout: vk::PipelineLayout,
        stages: vk::ShaderStageFlags,
        offset: u32,
        data: &[u8],
    ) {
        unsafe { self.logical.cmd_push_constants(cmd, layout, stages, offset, data) }
    }

    fn cmd_bind_descriptor_sets(
        &self,
        cmd: vk::CommandBuffer,
        layout: vk::PipelineLayout,
        sets: &[vk::DescriptorSet],
        dynamic_offsets: &[u32],
    ) {
        unsafe {
            self.logical.cmd_bind_descriptor_sets(
                cmd,
                vk::PipelineBindPoint::GRAPHICS,
                layout,
                0,
                sets,
                dynamic_offsets,
            )
        }
    }

    fn cmd_draw_indexed(&self, cmd: vk::CommandBuffer, index_count: u32, instance_count: u32, first_index: u32, vertex_offset: i32, first_instance: u32) {
        unsafe {
            self.logical.cmd_draw_indexed(
                cmd,
                index_count,
                instance_count,
                first_index,
                vertex_offset,
                first_instance,
            )
        }
    }

    fn create_fence(&self, signaled: bool) -> VkResult<vk::Fence> {
        let flags = if signaled {
            vk::FenceCreateFlags::SIGNALED
        } else {
            vk::FenceCreateFlags::empty()
        };
        unsafe {
            self.logical
                .create_fence(&vk::FenceCreateInfo::default().flags(flags), None)
        }
    }

    fn destroy_fence(&self, fence: vk::Fence) {
        unsafe { self.logical.destroy_fence(fence, None) }
    }

    fn wait_for_fence(&self, fence: vk::Fence) -> VkResult<()> {
        unsafe { self.logical.wait_for_fences(&[fence], true, u64::MAX) }
    }

    fn reset_fence(&self, fence: vk::Fence) -> VkResult<()> {
        unsafe { self.logical.reset_fences(&[fence]) }
    }

    fn create_semaphore(&self) -> VkResult<vk::Semaphore> {
        unsafe {
            self.logical
                .create_semaphore(&vk::SemaphoreCreateInfo::default(), None)
        }
    }

    fn destroy_semaphore(&self, semaphore: vk::Semaphore) {
        unsafe { self.logical.destroy_semaphore(semaphore, None) }
    }

    fn queue_submit(&self, queue: vk::Queue, submit: &SubmitDesc<'_>, fence: vk::Fence) -> VkResult<()> {
        let submit_info = vk::SubmitInfo::default()
            .wait_semaphores(submit.wait_semaphores)
            .wait_dst_stage_mask(submit.wait_stages)
            .command_buffers(submit.command_buffers)
            .signal_semaphores(submit.signal_semaphores);
        unsafe { self.logical.queue_submit(queue, &[submit_info], fence) }
    }

    fn create_swapchain(&self, info: &vk::SwapchainCreateInfoKHR<'_>) -> VkResult<vk::SwapchainKHR> {
        // Callers never see the surface handle
        let info = (*info).surface(self.surface);
        unsafe { self.swapchain_loader.create_swapchain(&info, None) }
    }

    fn destroy_swapchain(&self, swapchain: vk::SwapchainKHR) {
        unsafe { self.swapchain_loader.destroy_swapchain(swapchain, None) }
    }

    fn swapchain_images(&self, swapchain: vk::SwapchainKHR) -> VkResult<Vec<vk::Image>> {
        unsafe { self.swapchain_loader.get_swapchain_images(swapchain) }
    }

    fn acquire_next_image(&self, swapchain: vk::SwapchainKHR, signal: vk::Semaphore) -> VkResult<(u32, bool)> {
        unsafe {
            self.swapchain_loader
                .acquire_next_image(swapchain, u64::MAX, signal, vk::Fence::null())
        }
    }

    fn queue_present(&self, queue: vk::Queue, swapchain: vk::SwapchainKHR, image_index: u32, wait: vk::Semaphore) -> VkResult<bool> {
        let wait_semaphores = [wait];
        let swapchains = [swapchain];
        let image_indices = [image_index];
        let present_info = vk::PresentInfoKHR::default()
            .wait_semaphores(&wait_semaphores)
            .swapchains(&swapchains)
            .image_indices(&image_indices);
        unsafe { self.swapchain_loader.queue_present(queue, &present_info) }
    }
}
