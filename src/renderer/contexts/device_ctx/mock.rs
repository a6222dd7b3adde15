//! Mock driver for unit tests (no GPU required)
//!
//! Records every command written into a command buffer, keeps host-side copies
//! of device memory so staged copies can be checked byte for byte, simulates GPU
//! latency on fences with a virtual clock, and tracks every live object so tests
//! can assert that teardown released everything it created.

use crate::renderer::contexts::device_ctx::driver::{Driver, SubmitDesc};
use crate::renderer::contexts::device_ctx::queue::{Queue, Queues};
use ash::prelude::VkResult;
use ash::vk;
use ash::vk::Handle;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};

// ============================================================================
// Recorded commands and events
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Barrier {
        image: vk::Image,
        old_layout: vk::ImageLayout,
        new_layout: vk::ImageLayout,
        src_access: vk::AccessFlags,
        dst_access: vk::AccessFlags,
        src_stage: vk::PipelineStageFlags,
        dst_stage: vk::PipelineStageFlags,
    },
    CopyBuffer {
        src: vk::Buffer,
        dst: vk::Buffer,
        regions: Vec<CopyRegion>,
    },
    CopyBufferToImage {
        src: vk::Buffer,
        dst: vk::Image,
        layout: vk::ImageLayout,
    },
    BeginRenderPass {
        render_pass: vk::RenderPass,
        framebuffer: vk::Framebuffer,
        extent: vk::Extent2D,
    },
    EndRenderPass,
    BindPipeline(vk::Pipeline),
    BindVertexBuffer(vk::Buffer),
    BindIndexBuffer(vk::Buffer, vk::IndexType),
    PushConstants {
        stages: vk::ShaderStageFlags,
        offset: u32,
        data: Vec<u8>,
    },
    BindDescriptorSets {
        sets: Vec<vk::DescriptorSet>,
        dynamic_offsets: Vec<u32>,
    },
    DrawIndexed {
        index_count: u32,
        instance_count: u32,
    },
}

/// `vk::BufferCopy` without the FFI struct, so recorded copies compare by value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CopyRegion {
    pub src_offset: u64,
    pub dst_offset: u64,
    pub size: u64,
}

impl From<&vk::BufferCopy> for CopyRegion {
    fn from(region: &vk::BufferCopy) -> Self {
        Self {
            src_offset: region.src_offset,
            dst_offset: region.dst_offset,
            size: region.size,
        }
    }
}

/// Timestamped driver-level events, in call order.
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    Submit {
        at: u64,
        fence: vk::Fence,
        command_buffers: Vec<vk::CommandBuffer>,
    },
    FenceSignaled { at: u64, fence: vk::Fence },
    FenceReset { at: u64, fence: vk::Fence },
    Acquire { at: u64, image_index: u32 },
    Present { at: u64, image_index: u32 },
    SwapchainCreated { at: u64, extent: vk::Extent2D, image_count: u32 },
    SwapchainDestroyed { at: u64 },
    DeviceWaitIdle { at: u64 },
    QueueWaitIdle { at: u64 },
}

// ============================================================================
// Simulated state
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq)]
enum FenceState {
    Unsignaled,
    Pending { signal_at: u64 },
    Signaled,
}

struct Memory {
    type_index: u32,
    data: Vec<u8>,
}

struct Resource {
    size: u64,
    binding: Option<(u64, u64)>,
}

struct DescriptorPool {
    max_sets: u32,
    allocated: u32,
}

struct MockState {
    next_handle: u64,
    clock: u64,
    gpu_latency: u64,

    live: HashMap<u64, &'static str>,
    errors: Vec<String>,
    events: Vec<Event>,

    memory: HashMap<u64, Memory>,
    buffers: HashMap<u64, Resource>,
    images: HashMap<u64, Resource>,
    descriptor_pools: HashMap<u64, DescriptorPool>,
    descriptor_writes: usize,
    command_pools: HashMap<u64, Vec<u64>>,
    commands: HashMap<u64, Vec<Command>>,
    recording: HashSet<u64>,
    fences: HashMap<u64, FenceState>,
    swapchains: HashMap<u64, Vec<u64>>,
    next_image: u32,

    acquire_results: VecDeque<vk::Result>,
    present_results: VecDeque<vk::Result>,
    submit_failures: VecDeque<vk::Result>,

    memory_types: Vec<vk::MemoryPropertyFlags>,
    limits: vk::PhysicalDeviceLimits,
    depth_formats: Vec<vk::Format>,
    capabilities: vk::SurfaceCapabilitiesKHR,
    formats: Vec<vk::SurfaceFormatKHR>,
    present_modes: Vec<vk::PresentModeKHR>,
    window_extent: vk::Extent2D,
    resize_after_present: Option<vk::Extent2D>,
}

impl MockState {
    fn new() -> Self {
        let limits = vk::PhysicalDeviceLimits {
            min_uniform_buffer_offset_alignment: 256,
            ..Default::default()
        };
        let capabilities = vk::SurfaceCapabilitiesKHR {
            min_image_count: 2,
            max_image_count: 3,
            current_extent: vk::Extent2D { width: 800, height: 600 },
            min_image_extent: vk::Extent2D { width: 1, height: 1 },
            max_image_extent: vk::Extent2D { width: 4096, height: 4096 },
            max_image_array_layers: 1,
            supported_transforms: vk::SurfaceTransformFlagsKHR::IDENTITY,
            current_transform: vk::SurfaceTransformFlagsKHR::IDENTITY,
            supported_composite_alpha: vk::CompositeAlphaFlagsKHR::OPAQUE,
            supported_usage_flags: vk::ImageUsageFlags::COLOR_ATTACHMENT,
        };

        Self {
            next_handle: 0x100,
            clock: 0,
            gpu_latency: 10,

            live: HashMap::new(),
            errors: Vec::new(),
            events: Vec::new(),

            memory: HashMap::new(),
            buffers: HashMap::new(),
            images: HashMap::new(),
            descriptor_pools: HashMap::new(),
            descriptor_writes: 0,
            command_pools: HashMap::new(),
            commands: HashMap::new(),
            recording: HashSet::new(),
            fences: HashMap::new(),
            swapchains: HashMap::new(),
            next_image: 0,

            acquire_results: VecDeque::new(),
            present_results: VecDeque::new(),
            submit_failures: VecDeque::new(),

            memory_types: vec![
                vk::MemoryPropertyFlags::DEVICE_LOCAL,
                vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT,
                vk::MemoryPropertyFlags::DEVICE_LOCAL
                    | vk::MemoryPropertyFlags::HOST_VISIBLE
                    | vk::MemoryPropertyFlags::HOST_COHERENT,
            ],
            limits,
            depth_formats: vec![vk::Format::D32_SFLOAT],
            capabilities,
            formats: vec![vk::SurfaceFormatKHR {
                format: vk::Format::B8G8R8A8_UNORM,
                color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
            }],
            present_modes: vec![vk::PresentModeKHR::FIFO, vk::PresentModeKHR::MAILBOX],
            window_extent: vk::Extent2D { width: 800, height: 600 },
            resize_after_present: None,
        }
    }

    fn create(&mut self, kind: &'static str) -> u64 {
        let handle = self.next_handle;
        self.next_handle += 1;
        self.live.insert(handle, kind);
        handle
    }

    fn destroy(&mut self, handle: u64, kind: &'static str) -> bool {
        if handle == 0 {
            return false;
        }
        match self.live.remove(&handle) {
            Some(k) if k == kind => true,
            Some(k) => {
                self.errors.push(format!("destroyed {k} {handle:#x} as a {kind}"));
                true
            }
            None => {
                self.errors.push(format!("destroyed unknown {kind} {handle:#x}"));
                false
            }
        }
    }

    fn tick(&mut self) -> u64 {
        self.clock += 1;
        self.clock
    }

    fn record(&mut self, cmd: vk::CommandBuffer, command: Command) {
        let raw = cmd.as_raw();
        if !self.recording.contains(&raw) {
            self.errors.push(format!("{command:?} recorded outside begin/end on {raw:#x}"));
            return;
        }
        self.commands.entry(raw).or_default().push(command);
    }

    fn requirements(&self, size: u64) -> vk::MemoryRequirements {
        vk::MemoryRequirements {
            size,
            alignment: 16,
            memory_type_bits: (1u32 << self.memory_types.len()) - 1,
        }
    }

    fn bind(&mut self, resource: u64, memory: u64, offset: u64, is_image: bool) -> VkResult<()> {
        let table = if is_image { &mut self.images } else { &mut self.buffers };
        let Some(res) = table.get_mut(&resource) else {
            self.errors.push(format!("bind of unknown resource {resource:#x}"));
            return Err(vk::Result::ERROR_UNKNOWN);
        };
        let Some(mem) = self.memory.get(&memory) else {
            self.errors.push(format!("bind to unknown memory {memory:#x}"));
            return Err(vk::Result::ERROR_UNKNOWN);
        };
        if (mem.data.len() as u64) < offset + res.size {
            self.errors.push(format!("memory {memory:#x} too small for {resource:#x}"));
            return Err(vk::Result::ERROR_OUT_OF_DEVICE_MEMORY);
        }
        res.binding = Some((memory, offset));
        Ok(())
    }

    fn read_bound(&self, resource: Option<&Resource>, offset: u64, len: u64) -> Option<Vec<u8>> {
        let (memory, base) = resource?.binding?;
        let data = &self.memory.get(&memory)?.data;
        let start = (base + offset) as usize;
        data.get(start..start + len as usize).map(|s| s.to_vec())
    }

    fn write_bound(&mut self, binding: Option<(u64, u64)>, offset: u64, bytes: &[u8]) {
        let Some((memory, base)) = binding else {
            self.errors.push("copy into unbound resource".to_string());
            return;
        };
        let Some(mem) = self.memory.get_mut(&memory) else {
            return;
        };
        let start = (base + offset) as usize;
        match mem.data.get_mut(start..start + bytes.len()) {
            Some(dst) => dst.copy_from_slice(bytes),
            None => self.errors.push(format!("copy out of bounds of memory {memory:#x}")),
        }
    }

    /// Applies the transfer commands of a submitted command buffer.
    fn execute(&mut self, cmd: u64) {
        let commands = self.commands.get(&cmd).cloned().unwrap_or_default();
        for command in commands {
            match command {
                Command::CopyBuffer { src, dst, regions } => {
                    for region in regions {
                        let bytes = self.read_bound(
                            self.buffers.get(&src.as_raw()),
                            region.src_offset,
                            region.size,
                        );
                        let binding = self.buffers.get(&dst.as_raw()).and_then(|b| b.binding);
                        match bytes {
                            Some(bytes) => self.write_bound(binding, region.dst_offset, &bytes),
                            None => self.errors.push(format!("copy from unbound buffer {src:?}")),
                        }
                    }
                }
                Command::CopyBufferToImage { src, dst, .. } => {
                    let size = self.images.get(&dst.as_raw()).map_or(0, |i| i.size);
                    let bytes = self.read_bound(self.buffers.get(&src.as_raw()), 0, size);
                    let binding = self.images.get(&dst.as_raw()).and_then(|i| i.binding);
                    match bytes {
                        Some(bytes) => self.write_bound(binding, 0, &bytes),
                        None => self.errors.push(format!("copy from unbound buffer {src:?}")),
                    }
                }
                _ => {}
            }
        }
    }

    fn signal_all_pending(&mut self) {
        let mut pending = self
            .fences
            .iter()
            .filter_map(|(fence, state)| match state {
                FenceState::Pending { signal_at } => Some((*signal_at, *fence)),
                _ => None,
            })
            .collect::<Vec<_>>();
        pending.sort();
        for (signal_at, fence) in pending {
            self.clock = self.clock.max(signal_at);
            self.fences.insert(fence, FenceState::Signaled);
            self.events.push(Event::FenceSignaled {
                at: signal_at,
                fence: vk::Fence::from_raw(fence),
            });
        }
    }
}

// ============================================================================
// Mock driver
// ============================================================================

#[derive(Clone)]
pub struct MockDriver {
    state: Arc<Mutex<MockState>>,
}

impl MockDriver {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(MockState::new())),
        }
    }

    fn state(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap()
    }

    pub fn queues(&self) -> Queues {
        let queue = Queue::new(0, vk::Queue::from_raw(0x10));
        Queues {
            graphics: queue,
            present: queue,
        }
    }

    // Configuration

    pub fn set_gpu_latency(&self, ticks: u64) {
        self.state().gpu_latency = ticks;
    }

    pub fn set_memory_types(&self, types: &[vk::MemoryPropertyFlags]) {
        self.state().memory_types = types.to_vec();
    }

    pub fn set_capabilities(&self, capabilities: vk::SurfaceCapabilitiesKHR) {
        self.state().capabilities = capabilities;
    }

    pub fn set_surface_formats(&self, formats: &[vk::SurfaceFormatKHR]) {
        self.state().formats = formats.to_vec();
    }

    pub fn set_present_modes(&self, modes: &[vk::PresentModeKHR]) {
        self.state().present_modes = modes.to_vec();
    }

    pub fn set_depth_formats(&self, formats: &[vk::Format]) {
        self.state().depth_formats = formats.to_vec();
    }

    pub fn set_window_extent(&self, width: u32, height: u32) {
        self.state().window_extent = vk::Extent2D { width, height };
    }

    /// Surface resize as seen by both the window and the surface capabilities.
    pub fn resize(&self, width: u32, height: u32) {
        let mut state = self.state();
        state.window_extent = vk::Extent2D { width, height };
        state.capabilities.current_extent = vk::Extent2D { width, height };
    }

    /// Window resize that lands while the next present is being queued.
    pub fn resize_after_present(&self, width: u32, height: u32) {
        self.state().resize_after_present = Some(vk::Extent2D { width, height });
    }

    /// Fails the next queue submission with `result`, as a lost device would.
    pub fn fail_next_submit(&self, result: vk::Result) {
        self.state().submit_failures.push_back(result);
    }

    pub fn push_acquire_result(&self, result: vk::Result) {
        self.state().acquire_results.push_back(result);
    }

    pub fn push_present_result(&self, result: vk::Result) {
        self.state().present_results.push_back(result);
    }

    // Inspection

    pub fn live_objects(&self) -> Vec<(u64, &'static str)> {
        let mut live = self
            .state()
            .live
            .iter()
            .map(|(handle, kind)| (*handle, *kind))
            .collect::<Vec<_>>();
        live.sort();
        live
    }

    pub fn live_count(&self, kind: &str) -> usize {
        self.state().live.values().filter(|k| **k == kind).count()
    }

    pub fn errors(&self) -> Vec<String> {
        self.state().errors.clone()
    }

    pub fn events(&self) -> Vec<Event> {
        self.state().events.clone()
    }

    pub fn commands(&self, cmd: vk::CommandBuffer) -> Vec<Command> {
        self.state().commands.get(&cmd.as_raw()).cloned().unwrap_or_default()
    }

    /// Command buffers of every submission so far, in order.
    pub fn submissions(&self) -> Vec<Vec<vk::CommandBuffer>> {
        self.state()
            .events
            .iter()
            .filter_map(|e| match e {
                Event::Submit { command_buffers, .. } => Some(command_buffers.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn descriptor_writes(&self) -> usize {
        self.state().descriptor_writes
    }

    /// Contents of the memory bound to `buffer`.
    pub fn buffer_contents(&self, buffer: vk::Buffer) -> Option<Vec<u8>> {
        let state = self.state();
        let res = state.buffers.get(&buffer.as_raw())?;
        state.read_bound(Some(res), 0, res.size)
    }

    pub fn image_contents(&self, image: vk::Image) -> Option<Vec<u8>> {
        let state = self.state();
        let res = state.images.get(&image.as_raw())?;
        state.read_bound(Some(res), 0, res.size)
    }

    pub fn memory_type_of(&self, memory: vk::DeviceMemory) -> Option<u32> {
        self.state().memory.get(&memory.as_raw()).map(|m| m.type_index)
    }
}

impl Driver for MockDriver {
    fn memory_properties(&self) -> vk::PhysicalDeviceMemoryProperties {
        let state = self.state();
        let mut props = vk::PhysicalDeviceMemoryProperties {
            memory_type_count: state.memory_types.len() as u32,
            memory_heap_count: 1,
            ..Default::default()
        };
        for (i, flags) in state.memory_types.iter().enumerate() {
            props.memory_types[i] = vk::MemoryType {
                property_flags: *flags,
                heap_index: 0,
            };
        }
        props.memory_heaps[0] = vk::MemoryHeap {
            size: 1 << 30,
            flags: vk::MemoryHeapFlags::DEVICE_LOCAL,
        };
        props
    }

    fn limits(&self) -> vk::PhysicalDeviceLimits {
        self.state().limits
    }

    fn format_properties(&self, format: vk::Format) -> vk::FormatProperties {
        let features = if self.state().depth_formats.contains(&format) {
            vk::FormatFeatureFlags::DEPTH_STENCIL_ATTACHMENT
        } else {
            vk::FormatFeatureFlags::empty()
        };
        vk::FormatProperties {
            optimal_tiling_features: features,
            ..Default::default()
        }
    }

    fn surface_capabilities(&self) -> VkResult<vk::SurfaceCapabilitiesKHR> {
        Ok(self.state().capabilities)
    }

    fn surface_formats(&self) -> VkResult<Vec<vk::SurfaceFormatKHR>> {
        Ok(self.state().formats.clone())
    }

    fn surface_present_modes(&self) -> VkResult<Vec<vk::PresentModeKHR>> {
        Ok(self.state().present_modes.clone())
    }

    fn window_extent(&self) -> vk::Extent2D {
        self.state().window_extent
    }

    fn device_wait_idle(&self) -> VkResult<()> {
        let mut state = self.state();
        state.signal_all_pending();
        let at = state.tick();
        state.events.push(Event::DeviceWaitIdle { at });
        Ok(())
    }

    fn queue_wait_idle(&self, _queue: vk::Queue) -> VkResult<()> {
        let mut state = self.state();
        state.signal_all_pending();
        let at = state.tick();
        state.events.push(Event::QueueWaitIdle { at });
        Ok(())
    }

    fn allocate_memory(&self, info: &vk::MemoryAllocateInfo<'_>) -> VkResult<vk::DeviceMemory> {
        let mut state = self.state();
        if info.memory_type_index as usize >= state.memory_types.len() {
            state.errors.push(format!("invalid memory type {}", info.memory_type_index));
            return Err(vk::Result::ERROR_OUT_OF_DEVICE_MEMORY);
        }
        let handle = state.create("memory");
        state.memory.insert(
            handle,
            Memory {
                type_index: info.memory_type_index,
                data: vec![0; info.allocation_size as usize],
            },
        );
        Ok(vk::DeviceMemory::from_raw(handle))
    }

    fn free_memory(&self, memory: vk::DeviceMemory) {
        let mut state = self.state();
        if state.destroy(memory.as_raw(), "memory") {
            state.memory.remove(&memory.as_raw());
        }
    }

    fn write_memory(&self, memory: vk::DeviceMemory, offset: vk::DeviceSize, data: &[u8]) -> VkResult<()> {
        let mut guard = self.state();
        let state = &mut *guard;
        let host_visible = state
            .memory
            .get(&memory.as_raw())
            .and_then(|m| state.memory_types.get(m.type_index as usize))
            .is_some_and(|flags| flags.contains(vk::MemoryPropertyFlags::HOST_VISIBLE));
        if !host_visible {
            state.errors.push(format!("mapped non host-visible memory {memory:?}"));
            return Err(vk::Result::ERROR_MEMORY_MAP_FAILED);
        }
        let Some(mem) = state.memory.get_mut(&memory.as_raw()) else {
            return Err(vk::Result::ERROR_MEMORY_MAP_FAILED);
        };
        let start = offset as usize;
        match mem.data.get_mut(start..start + data.len()) {
            Some(dst) => {
                dst.copy_from_slice(data);
                Ok(())
            }
            None => {
                state.errors.push(format!("write past end of memory {memory:?}"));
                Err(vk::Result::ERROR_MEMORY_MAP_FAILED)
            }
        }
    }

    fn create_buffer(&self, info: &vk::BufferCreateInfo<'_>) -> VkResult<vk::Buffer> {
        let mut state = self.state();
        if info.size == 0 {
            state.errors.push("zero-sized buffer".to_string());
            return Err(vk::Result::ERROR_UNKNOWN);
        }
        let handle = state.create("buffer");
        state.buffers.insert(handle, Resource { size: info.size, binding: None });
        Ok(vk::Buffer::from_raw(handle))
    }

    fn destroy_buffer(&self, buffer: vk::Buffer) {
        let mut state = self.state();
        if state.destroy(buffer.as_raw(), "buffer") {
            state.buffers.remove(&buffer.as_raw());
        }
    }

    fn buffer_memory_requirements(&self, buffer: vk::Buffer) -> vk::MemoryRequirements {
        let state = self.state();
        let size = state.buffers.get(&buffer.as_raw()).map_or(0, |b| b.size);
        state.requirements(size)
    }

    fn bind_buffer_memory(&self, buffer: vk::Buffer, memory: vk::DeviceMemory, offset: vk::DeviceSize) -> VkResult<()> {
        self.state().bind(buffer.as_raw(), memory.as_raw(), offset, false)
    }

    fn create_image(&self, info: &vk::ImageCreateInfo<'_>) -> VkResult<vk::Image> {
        let mut state = self.state();
        let handle = state.create("image");
        let size = info.extent.width as u64 * info.extent.height as u64 * 4;
        state.images.insert(handle, Resource { size, binding: None });
        Ok(vk::Image::from_raw(handle))
    }

    fn destroy_image(&self, image: vk::Image) {
        let mut state = self.state();
        if state.destroy(image.as_raw(), "image") {
            state.images.remove(&image.as_raw());
        }
    }

    fn image_memory_requirements(&self, image: vk::Image) -> vk::MemoryRequirements {
        let state = self.state();
        let size = state.images.get(&image.as_raw()).map_or(0, |i| i.size);
        state.requirements(size)
    }

    fn bind_image_memory(&self, image: vk::Image, memory: vk::DeviceMemory, offset: vk::DeviceSize) -> VkResult<()> {
        self.state().bind(image.as_raw(), memory.as_raw(), offset, true)
    }

    fn create_image_view(&self, _info: &vk::ImageViewCreateInfo<'_>) -> VkResult<vk::ImageView> {
        Ok(vk::ImageView::from_raw(self.state().create("image view")))
    }

    fn destroy_image_view(&self, view: vk::ImageView) {
        self.state().destroy(view.as_raw(), "image view");
    }

    fn create_sampler(&self, _info: &vk::SamplerCreateInfo<'_>) -> VkResult<vk::Sampler> {
        Ok(vk::Sampler::from_raw(self.state().create("sampler")))
    }

    fn destroy_sampler(&self, sampler: vk::Sampler) {
        self.state().destroy(sampler.as_raw(), "sampler");
    }

    fn create_descriptor_set_layout(&self, _info: &vk::DescriptorSetLayoutCreateInfo<'_>) -> VkResult<vk::DescriptorSetLayout> {
        Ok(vk::DescriptorSetLayout::from_raw(self.state().create("descriptor set layout")))
    }

    fn destroy_descriptor_set_layout(&self, layout: vk::DescriptorSetLayout) {
        self.state().destroy(layout.as_raw(), "descriptor set layout");
    }

    fn create_descriptor_pool(&self, info: &vk::DescriptorPoolCreateInfo<'_>) -> VkResult<vk::DescriptorPool> {
        let mut state = self.state();
        let handle = state.create("descriptor pool");
        state.descriptor_pools.insert(
            handle,
            DescriptorPool {
                max_sets: info.max_sets,
                allocated: 0,
            },
        );
        Ok(vk::DescriptorPool::from_raw(handle))
    }

    fn destroy_descriptor_pool(&self, pool: vk::DescriptorPool) {
        let mut state = self.state();
        if state.destroy(pool.as_raw(), "descriptor pool") {
            state.descriptor_pools.remove(&pool.as_raw());
        }
    }

    fn allocate_descriptor_sets(&self, info: &vk::DescriptorSetAllocateInfo<'_>) -> VkResult<Vec<vk::DescriptorSet>> {
        let mut guard = self.state();
        let state = &mut *guard;
        let count = info.descriptor_set_count;
        let Some(pool) = state.descriptor_pools.get_mut(&info.descriptor_pool.as_raw()) else {
            state.errors.push("allocation from unknown descriptor pool".to_string());
            return Err(vk::Result::ERROR_UNKNOWN);
        };
        if pool.allocated + count > pool.max_sets {
            return Err(vk::Result::ERROR_OUT_OF_POOL_MEMORY);
        }
        pool.allocated += count;
        let sets = (0..count)
            .map(|_| {
                let handle = state.next_handle;
                state.next_handle += 1;
                vk::DescriptorSet::from_raw(handle)
            })
            .collect();
        Ok(sets)
    }

    fn update_descriptor_sets(&self, writes: &[vk::WriteDescriptorSet<'_>]) {
        self.state().descriptor_writes += writes.len();
    }

    fn create_shader_module(&self, code: &[u32]) -> VkResult<vk::ShaderModule> {
        let mut state = self.state();
        if code.is_empty() {
            state.errors.push("empty shader module".to_string());
            return Err(vk::Result::ERROR_INITIALIZATION_FAILED);
        }
        Ok(vk::ShaderModule::from_raw(state.create("shader module")))
    }

    fn destroy_shader_module(&self, module: vk::ShaderModule) {
        self.state().destroy(module.as_raw(), "shader module");
    }

    fn create_render_pass(&self, _info: &vk::RenderPassCreateInfo<'_>) -> VkResult<vk::RenderPass> {
        Ok(vk::RenderPass::from_raw(self.state().create("render pass")))
    }

    fn destroy_render_pass(&self, render_pass: vk::RenderPass) {
        self.state().destroy(render_pass.as_raw(), "render pass");
    }

    fn create_pipeline_layout(&self, _info: &vk::PipelineLayoutCreateInfo<'_>) -> VkResult<vk::PipelineLayout> {
        Ok(vk::PipelineLayout::from_raw(self.state().create("pipeline layout")))
    }

    fn destroy_pipeline_layout(&self, layout: vk::PipelineLayout) {
        self.state().destroy(layout.as_raw(), "pipeline layout");
    }

    fn create_graphics_pipeline(&self, _info: &vk::GraphicsPipelineCreateInfo<'_>) -> VkResult<vk::Pipeline> {
        Ok(vk::Pipeline::from_raw(self.state().create("pipeline")))
    }

    fn destroy_pipeline(&self, pipeline: vk::Pipeline) {
        self.state().destroy(pipeline.as_raw(), "pipeline");
    }

    fn create_framebuffer(&self, _info: &vk::FramebufferCreateInfo<'_>) -> VkResult<vk::Framebuffer> {
        Ok(vk::Framebuffer::from_raw(self.state().create("framebuffer")))
    }

    fn destroy_framebuffer(&self, framebuffer: vk::Framebuffer) {
        self.state().destroy(framebuffer.as_raw(), "framebuffer");
    }

    fn create_command_pool(&self, _info: &vk::CommandPoolCreateInfo<'_>) -> VkResult<vk::CommandPool> {
        let mut state = self.state();
        let handle = state.create("command pool");
        state.command_pools.insert(handle, Vec::new());
        Ok(vk::CommandPool::from_raw(handle))
    }

    fn destroy_command_pool(&self, pool: vk::CommandPool) {
        let mut state = self.state();
        if state.destroy(pool.as_raw(), "command pool") {
            for cmd in state.command_pools.remove(&pool.as_raw()).unwrap_or_default() {
                state.live.remove(&cmd);
            }
        }
    }

    fn allocate_command_buffers(&self, info: &vk::CommandBufferAllocateInfo<'_>) -> VkResult<Vec<vk::CommandBuffer>> {
        let mut state = self.state();
        let pool = info.command_pool.as_raw();
        if !state.command_pools.contains_key(&pool) {
            state.errors.push("allocation from unknown command pool".to_string());
            return Err(vk::Result::ERROR_UNKNOWN);
        }
        let buffers = (0..info.command_buffer_count)
            .map(|_| state.create("command buffer"))
            .collect::<Vec<_>>();
        if let Some(owned) = state.command_pools.get_mut(&pool) {
            owned.extend(&buffers);
        }
        Ok(buffers.into_iter().map(vk::CommandBuffer::from_raw).collect())
    }

    fn free_command_buffers(&self, pool: vk::CommandPool, command_buffers: &[vk::CommandBuffer]) {
        let mut state = self.state();
        for cmd in command_buffers {
            if state.destroy(cmd.as_raw(), "command buffer") {
                if let Some(owned) = state.command_pools.get_mut(&pool.as_raw()) {
                    owned.retain(|c| *c != cmd.as_raw());
                }
            }
        }
    }

    fn begin_command_buffer(&self, cmd: vk::CommandBuffer, _flags: vk::CommandBufferUsageFlags) -> VkResult<()> {
        let mut state = self.state();
        if !state.recording.insert(cmd.as_raw()) {
            state.errors.push(format!("begin on recording command buffer {cmd:?}"));
            return Err(vk::Result::ERROR_UNKNOWN);
        }
        state.commands.insert(cmd.as_raw(), Vec::new());
        Ok(())
    }

    fn end_command_buffer(&self, cmd: vk::CommandBuffer) -> VkResult<()> {
        let mut state = self.state();
        if !state.recording.remove(&cmd.as_raw()) {
            state.errors.push(format!("end on idle command buffer {cmd:?}"));
            return Err(vk::Result::ERROR_UNKNOWN);
        }
        Ok(())
    }

    fn cmd_pipeline_barrier(
        &self,
        cmd: vk::CommandBuffer,
        src_stage: vk::PipelineStageFlags,
        dst_stage: vk::PipelineStageFlags,
        image_barriers: &[vk::ImageMemoryBarrier<'_>],
    ) {
        let mut state = self.state();
        for barrier in image_barriers {
            state.record(
                cmd,
                Command::Barrier {
                    image: barrier.image,
                    old_layout: barrier.old_layout,
                    new_layout: barrier.new_layout,
                    src_access: barrier.src_access_mask,
                    dst_access: barrier.dst_access_mask,
                    src_stage,
                    dst_stage,
                },
            );
        }
    }

    fn cmd_copy_buffer(&self, cmd: vk::CommandBuffer, src: vk::Buffer, dst: vk::Buffer, regions: &[vk::BufferCopy]) {
        self.state().record(
            cmd,
            Command::CopyBuffer {
                src,
                dst,
                regions: regions.iter().map(CopyRegion::from).collect(),
            },
        );
    }

    fn cmd_copy_buffer_to_image(
        &self,
        cmd: vk::CommandBuffer,
        src: vk::Buffer,
        dst: vk::Image,
        layout: vk::ImageLayout,
        _regions: &[vk::BufferImageCopy],
    ) {
        self.state()
            .record(cmd, Command::CopyBufferToImage { src, dst, layout });
    }

    fn cmd_begin_render_pass(&self, cmd: vk::CommandBuffer, info: &vk::RenderPassBeginInfo<'_>) {
        self.state().record(
            cmd,
            Command::BeginRenderPass {
                render_pass: info.render_pass,
                framebuffer: info.framebuffer,
                extent: info.render_area.extent,
            },
        );
    }

    fn cmd_end_render_pass(&self, cmd: vk::CommandBuffer) {
        self.state().record(cmd, Command::EndRenderPass);
    }

    fn cmd_bind_pipeline(&self, cmd: vk::CommandBuffer, pipeline: vk::Pipeline) {
        self.state().record(cmd, Command::BindPipeline(pipeline));
    }

    fn cmd_bind_vertex_buffer(&self, cmd: vk::CommandBuffer, buffer: vk::Buffer, _offset: vk::DeviceSize) {
        self.state().record(cmd, Command::BindVertexBuffer(buffer));
    }

    fn cmd_bind_index_buffer(&self, cmd: vk::CommandBuffer, buffer: vk::Buffer, _offset: vk::DeviceSize, index_type: vk::IndexType) {
        self.state()
            .record(cmd, Command::BindIndexBuffer(buffer, index_type));
    }

    fn cmd_push_constants(
        &self,
        cmd: vk::CommandBuffer,
        _layout: vk::PipelineLayout,
        stages: vk::ShaderStageFlags,
        offset: u32,
        data: &[u8],
    ) {
        self.state().record(
            cmd,
            Command::PushConstants {
                stages,
                offset,
                data: data.to_vec(),
            },
        );
    }

    fn cmd_bind_descriptor_sets(
        &self,
        cmd: vk::CommandBuffer,
        _layout: vk::PipelineLayout,
        sets: &[vk::DescriptorSet],
        dynamic_offsets: &[u32],
    ) {
        self.state().record(
            cmd,
            Command::BindDescriptorSets {
                sets: sets.to_vec(),
                dynamic_offsets: dynamic_offsets.to_vec(),
            },
        );
    }

    fn cmd_draw_indexed(&self, cmd: vk::CommandBuffer, index_count: u32, instance_count: u32, _first_index: u32, _vertex_offset: i32, _first_instance: u32) {
        self.state().record(
            cmd,
            Command::DrawIndexed {
                index_count,
                instance_count,
            },
        );
    }

    fn create_fence(&self, signaled: bool) -> VkResult<vk::Fence> {
        let mut state = self.state();
        let handle = state.create("fence");
        let fence_state = if signaled {
            FenceState::Signaled
        } else {
            FenceState::Unsignaled
        };
        state.fences.insert(handle, fence_state);
        Ok(vk::Fence::from_raw(handle))
    }

    fn destroy_fence(&self, fence: vk::Fence) {
        let mut state = self.state();
        let in_flight = matches!(
            state.fences.get(&fence.as_raw()),
            Some(FenceState::Pending { .. })
        );
        if in_flight {
            state.errors.push(format!("destroyed in-flight fence {fence:?}"));
        }
        if state.destroy(fence.as_raw(), "fence") {
            state.fences.remove(&fence.as_raw());
        }
    }

    fn wait_for_fence(&self, fence: vk::Fence) -> VkResult<()> {
        let mut state = self.state();
        match state.fences.get(&fence.as_raw()).copied() {
            Some(FenceState::Signaled) => Ok(()),
            Some(FenceState::Pending { signal_at }) => {
                state.clock = state.clock.max(signal_at);
                state.fences.insert(fence.as_raw(), FenceState::Signaled);
                state.events.push(Event::FenceSignaled { at: signal_at, fence });
                Ok(())
            }
            Some(FenceState::Unsignaled) => {
                state.errors.push(format!("wait on fence {fence:?} with no pending work"));
                Err(vk::Result::TIMEOUT)
            }
            None => {
                state.errors.push(format!("wait on unknown fence {fence:?}"));
                Err(vk::Result::ERROR_UNKNOWN)
            }
        }
    }

    fn reset_fence(&self, fence: vk::Fence) -> VkResult<()> {
        let mut state = self.state();
        let clock = state.clock;
        match state.fences.get(&fence.as_raw()).copied() {
            Some(FenceState::Pending { signal_at }) if signal_at > clock => {
                state.errors.push(format!("reset of in-flight fence {fence:?}"));
                Err(vk::Result::ERROR_VALIDATION_FAILED_EXT)
            }
            Some(_) => {
                state.fences.insert(fence.as_raw(), FenceState::Unsignaled);
                let at = state.tick();
                state.events.push(Event::FenceReset { at, fence });
                Ok(())
            }
            None => {
                state.errors.push(format!("reset of unknown fence {fence:?}"));
                Err(vk::Result::ERROR_UNKNOWN)
            }
        }
    }

    fn create_semaphore(&self) -> VkResult<vk::Semaphore> {
        Ok(vk::Semaphore::from_raw(self.state().create("semaphore")))
    }

    fn destroy_semaphore(&self, semaphore: vk::Semaphore) {
        self.state().destroy(semaphore.as_raw(), "semaphore");
    }

    fn queue_submit(&self, _queue: vk::Queue, submit: &SubmitDesc<'_>, fence: vk::Fence) -> VkResult<()> {
        let mut state = self.state();
        if let Some(result) = state.submit_failures.pop_front() {
            return Err(result);
        }
        if submit.wait_semaphores.len() != submit.wait_stages.len() {
            state.errors.push("wait semaphores and stages differ in length".to_string());
            return Err(vk::Result::ERROR_VALIDATION_FAILED_EXT);
        }
        for cmd in submit.command_buffers {
            if state.recording.contains(&cmd.as_raw()) {
                state.errors.push(format!("submitted command buffer {cmd:?} still recording"));
                return Err(vk::Result::ERROR_VALIDATION_FAILED_EXT);
            }
        }
        if fence != vk::Fence::null() {
            match state.fences.get(&fence.as_raw()).copied() {
                Some(FenceState::Unsignaled) => {}
                other => {
                    state.errors.push(format!("submit with fence {fence:?} in state {other:?}"));
                    return Err(vk::Result::ERROR_VALIDATION_FAILED_EXT);
                }
            }
        }

        for cmd in submit.command_buffers {
            state.execute(cmd.as_raw());
        }

        let at = state.tick();
        if fence != vk::Fence::null() {
            let signal_at = at + state.gpu_latency;
            state.fences.insert(fence.as_raw(), FenceState::Pending { signal_at });
        }
        state.events.push(Event::Submit {
            at,
            fence,
            command_buffers: submit.command_buffers.to_vec(),
        });
        Ok(())
    }

    fn create_swapchain(&self, info: &vk::SwapchainCreateInfoKHR<'_>) -> VkResult<vk::SwapchainKHR> {
        let mut state = self.state();
        let handle = state.create("swapchain");
        let images = (0..info.min_image_count)
            .map(|_| {
                let image = state.next_handle;
                state.next_handle += 1;
                image
            })
            .collect::<Vec<_>>();
        state.swapchains.insert(handle, images);
        state.next_image = 0;
        let at = state.tick();
        state.events.push(Event::SwapchainCreated {
            at,
            extent: info.image_extent,
            image_count: info.min_image_count,
        });
        Ok(vk::SwapchainKHR::from_raw(handle))
    }

    fn destroy_swapchain(&self, swapchain: vk::SwapchainKHR) {
        let mut state = self.state();
        if state.destroy(swapchain.as_raw(), "swapchain") {
            state.swapchains.remove(&swapchain.as_raw());
            let at = state.tick();
            state.events.push(Event::SwapchainDestroyed { at });
        }
    }

    fn swapchain_images(&self, swapchain: vk::SwapchainKHR) -> VkResult<Vec<vk::Image>> {
        self.state()
            .swapchains
            .get(&swapchain.as_raw())
            .map(|images| images.iter().map(|i| vk::Image::from_raw(*i)).collect())
            .ok_or(vk::Result::ERROR_SURFACE_LOST_KHR)
    }

    fn acquire_next_image(&self, swapchain: vk::SwapchainKHR, _signal: vk::Semaphore) -> VkResult<(u32, bool)> {
        let mut state = self.state();
        let result = state.acquire_results.pop_front().unwrap_or(vk::Result::SUCCESS);
        if result == vk::Result::ERROR_OUT_OF_DATE_KHR {
            return Err(result);
        }
        let count = state.swapchains.get(&swapchain.as_raw()).map_or(0, |i| i.len()) as u32;
        if count == 0 {
            return Err(vk::Result::ERROR_SURFACE_LOST_KHR);
        }
        let image_index = state.next_image % count;
        state.next_image += 1;
        let at = state.tick();
        state.events.push(Event::Acquire { at, image_index });
        Ok((image_index, result == vk::Result::SUBOPTIMAL_KHR))
    }

    fn queue_present(&self, _queue: vk::Queue, _swapchain: vk::SwapchainKHR, image_index: u32, _wait: vk::Semaphore) -> VkResult<bool> {
        let mut state = self.state();
        let result = state.present_results.pop_front().unwrap_or(vk::Result::SUCCESS);
        let at = state.tick();
        state.events.push(Event::Present { at, image_index });
        if let Some(extent) = state.resize_after_present.take() {
            state.window_extent = extent;
            state.capabilities.current_extent = extent;
        }
        match result {
            vk::Result::SUCCESS => Ok(false),
            vk::Result::SUBOPTIMAL_KHR => Ok(true),
            err => Err(err),
        }
    }
}
