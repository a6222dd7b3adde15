pub mod frame;

use crate::renderer::contexts::device_ctx::DeviceContext;
use crate::renderer::contexts::frame_ctx::frame::Frame;
use crate::renderer::error::DeviceError;
use ash::vk;

/// Responsibilities:
/// - Own one synchronization slot per frame in flight
/// - Rotate through the slots so the CPU never runs more than K frames ahead
/// - Remember which slot last rendered to each swapchain image
#[derive(Default)]
pub struct FrameContext {
    frames: Vec<Frame>,
    current: usize,
    // Fence of the slot whose submission last targeted each swapchain image
    image_fences: Vec<vk::Fence>,
}

impl FrameContext {
    pub fn new(dev: &DeviceContext, frames_in_flight: usize) -> Result<Self, DeviceError> {
        let mut frames = Vec::with_capacity(frames_in_flight);
        for index in 0..frames_in_flight {
            match Frame::new(dev, index) {
                Ok(frame) => frames.push(frame),
                Err(e) => {
                    for frame in frames {
                        frame.destroy(dev);
                    }
                    return Err(e);
                }
            }
        }

        Ok(Self {
            frames,
            current: 0,
            image_fences: Vec::new(),
        })
    }

    /// Forget previous image owners, for a swapchain with `image_count` images.
    pub fn track_images(&mut self, image_count: usize) {
        self.image_fences = vec![vk::Fence::null(); image_count];
    }

    /// Marks `image_index` as rendered by the current slot, first waiting for
    /// another slot that may still be rendering to it.
    pub fn claim_image(&mut self, dev: &DeviceContext, image_index: usize) -> Result<(), DeviceError> {
        let fence = self.frames[self.current].in_flight;
        let Some(owner) = self.image_fences.get_mut(image_index) else {
            return Ok(());
        };
        let previous = std::mem::replace(owner, fence);
        if previous != vk::Fence::null() && previous != fence {
            dev.driver
                .wait_for_fence(previous)
                .map_err(DeviceError::vk("vkWaitForFences"))?;
        }
        Ok(())
    }

    pub fn current(&mut self) -> &mut Frame {
        &mut self.frames[self.current]
    }

    pub fn current_index(&self) -> usize {
        self.current
    }

    pub fn frames_in_flight(&self) -> usize {
        self.frames.len()
    }

    pub fn advance(&mut self) {
        self.current = (self.current + 1) % self.frames.len().max(1);
    }

    pub fn destroy(self, dev: &DeviceContext) {
        for frame in self.frames {
            frame.destroy(dev);
        }
    }
}
