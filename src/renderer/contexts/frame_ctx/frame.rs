use crate::renderer::contexts::device_ctx::DeviceContext;
use crate::renderer::error::DeviceError;
use ash::vk;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameState {
    /// No work outstanding, the fence may be reset.
    Idle,
    Submitted,
    /// The GPU finished the last submission.
    Signaled,
}

pub struct Frame {
    pub index: usize,

    // Signals when the swapchain image is ready to be rendered to.
    pub image_available: vk::Semaphore,

    // Signals when rendering is done and the image can be presented.
    pub render_finished: vk::Semaphore,

    // Signals when all rendering commands have finished execution.
    pub in_flight: vk::Fence,

    state: FrameState,
}

impl Frame {
    pub fn new(dev: &DeviceContext, index: usize) -> Result<Self, DeviceError> {
        let driver = dev.driver.as_ref();
        let image_available = driver
            .create_semaphore()
            .map_err(DeviceError::vk("vkCreateSemaphore"))?;
        let render_finished = match driver.create_semaphore() {
            Ok(semaphore) => semaphore,
            Err(result) => {
                driver.destroy_semaphore(image_available);
                return Err(DeviceError::vk("vkCreateSemaphore")(result));
            }
        };
        // Created signaled so the first wait on this slot returns immediately
        let in_flight = match driver.create_fence(true) {
            Ok(fence) => fence,
            Err(result) => {
                driver.destroy_semaphore(image_available);
                driver.destroy_semaphore(render_finished);
                return Err(DeviceError::vk("vkCreateFence")(result));
            }
        };

        Ok(Self {
            index,
            image_available,
            render_finished,
            in_flight,
            state: FrameState::Idle,
        })
    }

    pub fn state(&self) -> FrameState {
        self.state
    }

    /// Blocks until the previous submission from this slot has finished.
    pub fn wait(&mut self, dev: &DeviceContext) -> Result<(), DeviceError> {
        dev.driver
            .wait_for_fence(self.in_flight)
            .map_err(DeviceError::vk("vkWaitForFences"))?;
        if self.state == FrameState::Submitted {
            self.state = FrameState::Signaled;
        }
        Ok(())
    }

    /// Must follow `wait`, never a bare submission.
    pub fn reset(&mut self, dev: &DeviceContext) -> Result<(), DeviceError> {
        if self.state == FrameState::Submitted {
            return Err(DeviceError::FrameInFlight(self.index));
        }
        dev.driver
            .reset_fence(self.in_flight)
            .map_err(DeviceError::vk("vkResetFences"))?;
        self.state = FrameState::Idle;
        Ok(())
    }

    pub fn mark_submitted(&mut self) {
        self.state = FrameState::Submitted;
    }

    pub fn destroy(self, dev: &DeviceContext) {
        dev.driver.destroy_fence(self.in_flight);
        dev.driver.destroy_semaphore(self.render_finished);
        dev.driver.destroy_semaphore(self.image_available);
    }
}
