pub mod device;
pub mod driver;
pub mod instance;
pub mod queue;
pub mod target;

#[cfg(test)]
pub(crate) mod mock;

use crate::renderer::contexts::device_ctx::device::AshDriver;
use crate::renderer::contexts::device_ctx::driver::Driver;
use crate::renderer::contexts::device_ctx::queue::Queues;
use crate::renderer::error::DeviceError;
use ash::vk;
use std::sync::Arc;
use winit::window::Window;

/// Responsibilities:
/// - Own the driver (instance, surface, physical and logical device)
/// - Expose the graphics and presentation queues
/// - Cache memory properties and limits of the physical device
///
/// This is the only owner of the logical device. Everything else keeps plain
/// handles and borrows the context when it needs to create or destroy them.
pub struct DeviceContext {
    pub driver: Box<dyn Driver>,
    pub queues: Queues,
    pub memory_properties: vk::PhysicalDeviceMemoryProperties,
    pub limits: vk::PhysicalDeviceLimits,
}

impl DeviceContext {
    pub fn new(window: Arc<Window>, validation: bool) -> Result<Self, DeviceError> {
        let (driver, queues) = AshDriver::new(window, validation)?;
        Ok(Self::from_driver(Box::new(driver), queues))
    }

    pub fn from_driver(driver: Box<dyn Driver>, queues: Queues) -> Self {
        let memory_properties = driver.memory_properties();
        let limits = driver.limits();
        Self {
            driver,
            queues,
            memory_properties,
            limits,
        }
    }

    pub fn wait_idle(&self) -> Result<(), DeviceError> {
        self.driver
            .device_wait_idle()
            .map_err(DeviceError::vk("vkDeviceWaitIdle"))
    }
}
