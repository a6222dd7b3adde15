use ash::vk;
use std::path::PathBuf;
use thiserror::Error;

/// Failures while bringing up the instance, surface, or logical device.
#[derive(Debug, Error)]
pub enum DeviceError {
    #[error("failed to load the Vulkan library: {0}")]
    Loading(#[from] ash::LoadingError),

    #[error("window handle unavailable: {0}")]
    WindowHandle(#[from] raw_window_handle::HandleError),

    #[error("no suitable physical device found")]
    NoSuitableDevice,

    #[error("frame slot {0} reset while its work is still in flight")]
    FrameInFlight(usize),

    #[error("{call} failed: {result}")]
    Vulkan {
        call: &'static str,
        result: vk::Result,
    },
}

impl DeviceError {
    pub(crate) fn vk(call: &'static str) -> impl FnOnce(vk::Result) -> Self {
        move |result| Self::Vulkan { call, result }
    }
}

#[derive(Debug, Error)]
pub enum SwapchainError {
    #[error("surface reports no formats")]
    NoSurfaceFormats,

    #[error("surface reports no present modes")]
    NoPresentModes,

    #[error("no supported depth attachment format")]
    NoDepthFormat,

    /// The surface changed and the swapchain must be rebuilt before use.
    #[error("swapchain is out of date")]
    OutOfDate,

    #[error(transparent)]
    Resource(#[from] ResourceError),

    #[error("{call} failed: {result}")]
    Vulkan {
        call: &'static str,
        result: vk::Result,
    },
}

impl SwapchainError {
    pub(crate) fn vk(call: &'static str) -> impl FnOnce(vk::Result) -> Self {
        move |result| match result {
            vk::Result::ERROR_OUT_OF_DATE_KHR => Self::OutOfDate,
            result => Self::Vulkan { call, result },
        }
    }
}

#[derive(Debug, Error)]
pub enum ResourceError {
    #[error("no memory type in mask {allowed:#b} has properties {required:?}")]
    NoSuitableMemoryType {
        allowed: u32,
        required: vk::MemoryPropertyFlags,
    },

    #[error("failed to create {what}: {result}")]
    CreationFailed {
        what: &'static str,
        result: vk::Result,
    },

    #[error("unsupported layout transition {old:?} -> {new:?}")]
    UnsupportedLayoutTransition {
        old: vk::ImageLayout,
        new: vk::ImageLayout,
    },

    #[error("descriptor pool exhausted")]
    DescriptorPoolExhausted,

    #[error("object limit of {0} reached")]
    ObjectLimitReached(usize),

    #[error("texture {0} does not exist")]
    UnknownTexture(usize),

    #[error("cannot upload zero bytes")]
    EmptyData,

    #[error("expected {expected} bytes of RGBA8 pixels, got {actual}")]
    PixelSizeMismatch { expected: usize, actual: usize },

    #[error("write of {len} bytes at offset {offset} overruns buffer of {size} bytes")]
    WriteOutOfBounds {
        offset: u64,
        len: u64,
        size: u64,
    },

    #[error("{call} failed: {result}")]
    Vulkan {
        call: &'static str,
        result: vk::Result,
    },
}

impl ResourceError {
    pub(crate) fn vk(call: &'static str) -> impl FnOnce(vk::Result) -> Self {
        move |result| Self::Vulkan { call, result }
    }

    pub(crate) fn creation(what: &'static str) -> impl FnOnce(vk::Result) -> Self {
        move |result| Self::CreationFailed { what, result }
    }
}

/// Failures in the file loaders feeding the renderer.
#[derive(Debug, Error)]
pub enum AssetError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to decode image {path}: {source}")]
    Image {
        path: PathBuf,
        source: image::ImageError,
    },

    #[error("failed to load model {path}: {source}")]
    Model {
        path: PathBuf,
        source: tobj::LoadError,
    },

    #[error("{path} is not a SPIR-V binary")]
    InvalidSpirv { path: PathBuf },
}
