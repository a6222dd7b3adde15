//! Responsibilities:
//! - Pick memory types and back buffers and images with device memory
//! - Stage host data into device-local resources
//! - Manage descriptor layouts, uniform buffers, and texture sampler sets
pub mod descriptor_ctx;
pub mod descriptor_set_layout_builder;
pub mod memory;
pub mod transfer_ctx;
