//! Vulkan abstraction layer (Render Hardware Interface).
//!
//! Safe wrappers over `ash` for everything the presentation loop touches:
//! - Instance, physical device selection and logical device creation
//! - Swap chain negotiation, rebuild, acquire and present
//! - Command pools and buffers
//! - Render pass, framebuffers and graphics pipelines
//! - Buffers, textures, samplers and descriptor sets, uploaded through staging
//! - Synchronization primitives

mod error;
mod memory;

pub mod buffer;
pub mod command;
pub mod descriptor;
pub mod device;
pub mod framebuffer;
pub mod instance;
pub mod physical_device;
pub mod pipeline;
pub mod render_pass;
pub mod sampler;
pub mod shader;
pub mod swapchain;
pub mod sync;
pub mod texture;
pub mod upload;
pub mod vertex;

pub use error::{RhiError, RhiResult};

// Re-export ash types that users might need
pub use ash::vk;
