//! RHI-specific error types.

use ash::vk;
use thiserror::Error;

/// RHI-specific error type.
#[derive(Error, Debug)]
pub enum RhiError {
    /// Vulkan API error
    #[error("Vulkan error: {0}")]
    VulkanError(#[from] vk::Result),

    /// Failed to load Vulkan library
    #[error("Failed to load Vulkan: {0}")]
    LoadingError(#[from] ash::LoadingError),

    /// GPU allocator error
    #[error("Allocator error: {0}")]
    AllocatorError(#[from] gpu_allocator::AllocationError),

    /// No suitable GPU found
    #[error("No suitable GPU found")]
    NoSuitableGpu,

    /// Neither mailbox nor FIFO is offered by the surface
    #[error("Surface supports neither MAILBOX nor FIFO present mode (offered: {offered:?})")]
    UnsupportedPresentMode { offered: Vec<vk::PresentModeKHR> },

    /// Swap chain images cannot be used as transfer destinations
    #[error("Surface images do not support TRANSFER_DST usage (supported: {supported})")]
    UnsupportedImageUsage { supported: String },

    /// A fence wait or image acquisition did not complete in time
    #[error("Timed out waiting for {0}")]
    Timeout(&'static str),

    /// Shader module error
    #[error("Shader error: {0}")]
    ShaderError(String),

    /// Surface creation error
    #[error("Surface error: {0}")]
    SurfaceError(String),

    /// Invalid handle error
    #[error("Invalid handle: {0}")]
    InvalidHandle(String),

    /// Pipeline creation error
    #[error("Pipeline error: {0}")]
    PipelineError(String),
}

impl RhiError {
    /// Whether the error reports a swap chain that no longer matches its surface.
    pub fn is_out_of_date(&self) -> bool {
        matches!(self, Self::VulkanError(vk::Result::ERROR_OUT_OF_DATE_KHR))
    }
}

/// Result type alias for RHI operations.
pub type RhiResult<T> = std::result::Result<T, RhiError>;
