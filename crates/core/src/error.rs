//! Error types shared by every layer above the RHI.

use std::path::PathBuf;

use thiserror::Error;

/// Main error type for the presentation workspace.
#[derive(Error, Debug)]
pub enum Error {
    /// Vulkan-related errors raised outside the RHI (surface creation, extension queries)
    #[error("Vulkan error: {0}")]
    Vulkan(String),

    /// Window creation or management errors
    #[error("Window error: {0}")]
    Window(String),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration file could not be parsed
    #[error("Failed to parse config {}: {}", .path.display(), .message)]
    ConfigParse { path: PathBuf, message: String },

    /// Configuration values are out of range
    #[error("Config error: {0}")]
    Config(String),
}

/// Result type alias using the workspace's Error type.
pub type Result<T> = std::result::Result<T, Error>;
