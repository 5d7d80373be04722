//! Core utilities shared across the presentation workspace.
//!
//! This crate provides foundational types used by every other crate:
//! - Error types and result aliases
//! - Logging initialization
//! - TOML configuration
//! - Frame clock

mod clock;
mod config;
mod error;
mod logging;

pub use clock::{FrameClock, FrameRate};
pub use config::{
    CONFIG_ENV_VAR, Config, DEFAULT_CONFIG_FILE, DrawVariant, LoggingConfig, MAX_VIRTUAL_FRAMES,
    PresentModePreference, RendererConfig, WindowConfig,
};
pub use error::{Error, Result};
pub use logging::init_logging;
