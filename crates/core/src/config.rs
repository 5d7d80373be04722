//! TOML configuration for the presentation loop.
//!
//! The file is looked up at the path named by `VKPRESENT_CONFIG`, falling back
//! to `vkpresent.toml` in the working directory. A missing file is not an
//! error: every section has defaults.
//!
//! ```toml
//! [window]
//! width = 1280
//! height = 720
//!
//! [renderer]
//! virtual_frames = 2
//! present_mode = "fifo"
//! draw = "triangle"
//! ```

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::error::{Error, Result};

/// Environment variable naming an explicit config file.
pub const CONFIG_ENV_VAR: &str = "VKPRESENT_CONFIG";

/// Config file used when `VKPRESENT_CONFIG` is unset.
pub const DEFAULT_CONFIG_FILE: &str = "vkpresent.toml";

/// Upper bound on the number of virtual frames.
pub const MAX_VIRTUAL_FRAMES: usize = 8;

/// Top-level configuration.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub window: WindowConfig,
    pub renderer: RendererConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct WindowConfig {
    pub width: u32,
    pub height: u32,
    pub title: String,
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            width: 1080,
            height: 720,
            title: "vkpresent".to_owned(),
        }
    }
}

/// Present mode the swap chain should try first. FIFO is always the fallback.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PresentModePreference {
    Mailbox,
    Fifo,
}

/// What gets recorded inside the render pass after the clear.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DrawVariant {
    /// Clear only
    Clear,
    /// Three vertices generated in the vertex shader
    Triangle,
    /// Quad read from a vertex buffer with position and color attributes
    VertexAttributes,
    /// Quad sampling a generated checkerboard through a descriptor set
    TexturedQuad,
}

impl DrawVariant {
    /// Whether this variant builds a graphics pipeline from SPIR-V files.
    pub fn needs_shaders(self) -> bool {
        !matches!(self, Self::Clear)
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RendererConfig {
    /// Number of virtual frames (CPU frames allowed in flight)
    pub virtual_frames: usize,
    pub present_mode: PresentModePreference,
    /// RGBA clear color
    pub clear_color: [f32; 4],
    pub draw: DrawVariant,
    pub vertex_shader: PathBuf,
    pub fragment_shader: PathBuf,
    /// Enable `VK_LAYER_KHRONOS_validation` when available
    pub validation: bool,
    /// Bound on the per-frame fence wait, in milliseconds
    pub frame_timeout_ms: u64,
    /// Bound on image acquisition, in milliseconds. Unset waits without bound.
    pub acquire_timeout_ms: Option<u64>,
}

impl RendererConfig {
    /// Frame timeout in nanoseconds, the unit Vulkan waits take.
    pub fn frame_timeout_ns(&self) -> u64 {
        self.frame_timeout_ms.saturating_mul(1_000_000)
    }

    /// Acquire timeout in nanoseconds; `u64::MAX` when unbounded.
    pub fn acquire_timeout_ns(&self) -> u64 {
        self.acquire_timeout_ms
            .map_or(u64::MAX, |ms| ms.saturating_mul(1_000_000))
    }
}

impl Default for RendererConfig {
    fn default() -> Self {
        Self {
            virtual_frames: 3,
            present_mode: PresentModePreference::Mailbox,
            clear_color: [1.0, 0.8, 0.4, 0.0],
            draw: DrawVariant::Clear,
            vertex_shader: PathBuf::from("shaders/shader.vert.spv"),
            fragment_shader: PathBuf::from("shaders/shader.frag.spv"),
            validation: cfg!(debug_assertions),
            frame_timeout_ms: 2_000,
            acquire_timeout_ms: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LoggingConfig {
    /// `EnvFilter` directive used when `RUST_LOG` is unset
    pub filter: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: "info,vkpresent=debug".to_owned(),
        }
    }
}

impl Config {
    /// Load the config from `VKPRESENT_CONFIG` or `vkpresent.toml`.
    pub fn load() -> Result<Self> {
        let path = std::env::var_os(CONFIG_ENV_VAR)
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILE));
        Self::load_from(&path)
    }

    /// Load and validate the config at `path`. A missing file yields defaults.
    pub fn load_from(path: &Path) -> Result<Self> {
        let config = match fs::read_to_string(path) {
            Ok(content) => toml::from_str::<Self>(&content).map_err(|e| Error::ConfigParse {
                path: path.to_path_buf(),
                message: e.to_string(),
            })?,
            Err(e) if e.kind() == ErrorKind::NotFound => Self::default(),
            Err(e) => return Err(e.into()),
        };

        config.validate()?;
        Ok(config)
    }

    /// Parse a config from a TOML string and validate it.
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config = toml::from_str::<Self>(content).map_err(|e| Error::ConfigParse {
            path: PathBuf::from("<inline>"),
            message: e.to_string(),
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values the renderer cannot work with.
    pub fn validate(&self) -> Result<()> {
        if self.window.width == 0 || self.window.height == 0 {
            return Err(Error::Config(format!(
                "initial window size must be non-zero, got {}x{}",
                self.window.width, self.window.height
            )));
        }

        let frames = self.renderer.virtual_frames;
        if !(1..=MAX_VIRTUAL_FRAMES).contains(&frames) {
            return Err(Error::Config(format!(
                "virtual_frames must be in 1..={MAX_VIRTUAL_FRAMES}, got {frames}"
            )));
        }

        if self.renderer.frame_timeout_ms == 0 {
            return Err(Error::Config("frame_timeout_ms must be non-zero".to_owned()));
        }

        if self.renderer.acquire_timeout_ms == Some(0) {
            return Err(Error::Config(
                "acquire_timeout_ms must be non-zero; omit it to wait without bound".to_owned(),
            ));
        }

        Ok(())
    }
}
