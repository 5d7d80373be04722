//! Presentation loop on top of the RHI.
//!
//! This crate orchestrates every frame:
//! - Virtual frame resources and their round-robin index
//! - Command recording with queue family ownership transfers
//! - Draw stages composed into the render pass
//! - The frame loop state machine and swap chain invalidation

pub mod frame_loop;
pub mod recorder;
pub mod renderer;
pub mod stages;
pub mod virtual_frame;

pub use frame_loop::{FrameLoop, FrameOutcome, FrameState, FrameStats, FrameTarget};
pub use renderer::Renderer;
pub use stages::{ClearStage, DrawStage, TexturedQuadStage, TriangleStage, VertexAttributeStage};
pub use virtual_frame::{FrameIndex, FrameResourceSet, VirtualFrame};
