//! Frame resource set: a fixed pool of virtual frames.
//!
//! A virtual frame bundles everything one in-flight frame needs on the CPU
//! side of the GPU/CPU overlap:
//!
//! ```text
//! 1. wait on `fence`            (previous use of this slot has retired)
//! 2. acquire an image           (signals `image_available`)
//! 3. record `command_buffer`    (into `framebuffer`, built for that image)
//! 4. submit                     (waits `image_available`, signals
//!                                `rendering_finished` and `fence`)
//! 5. present                    (waits `rendering_finished`)
//! ```
//!
//! Slots are recycled round-robin through [`FrameIndex`], independent of which
//! swap chain image the platform hands back, so the slot count bounds how far
//! the CPU can run ahead of the GPU.

use std::sync::Arc;

use tracing::{debug, info};

use vkpresent_rhi::RhiResult;
use vkpresent_rhi::command::{CommandBuffer, CommandPool};
use vkpresent_rhi::device::Device;
use vkpresent_rhi::framebuffer::Framebuffer;
use vkpresent_rhi::sync::{Fence, Semaphore};

/// Resources of one virtual frame.
pub struct VirtualFrame {
    image_available: Semaphore,
    rendering_finished: Semaphore,
    /// Created signaled so the first wait returns immediately
    fence: Fence,
    command_buffer: CommandBuffer,
    /// Built for whichever image this slot acquired last
    framebuffer: Option<Framebuffer>,
}

impl VirtualFrame {
    fn new(device: &Arc<Device>, command_buffer: CommandBuffer) -> RhiResult<Self> {
        Ok(Self {
            image_available: Semaphore::new(device.clone())?,
            rendering_finished: Semaphore::new(device.clone())?,
            fence: Fence::new(device.clone(), true)?,
            command_buffer,
            framebuffer: None,
        })
    }

    #[inline]
    pub fn image_available(&self) -> &Semaphore {
        &self.image_available
    }

    #[inline]
    pub fn rendering_finished(&self) -> &Semaphore {
        &self.rendering_finished
    }

    #[inline]
    pub fn fence(&self) -> &Fence {
        &self.fence
    }

    #[inline]
    pub fn command_buffer(&self) -> &CommandBuffer {
        &self.command_buffer
    }

    /// Replaces the slot's framebuffer, destroying the previous one.
    ///
    /// The slot's fence must have been waited on.
    pub fn replace_framebuffer(&mut self, framebuffer: Framebuffer) -> &Framebuffer {
        self.framebuffer.insert(framebuffer)
    }
}

/// Fixed-size pool of [`VirtualFrame`]s.
///
/// Not thread-safe; owned by the frame loop's target.
pub struct FrameResourceSet {
    device: Arc<Device>,
    frames: Vec<VirtualFrame>,
}

impl FrameResourceSet {
    /// Allocates `count` virtual frames, one command buffer each from `pool`.
    ///
    /// `pool` should be created with individual-reset and transient flags so
    /// each buffer can be re-recorded in place every frame.
    pub fn new(device: Arc<Device>, pool: &CommandPool, count: usize) -> RhiResult<Self> {
        let command_buffers = pool.allocate_command_buffers(count as u32)?;

        let mut frames = Vec::with_capacity(count);
        for (i, command_buffer) in command_buffers.into_iter().enumerate() {
            frames.push(VirtualFrame::new(&device, command_buffer)?);
            debug!("Created virtual frame {}", i);
        }

        info!("Frame resource set created with {} virtual frames", count);

        Ok(Self { device, frames })
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.frames.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    #[inline]
    pub fn frame(&self, slot: usize) -> &VirtualFrame {
        &self.frames[slot]
    }

    #[inline]
    pub fn frame_mut(&mut self, slot: usize) -> &mut VirtualFrame {
        &mut self.frames[slot]
    }

    /// Drops every framebuffer. Their image views are about to go away.
    pub fn clear_framebuffers(&mut self) {
        for frame in &mut self.frames {
            frame.framebuffer = None;
        }
    }

    /// Replaces both semaphores of every slot.
    ///
    /// A stale present may leave `rendering_finished` waited on or not, and
    /// an abandoned acquire may leave `image_available` signaled; fresh
    /// semaphores put every slot back into a known state. The device must
    /// be idle.
    pub fn reset_semaphores(&mut self) -> RhiResult<()> {
        for (i, frame) in self.frames.iter_mut().enumerate() {
            frame.image_available = Semaphore::new(self.device.clone())?;
            frame.rendering_finished = Semaphore::new(self.device.clone())?;
            debug!("Reset semaphores for virtual frame {}", i);
        }
        Ok(())
    }
}

/// Round-robin virtual frame index: `(index + 1) mod K`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameIndex {
    current: usize,
    count: usize,
}

impl FrameIndex {
    /// Starts at slot 0. A zero count is treated as one slot.
    pub fn new(count: usize) -> Self {
        Self {
            current: 0,
            count: count.max(1),
        }
    }

    #[inline]
    pub fn current(&self) -> usize {
        self.current
    }

    #[inline]
    pub fn count(&self) -> usize {
        self.count
    }

    /// Moves to the next slot and returns it.
    pub fn advance(&mut self) -> usize {
        self.current = (self.current + 1) % self.count;
        self.current
    }
}
