//! Frame loop driver.
//!
//! One call to [`FrameLoop::tick`] moves a frame through
//! `Idle → Acquiring → Recording → Submitting → Presenting → Idle`. Whenever
//! the platform reports the swap chain as stale the loop passes through
//! `Invalidated`, rebuilds, and ends the tick.
//!
//! The driver only sequences; the Vulkan work lives behind [`FrameTarget`],
//! which keeps the state machine testable without a GPU.

use tracing::{debug, info};

use vkpresent_rhi::RhiResult;
use vkpresent_rhi::swapchain::{AcquireOutcome, PresentOutcome};

use crate::virtual_frame::FrameIndex;

/// Where the driver currently is within a tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FrameState {
    #[default]
    Idle,
    Acquiring,
    Recording,
    Submitting,
    Presenting,
    /// The swap chain is stale and is being rebuilt
    Invalidated,
}

/// The operations the driver sequences, one virtual frame slot at a time.
pub trait FrameTarget {
    /// Number of virtual frames (K).
    fn virtual_frame_count(&self) -> usize;

    /// `false` while the surface has zero area and no chain exists.
    fn has_presentable_images(&self) -> bool;

    /// Blocks until the slot's previous submission has retired.
    fn wait_for_virtual_frame(&mut self, slot: usize) -> RhiResult<()>;

    /// Requests the next image, signaling the slot's image-available semaphore.
    fn acquire_image(&mut self, slot: usize) -> RhiResult<AcquireOutcome>;

    /// Unsignals the slot's fence ahead of its next submission.
    fn reset_virtual_frame(&mut self, slot: usize) -> RhiResult<()>;

    /// Refreshes the slot's framebuffer for `image_index` and records its
    /// command buffer.
    fn record(&mut self, slot: usize, image_index: u32) -> RhiResult<()>;

    /// Submits the slot's command buffer to the graphics queue.
    fn submit(&mut self, slot: usize) -> RhiResult<()>;

    /// Queues `image_index` for presentation.
    fn present(&mut self, slot: usize, image_index: u32) -> RhiResult<PresentOutcome>;

    /// Rebuilds the swap chain and everything derived from it. Returns
    /// whether the new chain has images.
    fn rebuild(&mut self) -> RhiResult<bool>;

    /// Changes every time a new swap chain handle is created.
    fn swapchain_generation(&self) -> u64;
}

/// What a single tick did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameOutcome {
    Presented { slot: usize, image_index: u32 },
    /// No image chain; nothing was acquired, submitted or presented
    Skipped,
    /// A stale swap chain was rebuilt during this tick
    Rebuilt,
}

/// Counters over the lifetime of the loop.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FrameStats {
    pub presented: u64,
    pub skipped: u64,
    pub rebuilds: u64,
    pub suboptimal_acquires: u64,
}

/// Single-threaded frame loop state machine.
#[derive(Debug)]
pub struct FrameLoop {
    state: FrameState,
    index: FrameIndex,
    pending_rebuild: bool,
    stats: FrameStats,
}

impl FrameLoop {
    /// Creates a loop cycling over `virtual_frames` slots.
    pub fn new(virtual_frames: usize) -> Self {
        Self {
            state: FrameState::Idle,
            index: FrameIndex::new(virtual_frames),
            pending_rebuild: false,
            stats: FrameStats::default(),
        }
    }

    /// Creates a loop sized to the target's virtual frames.
    pub fn for_target<T: FrameTarget + ?Sized>(target: &T) -> Self {
        Self::new(target.virtual_frame_count())
    }

    #[inline]
    pub fn state(&self) -> FrameState {
        self.state
    }

    /// Slot the next tick will use.
    #[inline]
    pub fn current_slot(&self) -> usize {
        self.index.current()
    }

    #[inline]
    pub fn stats(&self) -> FrameStats {
        self.stats
    }

    #[inline]
    pub fn rebuild_pending(&self) -> bool {
        self.pending_rebuild
    }

    /// Makes the next tick rebuild the swap chain before anything else.
    pub fn request_rebuild(&mut self) {
        self.pending_rebuild = true;
    }

    /// Runs one frame.
    ///
    /// # Errors
    ///
    /// Anything other than staleness (out-of-date, suboptimal present) is
    /// returned as-is and should end the run, including a failed rebuild.
    pub fn tick<T: FrameTarget + ?Sized>(&mut self, target: &mut T) -> RhiResult<FrameOutcome> {
        if self.pending_rebuild {
            self.pending_rebuild = false;
            debug!("Rebuilding swap chain on request");
            self.invalidate(target)?;
        }

        if !target.has_presentable_images() {
            self.state = FrameState::Idle;
            self.stats.skipped += 1;
            return Ok(FrameOutcome::Skipped);
        }

        let slot = self.index.current();

        self.state = FrameState::Acquiring;
        target.wait_for_virtual_frame(slot)?;

        let image_index = match target.acquire_image(slot)? {
            AcquireOutcome::Ready {
                image_index,
                suboptimal,
            } => {
                if suboptimal {
                    debug!("Acquired suboptimal image {}", image_index);
                    self.stats.suboptimal_acquires += 1;
                }
                image_index
            }
            AcquireOutcome::OutOfDate => {
                debug!("Swap chain out of date on acquire");
                self.invalidate(target)?;
                return Ok(FrameOutcome::Rebuilt);
            }
        };

        // Only now is a submission guaranteed to follow and signal it again
        target.reset_virtual_frame(slot)?;

        self.state = FrameState::Recording;
        target.record(slot, image_index)?;

        self.state = FrameState::Submitting;
        target.submit(slot)?;
        self.index.advance();

        self.state = FrameState::Presenting;
        let presented = target.present(slot, image_index)?;
        if presented.is_stale() {
            debug!("Swap chain stale on present: {:?}", presented);
            self.invalidate(target)?;
            return Ok(FrameOutcome::Rebuilt);
        }

        self.state = FrameState::Idle;
        self.stats.presented += 1;
        Ok(FrameOutcome::Presented { slot, image_index })
    }

    fn invalidate<T: FrameTarget + ?Sized>(&mut self, target: &mut T) -> RhiResult<()> {
        self.state = FrameState::Invalidated;
        let before = target.swapchain_generation();
        let has_images = target.rebuild()?;
        self.stats.rebuilds += 1;
        self.state = FrameState::Idle;

        info!(
            "Swap chain rebuilt (generation {} -> {}, images: {})",
            before,
            target.swapchain_generation(),
            has_images
        );
        Ok(())
    }
}
