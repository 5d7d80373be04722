//! Frame loop scenarios against a scripted surface.
//!
//! `ScriptedSurface` negotiates its chain with the real swap chain policy
//! and tracks fences per virtual frame, so these tests exercise the loop's
//! sequencing without a GPU.

use std::collections::VecDeque;

use vkpresent_renderer::{FrameLoop, FrameOutcome, FrameState, FrameTarget};
use vkpresent_rhi::swapchain::{
    AcquireOutcome, PresentOutcome, SwapchainConfig, SwapchainSupportDetails, negotiate,
};
use vkpresent_rhi::{RhiError, RhiResult, vk};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FenceState {
    Signaled,
    Unsignaled,
    Pending,
}

struct ScriptedSurface {
    support: SwapchainSupportDetails,
    window_extent: vk::Extent2D,
    chain: Option<SwapchainConfig>,
    generation: u64,
    destroyed_generations: Vec<u64>,
    fences: Vec<FenceState>,
    next_image: u32,
    acquire_script: VecDeque<AcquireOutcome>,
    present_script: VecDeque<PresentOutcome>,
    /// Generation each presented frame was rendered with
    presented_generations: Vec<u64>,
    acquires: usize,
}

fn sentinel_capabilities(min_image_count: u32, max_image_count: u32) -> vk::SurfaceCapabilitiesKHR {
    vk::SurfaceCapabilitiesKHR {
        min_image_count,
        max_image_count,
        current_extent: vk::Extent2D {
            width: u32::MAX,
            height: u32::MAX,
        },
        min_image_extent: vk::Extent2D {
            width: 1,
            height: 1,
        },
        max_image_extent: vk::Extent2D {
            width: 4096,
            height: 4096,
        },
        max_image_array_layers: 1,
        supported_transforms: vk::SurfaceTransformFlagsKHR::IDENTITY,
        current_transform: vk::SurfaceTransformFlagsKHR::IDENTITY,
        supported_composite_alpha: vk::CompositeAlphaFlagsKHR::OPAQUE,
        supported_usage_flags: vk::ImageUsageFlags::COLOR_ATTACHMENT
            | vk::ImageUsageFlags::TRANSFER_DST,
    }
}

fn support(present_modes: Vec<vk::PresentModeKHR>) -> SwapchainSupportDetails {
    SwapchainSupportDetails {
        capabilities: sentinel_capabilities(2, 3),
        formats: vec![vk::SurfaceFormatKHR {
            format: vk::Format::R8G8B8A8_UNORM,
            color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
        }],
        present_modes,
    }
}

impl ScriptedSurface {
    fn new(support: SwapchainSupportDetails, width: u32, height: u32, virtual_frames: usize) -> RhiResult<Self> {
        let mut surface = Self {
            support,
            window_extent: vk::Extent2D { width, height },
            chain: None,
            generation: 0,
            destroyed_generations: Vec::new(),
            fences: vec![FenceState::Signaled; virtual_frames],
            next_image: 0,
            acquire_script: VecDeque::new(),
            present_script: VecDeque::new(),
            presented_generations: Vec::new(),
            acquires: 0,
        };
        surface.rebuild()?;
        Ok(surface)
    }

    fn resize(&mut self, frame_loop: &mut FrameLoop, width: u32, height: u32) {
        self.window_extent = vk::Extent2D { width, height };
        frame_loop.request_rebuild();
    }

    fn in_flight(&self) -> usize {
        self.fences
            .iter()
            .filter(|&&f| f == FenceState::Pending)
            .count()
    }
}

impl FrameTarget for ScriptedSurface {
    fn virtual_frame_count(&self) -> usize {
        self.fences.len()
    }

    fn has_presentable_images(&self) -> bool {
        self.chain.is_some()
    }

    fn wait_for_virtual_frame(&mut self, slot: usize) -> RhiResult<()> {
        // The GPU retires whatever this slot submitted last
        if self.fences[slot] == FenceState::Pending {
            self.fences[slot] = FenceState::Signaled;
        }
        assert_eq!(
            self.fences[slot],
            FenceState::Signaled,
            "waiting on a fence that will never signal"
        );
        Ok(())
    }

    fn acquire_image(&mut self, _slot: usize) -> RhiResult<AcquireOutcome> {
        self.acquires += 1;
        if let Some(outcome) = self.acquire_script.pop_front() {
            return Ok(outcome);
        }
        let Some(chain) = &self.chain else {
            return Err(RhiError::InvalidHandle("acquire without images".to_owned()));
        };
        let image_index = self.next_image;
        self.next_image = (self.next_image + 1) % chain.image_count;
        Ok(AcquireOutcome::Ready {
            image_index,
            suboptimal: false,
        })
    }

    fn reset_virtual_frame(&mut self, slot: usize) -> RhiResult<()> {
        assert_eq!(self.fences[slot], FenceState::Signaled);
        self.fences[slot] = FenceState::Unsignaled;
        Ok(())
    }

    fn record(&mut self, _slot: usize, image_index: u32) -> RhiResult<()> {
        let chain = self.chain.as_ref().ok_or(RhiError::InvalidHandle(
            "record without images".to_owned(),
        ))?;
        assert!(image_index < chain.image_count);
        Ok(())
    }

    fn submit(&mut self, slot: usize) -> RhiResult<()> {
        assert_eq!(self.fences[slot], FenceState::Unsignaled);
        self.fences[slot] = FenceState::Pending;
        assert!(self.in_flight() <= self.fences.len());
        Ok(())
    }

    fn present(&mut self, _slot: usize, _image_index: u32) -> RhiResult<PresentOutcome> {
        let outcome = self
            .present_script
            .pop_front()
            .unwrap_or(PresentOutcome::Presented);
        if outcome != PresentOutcome::OutOfDate {
            self.presented_generations.push(self.generation);
        }
        Ok(outcome)
    }

    fn rebuild(&mut self) -> RhiResult<bool> {
        // Device idle: every submission retires
        for fence in &mut self.fences {
            if *fence == FenceState::Pending {
                *fence = FenceState::Signaled;
            }
        }

        let negotiated = negotiate(&self.support, self.window_extent, true)?;
        if self.chain.take().is_some() {
            self.destroyed_generations.push(self.generation);
        }
        if let Some(config) = negotiated {
            self.generation += 1;
            self.next_image = 0;
            self.chain = Some(config);
        }
        Ok(self.chain.is_some())
    }

    fn swapchain_generation(&self) -> u64 {
        self.generation
    }
}

fn mailbox_and_fifo() -> SwapchainSupportDetails {
    support(vec![vk::PresentModeKHR::FIFO, vk::PresentModeKHR::MAILBOX])
}

#[test]
fn test_virtual_frames_advance_round_robin() {
    let mut surface = ScriptedSurface::new(mailbox_and_fifo(), 800, 600, 3).unwrap();
    let mut frame_loop = FrameLoop::for_target(&surface);

    let slots: Vec<usize> = (0..7)
        .map(|_| match frame_loop.tick(&mut surface).unwrap() {
            FrameOutcome::Presented { slot, .. } => slot,
            other => panic!("unexpected outcome {other:?}"),
        })
        .collect();

    assert_eq!(slots, [0, 1, 2, 0, 1, 2, 0]);
    assert_eq!(frame_loop.stats().presented, 7);
    assert_eq!(frame_loop.state(), FrameState::Idle);
}

#[test]
fn test_slots_are_independent_of_image_indices() {
    let mut surface = ScriptedSurface::new(mailbox_and_fifo(), 800, 600, 2).unwrap();
    let mut frame_loop = FrameLoop::for_target(&surface);

    let mut pairs = Vec::new();
    for _ in 0..4 {
        if let FrameOutcome::Presented { slot, image_index } = frame_loop.tick(&mut surface).unwrap() {
            pairs.push((slot, image_index));
        }
    }

    // Three images, two virtual frames
    assert_eq!(pairs, [(0, 0), (1, 1), (0, 2), (1, 0)]);
}

#[test]
fn test_minimized_window_skips_until_restored() {
    let mut surface = ScriptedSurface::new(mailbox_and_fifo(), 800, 600, 3).unwrap();
    let mut frame_loop = FrameLoop::for_target(&surface);
    frame_loop.tick(&mut surface).unwrap();

    surface.resize(&mut frame_loop, 0, 0);
    assert_eq!(frame_loop.tick(&mut surface).unwrap(), FrameOutcome::Skipped);
    assert_eq!(frame_loop.stats().rebuilds, 1);
    assert!(!surface.has_presentable_images());

    let acquires_while_minimized = surface.acquires;
    for _ in 0..5 {
        assert_eq!(frame_loop.tick(&mut surface).unwrap(), FrameOutcome::Skipped);
    }
    assert_eq!(surface.acquires, acquires_while_minimized);
    assert_eq!(frame_loop.stats().rebuilds, 1);

    surface.resize(&mut frame_loop, 1024, 768);
    assert!(matches!(
        frame_loop.tick(&mut surface).unwrap(),
        FrameOutcome::Presented { .. }
    ));
    assert_eq!(
        surface.chain.map(|c| c.extent),
        Some(vk::Extent2D {
            width: 1024,
            height: 768
        })
    );
}

#[test]
fn test_out_of_date_acquire_moves_to_new_chain() {
    let mut surface = ScriptedSurface::new(mailbox_and_fifo(), 800, 600, 3).unwrap();
    let mut frame_loop = FrameLoop::for_target(&surface);
    frame_loop.tick(&mut surface).unwrap();
    let old_generation = surface.swapchain_generation();

    surface.acquire_script.push_back(AcquireOutcome::OutOfDate);
    assert_eq!(frame_loop.tick(&mut surface).unwrap(), FrameOutcome::Rebuilt);
    assert!(matches!(
        frame_loop.tick(&mut surface).unwrap(),
        FrameOutcome::Presented { .. }
    ));

    let last = surface.presented_generations.last().copied();
    assert!(last > Some(old_generation));
    assert!(surface.destroyed_generations.contains(&old_generation));
}

#[test]
fn test_out_of_date_present_moves_to_new_chain() {
    let mut surface = ScriptedSurface::new(mailbox_and_fifo(), 800, 600, 2).unwrap();
    let mut frame_loop = FrameLoop::for_target(&surface);
    let old_generation = surface.swapchain_generation();

    surface.present_script.push_back(PresentOutcome::OutOfDate);
    assert_eq!(frame_loop.tick(&mut surface).unwrap(), FrameOutcome::Rebuilt);
    // The frame was submitted, so its slot was consumed
    assert_eq!(frame_loop.current_slot(), 1);

    frame_loop.tick(&mut surface).unwrap();
    assert_eq!(
        surface.presented_generations,
        [old_generation + 1],
        "only the frame on the new chain reached the screen"
    );
}

#[test]
fn test_suboptimal_present_is_shown_then_rebuilt() {
    let mut surface = ScriptedSurface::new(mailbox_and_fifo(), 800, 600, 2).unwrap();
    let mut frame_loop = FrameLoop::for_target(&surface);

    surface.present_script.push_back(PresentOutcome::Suboptimal);
    assert_eq!(frame_loop.tick(&mut surface).unwrap(), FrameOutcome::Rebuilt);
    assert_eq!(surface.presented_generations, [1]);
    assert_eq!(surface.swapchain_generation(), 2);
}

#[test]
fn test_fifo_only_surface_runs() {
    let mut surface = ScriptedSurface::new(support(vec![vk::PresentModeKHR::FIFO]), 640, 480, 2).unwrap();
    assert_eq!(
        surface.chain.map(|c| c.present_mode),
        Some(vk::PresentModeKHR::FIFO)
    );

    let mut frame_loop = FrameLoop::for_target(&surface);
    assert!(matches!(
        frame_loop.tick(&mut surface).unwrap(),
        FrameOutcome::Presented { .. }
    ));
}

#[test]
fn test_no_present_modes_aborts_startup() {
    let result = ScriptedSurface::new(support(Vec::new()), 640, 480, 2);
    assert!(matches!(
        result,
        Err(RhiError::UnsupportedPresentMode { .. })
    ));
}

#[test]
fn test_failed_rebuild_ends_the_run() {
    let mut surface = ScriptedSurface::new(mailbox_and_fifo(), 800, 600, 2).unwrap();
    let mut frame_loop = FrameLoop::for_target(&surface);

    surface.support.present_modes.clear();
    surface.acquire_script.push_back(AcquireOutcome::OutOfDate);

    let err = frame_loop.tick(&mut surface).unwrap_err();
    assert!(matches!(err, RhiError::UnsupportedPresentMode { .. }));
    assert_eq!(frame_loop.state(), FrameState::Invalidated);
}

#[test]
fn test_image_count_follows_capabilities() {
    let mut unbounded = support(vec![vk::PresentModeKHR::FIFO]);
    unbounded.capabilities = sentinel_capabilities(1, 0);
    let surface = ScriptedSurface::new(unbounded, 640, 480, 2).unwrap();
    assert_eq!(surface.chain.map(|c| c.image_count), Some(2));

    let mut clamped = support(vec![vk::PresentModeKHR::FIFO]);
    clamped.capabilities = sentinel_capabilities(2, 2);
    let surface = ScriptedSurface::new(clamped, 640, 480, 2).unwrap();
    assert_eq!(surface.chain.map(|c| c.image_count), Some(2));
}

#[test]
fn test_fences_bound_frames_in_flight() {
    let mut surface = ScriptedSurface::new(mailbox_and_fifo(), 800, 600, 2).unwrap();
    let mut frame_loop = FrameLoop::for_target(&surface);

    for _ in 0..6 {
        frame_loop.tick(&mut surface).unwrap();
        assert!(surface.in_flight() <= 2);
    }
    assert_eq!(surface.in_flight(), 2);
}
