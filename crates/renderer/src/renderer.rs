//! The Vulkan renderer: bootstrap plus the [`FrameTarget`] the frame loop
//! drives.

use std::mem::ManuallyDrop;
use std::sync::Arc;

use ash::vk;
use tracing::{debug, error, info};

use vkpresent_core::{PresentModePreference, RendererConfig};
use vkpresent_platform::{Surface, Window};
use vkpresent_rhi::command::CommandPool;
use vkpresent_rhi::device::Device;
use vkpresent_rhi::framebuffer::Framebuffer;
use vkpresent_rhi::instance::Instance;
use vkpresent_rhi::physical_device::select_physical_device;
use vkpresent_rhi::render_pass::RenderPass;
use vkpresent_rhi::swapchain::{AcquireOutcome, PresentOutcome, Swapchain};
use vkpresent_rhi::{RhiError, RhiResult};

use crate::frame_loop::{FrameLoop, FrameOutcome, FrameStats, FrameTarget};
use crate::recorder::{CommandRecorder, RecordTarget};
use crate::stages::{DrawStage, create_stage};
use crate::virtual_frame::FrameResourceSet;

/// Everything that lives on the device: the swap chain and the resources
/// derived from it.
///
/// Fields drop in declaration order, so per-frame objects go before the
/// render pass, the pool and the swap chain whose views they reference.
pub struct VulkanTarget {
    frames: FrameResourceSet,
    stage: Box<dyn DrawStage>,
    /// `None` while the surface has zero area
    render_pass: Option<RenderPass>,
    command_pool: CommandPool,
    swapchain: Swapchain,
    recorder: CommandRecorder,
    window_extent: vk::Extent2D,
    fence_timeout_ns: u64,
    acquire_timeout_ns: u64,
    device: Arc<Device>,
}

impl VulkanTarget {
    fn new(
        instance: &Instance,
        surface: &Surface,
        window_extent: vk::Extent2D,
        config: &RendererConfig,
    ) -> RhiResult<Self> {
        let physical_device =
            select_physical_device(instance.handle(), surface.handle(), surface.loader())?;
        let device = Device::new(instance, &physical_device)?;
        let queue_families = device.queue_families();

        let swapchain = Swapchain::new(
            instance,
            device.clone(),
            surface.handle(),
            surface.loader(),
            window_extent,
            config.present_mode == PresentModePreference::Mailbox,
        )?;

        let command_pool = CommandPool::new(device.clone(), queue_families.graphics_family)?;
        let frames = FrameResourceSet::new(device.clone(), &command_pool, config.virtual_frames)?;
        let stage = create_stage(&device, config)?;

        let mut target = Self {
            frames,
            stage,
            render_pass: None,
            command_pool,
            swapchain,
            recorder: CommandRecorder::new(config.clear_color, queue_families),
            window_extent,
            fence_timeout_ns: config.frame_timeout_ns(),
            acquire_timeout_ns: config.acquire_timeout_ns(),
            device,
        };

        if target.swapchain.has_images() {
            target.create_render_targets()?;
        }

        if target.recorder.needs_ownership_transfer() {
            info!(
                "Graphics ({}) and present ({}) families differ, images change ownership every frame",
                queue_families.graphics_family, queue_families.present_family
            );
        }

        Ok(target)
    }

    /// Render pass and stage pipelines for the current swap chain format.
    fn create_render_targets(&mut self) -> RhiResult<()> {
        let render_pass = RenderPass::new(self.device.clone(), self.swapchain.format())?;
        self.stage
            .prepare(&self.device, &render_pass, self.swapchain.extent())?;
        self.render_pass = Some(render_pass);
        Ok(())
    }

    #[inline]
    pub fn device(&self) -> &Arc<Device> {
        &self.device
    }

    #[inline]
    pub fn swapchain(&self) -> &Swapchain {
        &self.swapchain
    }
}

impl FrameTarget for VulkanTarget {
    fn virtual_frame_count(&self) -> usize {
        self.frames.len()
    }

    fn has_presentable_images(&self) -> bool {
        self.swapchain.has_images() && self.render_pass.is_some()
    }

    fn wait_for_virtual_frame(&mut self, slot: usize) -> RhiResult<()> {
        self.frames.frame(slot).fence().wait(self.fence_timeout_ns)
    }

    fn acquire_image(&mut self, slot: usize) -> RhiResult<AcquireOutcome> {
        let semaphore = self.frames.frame(slot).image_available().handle();
        self.swapchain.acquire_next_image(semaphore, self.acquire_timeout_ns)
    }

    fn reset_virtual_frame(&mut self, slot: usize) -> RhiResult<()> {
        self.frames.frame(slot).fence().reset()
    }

    fn record(&mut self, slot: usize, image_index: u32) -> RhiResult<()> {
        let render_pass = self
            .render_pass
            .as_ref()
            .ok_or_else(|| RhiError::InvalidHandle("no render pass to record into".to_owned()))?;

        let index = image_index as usize;
        let extent = self.swapchain.extent();
        let framebuffer = Framebuffer::new(
            self.device.clone(),
            render_pass,
            self.swapchain.image_view(index),
            extent,
        )?;

        let frame = self.frames.frame_mut(slot);
        let framebuffer = frame.replace_framebuffer(framebuffer).handle();

        let target = RecordTarget {
            image: self.swapchain.image(index),
            render_pass: render_pass.handle(),
            framebuffer,
            extent,
        };
        self.recorder
            .record(frame.command_buffer(), &target, self.stage.as_ref())
    }

    fn submit(&mut self, slot: usize) -> RhiResult<()> {
        let frame = self.frames.frame(slot);

        let wait_semaphores = [frame.image_available().handle()];
        let wait_stages = [vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT];
        let command_buffers = [frame.command_buffer().handle()];
        let signal_semaphores = [frame.rendering_finished().handle()];

        let submit_info = vk::SubmitInfo::default()
            .wait_semaphores(&wait_semaphores)
            .wait_dst_stage_mask(&wait_stages)
            .command_buffers(&command_buffers)
            .signal_semaphores(&signal_semaphores);

        // SAFETY: the buffer was just recorded, and the fence was reset after
        // the wait in this same tick.
        unsafe {
            self.device
                .submit_graphics(&[submit_info], frame.fence().handle())
        }
    }

    fn present(&mut self, slot: usize, image_index: u32) -> RhiResult<PresentOutcome> {
        let wait = self.frames.frame(slot).rendering_finished().handle();
        self.swapchain
            .present(self.device.present_queue(), image_index, wait)
    }

    fn rebuild(&mut self) -> RhiResult<bool> {
        self.device.wait_idle()?;

        // Everything built on the old image views goes first
        self.frames.clear_framebuffers();
        self.render_pass = None;

        let has_images = self.swapchain.rebuild(self.window_extent)?;
        self.command_pool.reset(false)?;
        self.frames.reset_semaphores()?;

        if has_images {
            self.create_render_targets()?;
        } else {
            debug!("Surface has zero area, presentation paused");
        }
        Ok(has_images)
    }

    fn swapchain_generation(&self) -> u64 {
        self.swapchain.generation()
    }
}

/// Whether a resize to `requested` has to go through a rebuild.
///
/// An unchanged size still rebuilds while the chain is empty: an out-of-date
/// acquire can leave it empty without any resize event in between.
pub fn resize_needs_rebuild(
    current: vk::Extent2D,
    requested: vk::Extent2D,
    has_images: bool,
    rebuild_pending: bool,
) -> bool {
    requested != current || !has_images || rebuild_pending
}

/// Window-bound renderer: owns the instance, the surface, the device-side
/// target and the frame loop.
///
/// ManuallyDrop is used to ensure correct destruction order.
pub struct Renderer {
    frame_loop: FrameLoop,
    target: ManuallyDrop<VulkanTarget>,
    surface: ManuallyDrop<Surface>,
    instance: ManuallyDrop<Instance>,
}

impl Renderer {
    /// Creates a renderer presenting to `window`.
    ///
    /// # Errors
    ///
    /// Any bootstrap failure: no loader, no suitable GPU, unsupported
    /// present mode or image usage, missing shaders.
    pub fn new(window: &Window, config: &RendererConfig) -> RhiResult<Self> {
        let (width, height) = window.client_size();
        info!("Initializing Vulkan renderer ({}x{})", width, height);

        let extensions = window
            .required_instance_extensions()
            .map_err(|e| RhiError::SurfaceError(e.to_string()))?;
        let instance = Instance::new(&extensions, config.validation)?;

        let surface = window
            .create_surface(instance.entry(), instance.handle())
            .map_err(|e| RhiError::SurfaceError(e.to_string()))?;

        let target = VulkanTarget::new(
            &instance,
            &surface,
            vk::Extent2D { width, height },
            config,
        )?;
        let frame_loop = FrameLoop::for_target(&target);

        info!(
            "Renderer initialized: {} swapchain images, {} virtual frames",
            target.swapchain.image_count(),
            target.virtual_frame_count()
        );

        Ok(Self {
            frame_loop,
            target: ManuallyDrop::new(target),
            surface: ManuallyDrop::new(surface),
            instance: ManuallyDrop::new(instance),
        })
    }

    /// Records the new client size; the next frame rebuilds the swap chain.
    ///
    /// A zero size is accepted and pauses presentation until the next
    /// non-zero resize.
    pub fn resize(&mut self, width: u32, height: u32) {
        let extent = vk::Extent2D { width, height };
        if !resize_needs_rebuild(
            self.target.window_extent,
            extent,
            self.target.has_presentable_images(),
            self.frame_loop.rebuild_pending(),
        ) {
            return;
        }

        debug!(
            "Resize triggered: {}x{} -> {}x{}",
            self.target.window_extent.width, self.target.window_extent.height, width, height
        );
        self.target.window_extent = extent;
        self.frame_loop.request_rebuild();
    }

    /// Runs one tick of the frame loop.
    pub fn render_frame(&mut self) -> RhiResult<FrameOutcome> {
        self.frame_loop.tick(&mut *self.target)
    }

    #[inline]
    pub fn stats(&self) -> FrameStats {
        self.frame_loop.stats()
    }

    #[inline]
    pub fn extent(&self) -> vk::Extent2D {
        self.target.swapchain.extent()
    }

    #[inline]
    pub fn format(&self) -> vk::Format {
        self.target.swapchain.format()
    }
}

impl Drop for Renderer {
    fn drop(&mut self) {
        if let Err(e) = self.target.device.wait_idle() {
            error!(
                "Failed to wait for device idle during renderer drop: {:?}",
                e
            );
        }

        // Device objects, then the surface, then the instance
        unsafe {
            ManuallyDrop::drop(&mut self.target);
            ManuallyDrop::drop(&mut self.surface);
            ManuallyDrop::drop(&mut self.instance);
        }

        info!("Renderer destroyed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SIZE: vk::Extent2D = vk::Extent2D {
        width: 800,
        height: 600,
    };

    #[test]
    fn test_unchanged_size_with_images_is_ignored() {
        assert!(!resize_needs_rebuild(SIZE, SIZE, true, false));
    }

    #[test]
    fn test_changed_size_rebuilds() {
        let larger = vk::Extent2D {
            width: 1024,
            height: 768,
        };
        assert!(resize_needs_rebuild(SIZE, larger, true, false));
        assert!(resize_needs_rebuild(SIZE, vk::Extent2D::default(), true, false));
    }

    #[test]
    fn test_unchanged_size_with_empty_chain_rebuilds() {
        // Out-of-date acquire emptied the chain, then the window came back
        // at the size it had before
        assert!(resize_needs_rebuild(SIZE, SIZE, false, false));
    }

    #[test]
    fn test_pending_rebuild_is_kept() {
        assert!(resize_needs_rebuild(SIZE, SIZE, true, true));
    }
}
