//! Per-frame command recording.
//!
//! Every frame re-records the slot's command buffer:
//!
//! 1. begin with `SIMULTANEOUS_USE`
//! 2. present → graphics ownership transfer (only when the families differ)
//! 3. render pass: clear, then the draw stage
//! 4. graphics → present ownership transfer (only when the families differ)
//! 5. end
//!
//! An encode failure is returned to the frame loop and is fatal for the run.

use ash::vk;

use vkpresent_rhi::RhiResult;
use vkpresent_rhi::command::CommandBuffer;
use vkpresent_rhi::physical_device::QueueFamilyIndices;
use vkpresent_rhi::swapchain::color_subresource_range;

use crate::stages::DrawStage;

/// Hands `image` from the present family to the graphics family before
/// rendering into it.
pub fn acquire_ownership_barrier(
    image: vk::Image,
    families: QueueFamilyIndices,
) -> vk::ImageMemoryBarrier<'static> {
    vk::ImageMemoryBarrier::default()
        .src_access_mask(vk::AccessFlags::MEMORY_READ)
        .dst_access_mask(vk::AccessFlags::COLOR_ATTACHMENT_WRITE)
        .old_layout(vk::ImageLayout::UNDEFINED)
        .new_layout(vk::ImageLayout::PRESENT_SRC_KHR)
        .src_queue_family_index(families.present_family)
        .dst_queue_family_index(families.graphics_family)
        .image(image)
        .subresource_range(color_subresource_range())
}

/// Hands `image` back to the present family after the render pass.
pub fn release_ownership_barrier(
    image: vk::Image,
    families: QueueFamilyIndices,
) -> vk::ImageMemoryBarrier<'static> {
    vk::ImageMemoryBarrier::default()
        .src_access_mask(vk::AccessFlags::COLOR_ATTACHMENT_WRITE)
        .dst_access_mask(vk::AccessFlags::MEMORY_READ)
        .old_layout(vk::ImageLayout::PRESENT_SRC_KHR)
        .new_layout(vk::ImageLayout::PRESENT_SRC_KHR)
        .src_queue_family_index(families.graphics_family)
        .dst_queue_family_index(families.present_family)
        .image(image)
        .subresource_range(color_subresource_range())
}

/// Clear value for the single color attachment.
pub fn clear_value(color: [f32; 4]) -> vk::ClearValue {
    vk::ClearValue {
        color: vk::ClearColorValue { float32: color },
    }
}

/// Everything the recorder needs to know about the frame's target image.
#[derive(Debug, Clone, Copy)]
pub struct RecordTarget {
    pub image: vk::Image,
    pub render_pass: vk::RenderPass,
    pub framebuffer: vk::Framebuffer,
    pub extent: vk::Extent2D,
}

/// Records the per-frame command buffer.
#[derive(Debug, Clone, Copy)]
pub struct CommandRecorder {
    clear_color: [f32; 4],
    queue_families: QueueFamilyIndices,
}

impl CommandRecorder {
    pub fn new(clear_color: [f32; 4], queue_families: QueueFamilyIndices) -> Self {
        Self {
            clear_color,
            queue_families,
        }
    }

    /// Whether images have to change queue family ownership every frame.
    #[inline]
    pub fn needs_ownership_transfer(&self) -> bool {
        !self.queue_families.is_shared()
    }

    #[inline]
    pub fn clear_color(&self) -> [f32; 4] {
        self.clear_color
    }

    /// Re-records `cmd` for `target`.
    ///
    /// `cmd` must not be pending execution.
    pub fn record(
        &self,
        cmd: &CommandBuffer,
        target: &RecordTarget,
        stage: &dyn DrawStage,
    ) -> RhiResult<()> {
        cmd.reset()?;
        cmd.begin_simultaneous()?;

        if self.needs_ownership_transfer() {
            cmd.pipeline_barrier(
                vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT,
                vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT,
                &[acquire_ownership_barrier(target.image, self.queue_families)],
            );
        }

        let clear_values = [clear_value(self.clear_color)];
        let begin_info = vk::RenderPassBeginInfo::default()
            .render_pass(target.render_pass)
            .framebuffer(target.framebuffer)
            .render_area(vk::Rect2D {
                offset: vk::Offset2D { x: 0, y: 0 },
                extent: target.extent,
            })
            .clear_values(&clear_values);

        cmd.begin_render_pass(&begin_info);
        stage.draw(cmd, target.extent);
        cmd.end_render_pass();

        if self.needs_ownership_transfer() {
            cmd.pipeline_barrier(
                vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT,
                vk::PipelineStageFlags::BOTTOM_OF_PIPE,
                &[release_ownership_barrier(target.image, self.queue_families)],
            );
        }

        cmd.end()
    }
}
