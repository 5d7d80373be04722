//! Sampled 2D textures in device-local memory.
//!
//! Pixels are staged in a host-visible buffer, then one transfer submission
//! moves the image from `UNDEFINED` to `TRANSFER_DST_OPTIMAL`, copies the
//! pixels and hands it to the fragment shader in `SHADER_READ_ONLY_OPTIMAL`.

use std::sync::Arc;

use ash::vk;
use gpu_allocator::MemoryLocation;
use gpu_allocator::vulkan::Allocation;
use tracing::{debug, info};

use crate::buffer::{Buffer, BufferUsage};
use crate::device::Device;
use crate::error::{RhiError, RhiResult};
use crate::memory;
use crate::swapchain::color_subresource_range;
use crate::upload::submit_one_time;

/// Pixel format of every texture: 8-bit RGBA, linear.
pub const TEXTURE_FORMAT: vk::Format = vk::Format::R8G8B8A8_UNORM;

const BYTES_PER_PIXEL: usize = 4;

/// Byte length of a tightly packed RGBA8 image, `None` on overflow.
pub fn rgba8_len(extent: vk::Extent2D) -> Option<usize> {
    (extent.width as usize)
        .checked_mul(extent.height as usize)?
        .checked_mul(BYTES_PER_PIXEL)
}

/// The two layout transitions around the pixel copy.
pub fn upload_barriers(image: vk::Image) -> [vk::ImageMemoryBarrier<'static>; 2] {
    let to_transfer = vk::ImageMemoryBarrier::default()
        .src_access_mask(vk::AccessFlags::empty())
        .dst_access_mask(vk::AccessFlags::TRANSFER_WRITE)
        .old_layout(vk::ImageLayout::UNDEFINED)
        .new_layout(vk::ImageLayout::TRANSFER_DST_OPTIMAL)
        .src_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
        .dst_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
        .image(image)
        .subresource_range(color_subresource_range());

    let to_shader = vk::ImageMemoryBarrier::default()
        .src_access_mask(vk::AccessFlags::TRANSFER_WRITE)
        .dst_access_mask(vk::AccessFlags::SHADER_READ)
        .old_layout(vk::ImageLayout::TRANSFER_DST_OPTIMAL)
        .new_layout(vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL)
        .src_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
        .dst_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
        .image(image)
        .subresource_range(color_subresource_range());

    [to_transfer, to_shader]
}

/// Copy of a tightly packed buffer into mip 0 of the whole image.
pub fn pixel_copy_region(extent: vk::Extent2D) -> vk::BufferImageCopy {
    vk::BufferImageCopy::default()
        .buffer_offset(0)
        .buffer_row_length(0)
        .buffer_image_height(0)
        .image_subresource(
            vk::ImageSubresourceLayers::default()
                .aspect_mask(vk::ImageAspectFlags::COLOR)
                .mip_level(0)
                .base_array_layer(0)
                .layer_count(1),
        )
        .image_offset(vk::Offset3D { x: 0, y: 0, z: 0 })
        .image_extent(vk::Extent3D {
            width: extent.width,
            height: extent.height,
            depth: 1,
        })
}

/// Device-local image, its memory and a view for sampling.
pub struct Texture {
    device: Arc<Device>,
    image: vk::Image,
    /// Null until creation has got that far
    view: vk::ImageView,
    allocation: Option<Allocation>,
    extent: vk::Extent2D,
}

impl Texture {
    /// Uploads tightly packed RGBA8 `pixels` of size `extent`. Blocks until
    /// the image is ready to sample.
    ///
    /// # Errors
    ///
    /// [`RhiError::InvalidHandle`] if `pixels` does not match `extent`, or
    /// the Vulkan or allocator error. Nothing is leaked on failure.
    pub fn from_rgba8(device: Arc<Device>, extent: vk::Extent2D, pixels: &[u8]) -> RhiResult<Self> {
        let expected = rgba8_len(extent).filter(|&len| len > 0).ok_or_else(|| {
            RhiError::InvalidHandle(format!(
                "Invalid texture size {}x{}",
                extent.width, extent.height
            ))
        })?;
        if pixels.len() != expected {
            return Err(RhiError::InvalidHandle(format!(
                "Texture {}x{} needs {} bytes, got {}",
                extent.width,
                extent.height,
                expected,
                pixels.len()
            )));
        }

        let image_info = vk::ImageCreateInfo::default()
            .image_type(vk::ImageType::TYPE_2D)
            .format(TEXTURE_FORMAT)
            .extent(vk::Extent3D {
                width: extent.width,
                height: extent.height,
                depth: 1,
            })
            .mip_levels(1)
            .array_layers(1)
            .samples(vk::SampleCountFlags::TYPE_1)
            .tiling(vk::ImageTiling::OPTIMAL)
            .usage(vk::ImageUsageFlags::TRANSFER_DST | vk::ImageUsageFlags::SAMPLED)
            .sharing_mode(vk::SharingMode::EXCLUSIVE)
            .initial_layout(vk::ImageLayout::UNDEFINED);

        let image = unsafe { device.handle().create_image(&image_info, None)? };
        let requirements = unsafe { device.handle().get_image_memory_requirements(image) };

        let allocation = match memory::allocate(
            &device,
            "texture",
            requirements,
            MemoryLocation::GpuOnly,
            false,
        ) {
            Ok(allocation) => allocation,
            Err(e) => {
                unsafe { device.handle().destroy_image(image, None) };
                return Err(e);
            }
        };

        let allocation = memory::bind_or_release(
            allocation,
            |allocation| {
                unsafe {
                    device.handle().bind_image_memory(
                        image,
                        allocation.memory(),
                        allocation.offset(),
                    )?;
                }
                Ok(())
            },
            |allocation| {
                memory::free(&device, allocation, "texture");
                unsafe { device.handle().destroy_image(image, None) };
            },
        )?;

        // From here on Drop cleans up whatever exists
        let mut texture = Self {
            device: device.clone(),
            image,
            view: vk::ImageView::null(),
            allocation: Some(allocation),
            extent,
        };

        let view_info = vk::ImageViewCreateInfo::default()
            .image(image)
            .view_type(vk::ImageViewType::TYPE_2D)
            .format(TEXTURE_FORMAT)
            .components(vk::ComponentMapping::default())
            .subresource_range(color_subresource_range());
        texture.view = unsafe { device.handle().create_image_view(&view_info, None)? };

        let staging = Buffer::with_data(device.clone(), BufferUsage::Staging, pixels)?;
        let [to_transfer, to_shader] = upload_barriers(image);

        submit_one_time(&device, |cmd| {
            cmd.pipeline_barrier(
                vk::PipelineStageFlags::TOP_OF_PIPE,
                vk::PipelineStageFlags::TRANSFER,
                &[to_transfer],
            );
            cmd.copy_buffer_to_image(
                staging.handle(),
                image,
                vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                &[pixel_copy_region(extent)],
            );
            cmd.pipeline_barrier(
                vk::PipelineStageFlags::TRANSFER,
                vk::PipelineStageFlags::FRAGMENT_SHADER,
                &[to_shader],
            );
        })?;

        info!("Texture uploaded ({}x{})", extent.width, extent.height);
        Ok(texture)
    }

    #[inline]
    pub fn view(&self) -> vk::ImageView {
        self.view
    }

    #[inline]
    pub fn extent(&self) -> vk::Extent2D {
        self.extent
    }
}

impl Drop for Texture {
    fn drop(&mut self) {
        unsafe {
            self.device.handle().destroy_image_view(self.view, None);
        }

        if let Some(allocation) = self.allocation.take() {
            memory::free(&self.device, allocation, "texture");
        }

        unsafe {
            self.device.handle().destroy_image(self.image, None);
        }

        debug!("Destroyed texture");
    }
}
