//! Swap chain management.
//!
//! The [`Swapchain`] owns the presentable image chain for one surface and
//! rebuilds it on demand. Negotiation is done by pure functions over the
//! surface's reported support, in this order:
//!
//! 1. image count: `minImageCount + 1`, clamped to `maxImageCount` when that is non-zero
//! 2. extent: `currentExtent`, or the window size clamped to the surface
//!    limits when the surface reports the `0xFFFFFFFF` sentinel
//! 3. format: `R8G8B8A8_UNORM` / `SRGB_NONLINEAR`, else the first offered format
//! 4. present mode: MAILBOX when preferred and offered, else FIFO; neither is fatal
//! 5. usage: `COLOR_ATTACHMENT | TRANSFER_DST`; missing `TRANSFER_DST` is fatal
//! 6. transform: IDENTITY when supported, else the current transform
//! 7. sharing: always EXCLUSIVE; cross-family use goes through ownership barriers
//!
//! A zero-area extent (minimized window) is not an error: the rebuild succeeds
//! and leaves the swap chain without images until the next rebuild.

use std::sync::Arc;

use ash::prelude::VkResult;
use ash::vk;
use tracing::{debug, info, warn};

use crate::device::Device;
use crate::error::{RhiError, RhiResult};
use crate::instance::Instance;

/// Format used when the surface accepts anything or offers it explicitly.
pub const PREFERRED_SURFACE_FORMAT: vk::SurfaceFormatKHR = vk::SurfaceFormatKHR {
    format: vk::Format::R8G8B8A8_UNORM,
    color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
};

/// Usage every swap chain image is created with.
pub const REQUIRED_IMAGE_USAGE: vk::ImageUsageFlags = vk::ImageUsageFlags::from_raw(
    vk::ImageUsageFlags::COLOR_ATTACHMENT.as_raw() | vk::ImageUsageFlags::TRANSFER_DST.as_raw(),
);

/// Surface support queried fresh on every rebuild.
#[derive(Debug, Clone)]
pub struct SwapchainSupportDetails {
    pub capabilities: vk::SurfaceCapabilitiesKHR,
    pub formats: Vec<vk::SurfaceFormatKHR>,
    pub present_modes: Vec<vk::PresentModeKHR>,
}

impl SwapchainSupportDetails {
    /// Queries capabilities, formats and present modes. Any failure is fatal
    /// for the rebuild.
    pub fn query(
        physical_device: vk::PhysicalDevice,
        surface: vk::SurfaceKHR,
        surface_loader: &ash::khr::surface::Instance,
    ) -> RhiResult<Self> {
        let capabilities = unsafe {
            surface_loader.get_physical_device_surface_capabilities(physical_device, surface)?
        };

        let formats = unsafe {
            surface_loader.get_physical_device_surface_formats(physical_device, surface)?
        };

        let present_modes = unsafe {
            surface_loader.get_physical_device_surface_present_modes(physical_device, surface)?
        };

        debug!(
            "Swapchain support: {} formats, {} present modes, image count: {}-{}",
            formats.len(),
            present_modes.len(),
            capabilities.min_image_count,
            if capabilities.max_image_count == 0 {
                "unlimited".to_string()
            } else {
                capabilities.max_image_count.to_string()
            }
        );

        Ok(Self {
            capabilities,
            formats,
            present_modes,
        })
    }
}

/// Parameters negotiated for one swap chain instance.
#[derive(Debug, Clone, Copy)]
pub struct SwapchainConfig {
    pub image_count: u32,
    pub surface_format: vk::SurfaceFormatKHR,
    pub extent: vk::Extent2D,
    pub present_mode: vk::PresentModeKHR,
    pub image_usage: vk::ImageUsageFlags,
    pub pre_transform: vk::SurfaceTransformFlagsKHR,
    pub composite_alpha: vk::CompositeAlphaFlagsKHR,
}

/// Applies the negotiation policy.
///
/// Returns `Ok(None)` when the resulting extent has zero area.
///
/// # Errors
///
/// [`RhiError::UnsupportedPresentMode`] without MAILBOX or FIFO,
/// [`RhiError::UnsupportedImageUsage`] without `TRANSFER_DST`, and
/// `ERROR_FORMAT_NOT_SUPPORTED` when the surface offers no format.
pub fn negotiate(
    support: &SwapchainSupportDetails,
    window_extent: vk::Extent2D,
    prefer_mailbox: bool,
) -> RhiResult<Option<SwapchainConfig>> {
    let capabilities = &support.capabilities;

    let extent = choose_extent(capabilities, window_extent);
    if extent.width == 0 || extent.height == 0 {
        debug!(
            "Surface extent is {}x{}, no swapchain images will be created",
            extent.width, extent.height
        );
        return Ok(None);
    }

    let surface_format = choose_surface_format(&support.formats)
        .ok_or(RhiError::VulkanError(vk::Result::ERROR_FORMAT_NOT_SUPPORTED))?;

    let present_mode = choose_present_mode(&support.present_modes, prefer_mailbox).ok_or_else(
        || RhiError::UnsupportedPresentMode {
            offered: support.present_modes.clone(),
        },
    )?;

    let image_usage = choose_image_usage(capabilities.supported_usage_flags)?;

    Ok(Some(SwapchainConfig {
        image_count: determine_image_count(capabilities),
        surface_format,
        extent,
        present_mode,
        image_usage,
        pre_transform: choose_transform(capabilities),
        composite_alpha: choose_composite_alpha(capabilities.supported_composite_alpha),
    }))
}

/// One more than the minimum, clamped to the maximum when it is non-zero.
pub fn determine_image_count(capabilities: &vk::SurfaceCapabilitiesKHR) -> u32 {
    let preferred = capabilities.min_image_count.saturating_add(1);

    if capabilities.max_image_count > 0 {
        preferred.min(capabilities.max_image_count)
    } else {
        preferred
    }
}

/// Uses `currentExtent` unless the surface defers to the window size.
///
/// A zero-area window yields a zero extent even when the surface minimum is
/// larger, so a minimized window never gets a chain.
pub fn choose_extent(
    capabilities: &vk::SurfaceCapabilitiesKHR,
    window_extent: vk::Extent2D,
) -> vk::Extent2D {
    if capabilities.current_extent.width != u32::MAX {
        return capabilities.current_extent;
    }

    if window_extent.width == 0 || window_extent.height == 0 {
        return vk::Extent2D::default();
    }

    vk::Extent2D {
        width: window_extent.width.clamp(
            capabilities.min_image_extent.width,
            capabilities.max_image_extent.width,
        ),
        height: window_extent.height.clamp(
            capabilities.min_image_extent.height,
            capabilities.max_image_extent.height,
        ),
    }
}

/// A single `UNDEFINED` entry means any format is fine.
pub fn choose_surface_format(formats: &[vk::SurfaceFormatKHR]) -> Option<vk::SurfaceFormatKHR> {
    if let [only] = formats
        && only.format == vk::Format::UNDEFINED
    {
        return Some(PREFERRED_SURFACE_FORMAT);
    }

    formats
        .iter()
        .find(|f| {
            f.format == PREFERRED_SURFACE_FORMAT.format
                && f.color_space == PREFERRED_SURFACE_FORMAT.color_space
        })
        .or_else(|| formats.first())
        .copied()
}

/// MAILBOX when preferred and offered, otherwise FIFO. Returns `None` when
/// neither is offered.
pub fn choose_present_mode(
    present_modes: &[vk::PresentModeKHR],
    prefer_mailbox: bool,
) -> Option<vk::PresentModeKHR> {
    let mailbox = present_modes.contains(&vk::PresentModeKHR::MAILBOX);
    let fifo = present_modes.contains(&vk::PresentModeKHR::FIFO);

    if prefer_mailbox && mailbox {
        Some(vk::PresentModeKHR::MAILBOX)
    } else if fifo {
        Some(vk::PresentModeKHR::FIFO)
    } else if mailbox {
        Some(vk::PresentModeKHR::MAILBOX)
    } else {
        None
    }
}

/// Returns [`REQUIRED_IMAGE_USAGE`] if the surface supports it.
pub fn choose_image_usage(supported: vk::ImageUsageFlags) -> RhiResult<vk::ImageUsageFlags> {
    if supported.contains(REQUIRED_IMAGE_USAGE) {
        return Ok(REQUIRED_IMAGE_USAGE);
    }

    let supported = describe_image_usage(supported);
    warn!("Swapchain images lack TRANSFER_DST usage. Supported usages: {supported}");
    Err(RhiError::UnsupportedImageUsage { supported })
}

/// Lists the image usages in `flags` by name.
pub fn describe_image_usage(flags: vk::ImageUsageFlags) -> String {
    const NAMES: [(vk::ImageUsageFlags, &str); 8] = [
        (vk::ImageUsageFlags::TRANSFER_SRC, "TRANSFER_SRC"),
        (vk::ImageUsageFlags::TRANSFER_DST, "TRANSFER_DST"),
        (vk::ImageUsageFlags::SAMPLED, "SAMPLED"),
        (vk::ImageUsageFlags::STORAGE, "STORAGE"),
        (vk::ImageUsageFlags::COLOR_ATTACHMENT, "COLOR_ATTACHMENT"),
        (
            vk::ImageUsageFlags::DEPTH_STENCIL_ATTACHMENT,
            "DEPTH_STENCIL_ATTACHMENT",
        ),
        (vk::ImageUsageFlags::TRANSIENT_ATTACHMENT, "TRANSIENT_ATTACHMENT"),
        (vk::ImageUsageFlags::INPUT_ATTACHMENT, "INPUT_ATTACHMENT"),
    ];

    let names: Vec<&str> = NAMES
        .iter()
        .filter(|(flag, _)| flags.contains(*flag))
        .map(|(_, name)| *name)
        .collect();

    if names.is_empty() {
        "none".to_owned()
    } else {
        names.join(", ")
    }
}

/// IDENTITY when supported, otherwise whatever the surface currently uses.
pub fn choose_transform(capabilities: &vk::SurfaceCapabilitiesKHR) -> vk::SurfaceTransformFlagsKHR {
    if capabilities
        .supported_transforms
        .contains(vk::SurfaceTransformFlagsKHR::IDENTITY)
    {
        vk::SurfaceTransformFlagsKHR::IDENTITY
    } else {
        capabilities.current_transform
    }
}

/// OPAQUE when supported, otherwise the lowest supported bit.
pub fn choose_composite_alpha(supported: vk::CompositeAlphaFlagsKHR) -> vk::CompositeAlphaFlagsKHR {
    if supported.contains(vk::CompositeAlphaFlagsKHR::OPAQUE) || supported.is_empty() {
        return vk::CompositeAlphaFlagsKHR::OPAQUE;
    }
    let raw = supported.as_raw();
    vk::CompositeAlphaFlagsKHR::from_raw(raw & raw.wrapping_neg())
}

/// Result of asking for the next presentable image.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AcquireOutcome {
    /// An image was handed over. `suboptimal` images are still rendered.
    Ready { image_index: u32, suboptimal: bool },
    /// The chain no longer matches the surface and must be rebuilt.
    OutOfDate,
}

/// Result of a presentation request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PresentOutcome {
    Presented,
    /// Presented, but the chain should be rebuilt
    Suboptimal,
    /// Not presented; the chain must be rebuilt
    OutOfDate,
}

impl PresentOutcome {
    /// Whether the swap chain has to be rebuilt before the next frame.
    pub fn is_stale(self) -> bool {
        !matches!(self, Self::Presented)
    }
}

/// Maps the raw acquire result onto [`AcquireOutcome`].
pub fn classify_acquire(result: VkResult<(u32, bool)>) -> RhiResult<AcquireOutcome> {
    match result {
        Ok((image_index, suboptimal)) => Ok(AcquireOutcome::Ready {
            image_index,
            suboptimal,
        }),
        Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => Ok(AcquireOutcome::OutOfDate),
        Err(vk::Result::TIMEOUT | vk::Result::NOT_READY) => {
            Err(RhiError::Timeout("swapchain image"))
        }
        Err(e) => Err(e.into()),
    }
}

/// Maps the raw present result onto [`PresentOutcome`].
pub fn classify_present(result: VkResult<bool>) -> RhiResult<PresentOutcome> {
    match result {
        Ok(false) => Ok(PresentOutcome::Presented),
        Ok(true) => Ok(PresentOutcome::Suboptimal),
        Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => Ok(PresentOutcome::OutOfDate),
        Err(e) => Err(e.into()),
    }
}

/// The presentable image chain of one surface.
///
/// Not thread-safe; owned by the frame loop.
pub struct Swapchain {
    device: Arc<Device>,
    swapchain_loader: ash::khr::swapchain::Device,
    surface_loader: ash::khr::surface::Instance,
    surface: vk::SurfaceKHR,
    prefer_mailbox: bool,
    /// Null while the surface has zero area
    swapchain: vk::SwapchainKHR,
    images: Vec<vk::Image>,
    image_views: Vec<vk::ImageView>,
    surface_format: vk::SurfaceFormatKHR,
    extent: vk::Extent2D,
    present_mode: vk::PresentModeKHR,
    /// Bumped every time a new chain handle is created
    generation: u64,
}

impl Swapchain {
    /// Creates the swap chain manager and builds the first chain.
    ///
    /// `surface` must outlive the returned value.
    pub fn new(
        instance: &Instance,
        device: Arc<Device>,
        surface: vk::SurfaceKHR,
        surface_loader: &ash::khr::surface::Instance,
        window_extent: vk::Extent2D,
        prefer_mailbox: bool,
    ) -> RhiResult<Self> {
        let swapchain_loader = ash::khr::swapchain::Device::new(instance.handle(), device.handle());

        let mut swapchain = Self {
            device,
            swapchain_loader,
            surface_loader: surface_loader.clone(),
            surface,
            prefer_mailbox,
            swapchain: vk::SwapchainKHR::null(),
            images: Vec::new(),
            image_views: Vec::new(),
            surface_format: PREFERRED_SURFACE_FORMAT,
            extent: vk::Extent2D::default(),
            present_mode: vk::PresentModeKHR::FIFO,
            generation: 0,
        };
        swapchain.rebuild(window_extent)?;
        Ok(swapchain)
    }

    /// Rebuilds the chain for the current surface state.
    ///
    /// Waits for the device to go idle, re-queries surface support, creates
    /// the new chain with the previous handle as `oldSwapchain`, and only then
    /// destroys the previous handle and its views. Returns whether the new
    /// chain has images; `false` means the surface has zero area.
    pub fn rebuild(&mut self, window_extent: vk::Extent2D) -> RhiResult<bool> {
        self.device.wait_idle()?;

        let support = SwapchainSupportDetails::query(
            self.device.physical_device(),
            self.surface,
            &self.surface_loader,
        )?;

        let Some(config) = negotiate(&support, window_extent, self.prefer_mailbox)? else {
            self.destroy_chain();
            self.extent = vk::Extent2D::default();
            info!("Swapchain emptied: surface has zero area");
            return Ok(false);
        };

        info!(
            "Creating swapchain: {}x{}, format {:?}, color space {:?}, present mode {:?}, {} images",
            config.extent.width,
            config.extent.height,
            config.surface_format.format,
            config.surface_format.color_space,
            config.present_mode,
            config.image_count
        );

        let old_swapchain = self.swapchain;
        let create_info = vk::SwapchainCreateInfoKHR::default()
            .surface(self.surface)
            .min_image_count(config.image_count)
            .image_format(config.surface_format.format)
            .image_color_space(config.surface_format.color_space)
            .image_extent(config.extent)
            .image_array_layers(1)
            .image_usage(config.image_usage)
            .image_sharing_mode(vk::SharingMode::EXCLUSIVE)
            .pre_transform(config.pre_transform)
            .composite_alpha(config.composite_alpha)
            .present_mode(config.present_mode)
            .clipped(true)
            .old_swapchain(old_swapchain);

        let new_swapchain = unsafe { self.swapchain_loader.create_swapchain(&create_info, None)? };

        let images = match unsafe { self.swapchain_loader.get_swapchain_images(new_swapchain) } {
            Ok(images) => images,
            Err(e) => {
                unsafe { self.swapchain_loader.destroy_swapchain(new_swapchain, None) };
                return Err(e.into());
            }
        };

        // The new chain is live; the old one can go.
        self.destroy_chain();
        self.swapchain = new_swapchain;
        self.images = images;
        self.surface_format = config.surface_format;
        self.extent = config.extent;
        self.present_mode = config.present_mode;
        self.generation += 1;

        self.image_views =
            create_image_views(&self.device, &self.images, self.surface_format.format)?;

        info!(
            "Swapchain generation {} created with {} images",
            self.generation,
            self.images.len()
        );

        Ok(true)
    }

    /// Asks for the next image, signaling `semaphore` when it is ready.
    pub fn acquire_next_image(
        &self,
        semaphore: vk::Semaphore,
        timeout_ns: u64,
    ) -> RhiResult<AcquireOutcome> {
        if !self.has_images() {
            return Err(RhiError::InvalidHandle(
                "acquire on a swapchain without images".to_owned(),
            ));
        }

        classify_acquire(unsafe {
            self.swapchain_loader.acquire_next_image(
                self.swapchain,
                timeout_ns,
                semaphore,
                vk::Fence::null(),
            )
        })
    }

    /// Queues `image_index` for presentation once `wait_semaphore` signals.
    pub fn present(
        &self,
        queue: vk::Queue,
        image_index: u32,
        wait_semaphore: vk::Semaphore,
    ) -> RhiResult<PresentOutcome> {
        let swapchains = [self.swapchain];
        let image_indices = [image_index];
        let wait_semaphores = [wait_semaphore];

        let present_info = vk::PresentInfoKHR::default()
            .wait_semaphores(&wait_semaphores)
            .swapchains(&swapchains)
            .image_indices(&image_indices);

        classify_present(unsafe { self.swapchain_loader.queue_present(queue, &present_info) })
    }

    /// Returns the swapchain handle. Null while there are no images.
    #[inline]
    pub fn handle(&self) -> vk::SwapchainKHR {
        self.swapchain
    }

    /// Whether the current chain has presentable images.
    #[inline]
    pub fn has_images(&self) -> bool {
        !self.images.is_empty()
    }

    /// Counts chain handles created so far.
    #[inline]
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Returns the swapchain image format.
    #[inline]
    pub fn format(&self) -> vk::Format {
        self.surface_format.format
    }

    /// Returns the swapchain extent. Zero while there are no images.
    #[inline]
    pub fn extent(&self) -> vk::Extent2D {
        self.extent
    }

    /// Returns the present mode.
    #[inline]
    pub fn present_mode(&self) -> vk::PresentModeKHR {
        self.present_mode
    }

    /// Returns the number of swapchain images.
    #[inline]
    pub fn image_count(&self) -> u32 {
        self.images.len() as u32
    }

    /// Returns the swapchain image at the given index.
    ///
    /// # Panics
    ///
    /// Panics if `index` is out of bounds.
    #[inline]
    pub fn image(&self, index: usize) -> vk::Image {
        self.images[index]
    }

    /// Returns the image view at the given index.
    ///
    /// # Panics
    ///
    /// Panics if `index` is out of bounds.
    #[inline]
    pub fn image_view(&self, index: usize) -> vk::ImageView {
        self.image_views[index]
    }

    /// Destroys the views and the chain handle, if any.
    fn destroy_chain(&mut self) {
        for &image_view in &self.image_views {
            unsafe {
                self.device.handle().destroy_image_view(image_view, None);
            }
        }
        self.image_views.clear();
        self.images.clear();

        if self.swapchain != vk::SwapchainKHR::null() {
            unsafe {
                self.swapchain_loader
                    .destroy_swapchain(self.swapchain, None);
            }
            debug!("Swapchain generation {} destroyed", self.generation);
            self.swapchain = vk::SwapchainKHR::null();
        }
    }
}

impl Drop for Swapchain {
    fn drop(&mut self) {
        self.destroy_chain();
    }
}

/// Creates one 2D color view per image, destroying the partial set on failure.
fn create_image_views(
    device: &Device,
    images: &[vk::Image],
    format: vk::Format,
) -> RhiResult<Vec<vk::ImageView>> {
    let mut image_views = Vec::with_capacity(images.len());

    for &image in images {
        let create_info = vk::ImageViewCreateInfo::default()
            .image(image)
            .view_type(vk::ImageViewType::TYPE_2D)
            .format(format)
            .components(vk::ComponentMapping::default())
            .subresource_range(color_subresource_range());

        match unsafe { device.handle().create_image_view(&create_info, None) } {
            Ok(view) => image_views.push(view),
            Err(e) => {
                for view in image_views {
                    unsafe { device.handle().destroy_image_view(view, None) };
                }
                return Err(e.into());
            }
        }
    }

    debug!("Created {} image views", image_views.len());
    Ok(image_views)
}

/// The single mip level and layer of a swap chain color image.
pub fn color_subresource_range() -> vk::ImageSubresourceRange {
    vk::ImageSubresourceRange::default()
        .aspect_mask(vk::ImageAspectFlags::COLOR)
        .base_mip_level(0)
        .level_count(1)
        .base_array_layer(0)
        .layer_count(1)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn extent(width: u32, height: u32) -> vk::Extent2D {
        vk::Extent2D { width, height }
    }

    fn capabilities() -> vk::SurfaceCapabilitiesKHR {
        vk::SurfaceCapabilitiesKHR {
            min_image_count: 2,
            max_image_count: 8,
            current_extent: extent(800, 600),
            min_image_extent: extent(1, 1),
            max_image_extent: extent(4096, 4096),
            supported_transforms: vk::SurfaceTransformFlagsKHR::IDENTITY,
            current_transform: vk::SurfaceTransformFlagsKHR::IDENTITY,
            supported_composite_alpha: vk::CompositeAlphaFlagsKHR::OPAQUE,
            supported_usage_flags: vk::ImageUsageFlags::COLOR_ATTACHMENT
                | vk::ImageUsageFlags::TRANSFER_DST
                | vk::ImageUsageFlags::TRANSFER_SRC,
            ..Default::default()
        }
    }

    fn support() -> SwapchainSupportDetails {
        SwapchainSupportDetails {
            capabilities: capabilities(),
            formats: vec![PREFERRED_SURFACE_FORMAT],
            present_modes: vec![vk::PresentModeKHR::FIFO, vk::PresentModeKHR::MAILBOX],
        }
    }

    fn surface_format(format: vk::Format) -> vk::SurfaceFormatKHR {
        vk::SurfaceFormatKHR {
            format,
            color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
        }
    }

    #[test]
    fn test_image_count_unbounded() {
        let caps = vk::SurfaceCapabilitiesKHR {
            min_image_count: 1,
            max_image_count: 0,
            ..Default::default()
        };
        assert_eq!(determine_image_count(&caps), 2);
    }

    #[test]
    fn test_image_count_clamped_to_max() {
        let caps = vk::SurfaceCapabilitiesKHR {
            min_image_count: 2,
            max_image_count: 2,
            ..Default::default()
        };
        assert_eq!(determine_image_count(&caps), 2);
    }

    #[test]
    fn test_image_count_within_bounds() {
        for min in 1..6 {
            for max in [0, min, min + 1, min + 4] {
                let caps = vk::SurfaceCapabilitiesKHR {
                    min_image_count: min,
                    max_image_count: max,
                    ..Default::default()
                };
                let count = determine_image_count(&caps);
                if max > 0 {
                    assert!(count <= max);
                    assert!(count >= min);
                } else {
                    assert!(count >= min + 1);
                }
            }
        }
    }

    #[test]
    fn test_extent_uses_current() {
        let chosen = choose_extent(&capabilities(), extent(1920, 1080));
        assert_eq!((chosen.width, chosen.height), (800, 600));
    }

    #[test]
    fn test_extent_sentinel_clamps_window_size() {
        let caps = vk::SurfaceCapabilitiesKHR {
            current_extent: extent(u32::MAX, u32::MAX),
            min_image_extent: extent(100, 100),
            max_image_extent: extent(2000, 2000),
            ..Default::default()
        };

        let chosen = choose_extent(&caps, extent(3000, 50));
        assert_eq!((chosen.width, chosen.height), (2000, 100));

        let chosen = choose_extent(&caps, extent(800, 600));
        assert_eq!((chosen.width, chosen.height), (800, 600));
    }

    #[test]
    fn test_extent_sentinel_with_minimized_window() {
        let caps = vk::SurfaceCapabilitiesKHR {
            current_extent: extent(u32::MAX, u32::MAX),
            min_image_extent: extent(1, 1),
            max_image_extent: extent(2000, 2000),
            ..Default::default()
        };
        let chosen = choose_extent(&caps, extent(0, 0));
        assert_eq!((chosen.width, chosen.height), (0, 0));
    }

    #[test]
    fn test_surface_format_undefined_means_any() {
        let chosen = choose_surface_format(&[vk::SurfaceFormatKHR {
            format: vk::Format::UNDEFINED,
            color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
        }])
        .unwrap();
        assert_eq!(chosen.format, vk::Format::R8G8B8A8_UNORM);
        assert_eq!(chosen.color_space, vk::ColorSpaceKHR::SRGB_NONLINEAR);
    }

    #[test]
    fn test_surface_format_exact_match() {
        let formats = [
            surface_format(vk::Format::B8G8R8A8_SRGB),
            surface_format(vk::Format::R8G8B8A8_UNORM),
        ];
        let chosen = choose_surface_format(&formats).unwrap();
        assert_eq!(chosen.format, vk::Format::R8G8B8A8_UNORM);
    }

    #[test]
    fn test_surface_format_falls_back_to_first() {
        let formats = [
            surface_format(vk::Format::B8G8R8A8_UNORM),
            surface_format(vk::Format::B8G8R8A8_SRGB),
        ];
        let chosen = choose_surface_format(&formats).unwrap();
        assert_eq!(chosen.format, vk::Format::B8G8R8A8_UNORM);

        assert!(choose_surface_format(&[]).is_none());
    }

    #[test]
    fn test_present_mode_fifo_only() {
        let modes = [vk::PresentModeKHR::FIFO];
        assert_eq!(
            choose_present_mode(&modes, true),
            Some(vk::PresentModeKHR::FIFO)
        );
    }

    #[test]
    fn test_present_mode_prefers_mailbox() {
        let modes = [
            vk::PresentModeKHR::IMMEDIATE,
            vk::PresentModeKHR::FIFO,
            vk::PresentModeKHR::MAILBOX,
        ];
        assert_eq!(
            choose_present_mode(&modes, true),
            Some(vk::PresentModeKHR::MAILBOX)
        );
        assert_eq!(
            choose_present_mode(&modes, false),
            Some(vk::PresentModeKHR::FIFO)
        );
    }

    #[test]
    fn test_present_mode_never_fails_with_fifo() {
        let others = [
            vk::PresentModeKHR::IMMEDIATE,
            vk::PresentModeKHR::MAILBOX,
            vk::PresentModeKHR::FIFO_RELAXED,
        ];
        for mask in 0..8u32 {
            let mut modes = vec![vk::PresentModeKHR::FIFO];
            modes.extend(
                others
                    .iter()
                    .enumerate()
                    .filter(|(i, _)| mask & (1 << i) != 0)
                    .map(|(_, m)| *m),
            );
            assert!(choose_present_mode(&modes, true).is_some());
            assert!(choose_present_mode(&modes, false).is_some());
        }
    }

    #[test]
    fn test_present_mode_without_fifo_or_mailbox() {
        assert_eq!(choose_present_mode(&[], true), None);
        assert_eq!(
            choose_present_mode(
                &[vk::PresentModeKHR::IMMEDIATE, vk::PresentModeKHR::FIFO_RELAXED],
                true
            ),
            None
        );
    }

    #[test]
    fn test_image_usage_requires_transfer_dst() {
        let usage = choose_image_usage(
            vk::ImageUsageFlags::COLOR_ATTACHMENT | vk::ImageUsageFlags::TRANSFER_DST,
        )
        .unwrap();
        assert_eq!(usage, REQUIRED_IMAGE_USAGE);

        let err = choose_image_usage(
            vk::ImageUsageFlags::COLOR_ATTACHMENT | vk::ImageUsageFlags::SAMPLED,
        )
        .unwrap_err();
        match err {
            RhiError::UnsupportedImageUsage { supported } => {
                assert_eq!(supported, "SAMPLED, COLOR_ATTACHMENT");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_describe_image_usage() {
        assert_eq!(describe_image_usage(vk::ImageUsageFlags::empty()), "none");
        assert_eq!(
            describe_image_usage(
                vk::ImageUsageFlags::INPUT_ATTACHMENT | vk::ImageUsageFlags::TRANSFER_SRC
            ),
            "TRANSFER_SRC, INPUT_ATTACHMENT"
        );
    }

    #[test]
    fn test_transform_prefers_identity() {
        let mut caps = capabilities();
        caps.supported_transforms =
            vk::SurfaceTransformFlagsKHR::IDENTITY | vk::SurfaceTransformFlagsKHR::ROTATE_90;
        caps.current_transform = vk::SurfaceTransformFlagsKHR::ROTATE_90;
        assert_eq!(
            choose_transform(&caps),
            vk::SurfaceTransformFlagsKHR::IDENTITY
        );

        caps.supported_transforms = vk::SurfaceTransformFlagsKHR::ROTATE_90;
        assert_eq!(
            choose_transform(&caps),
            vk::SurfaceTransformFlagsKHR::ROTATE_90
        );
    }

    #[test]
    fn test_composite_alpha() {
        assert_eq!(
            choose_composite_alpha(
                vk::CompositeAlphaFlagsKHR::OPAQUE | vk::CompositeAlphaFlagsKHR::INHERIT
            ),
            vk::CompositeAlphaFlagsKHR::OPAQUE
        );
        assert_eq!(
            choose_composite_alpha(
                vk::CompositeAlphaFlagsKHR::INHERIT | vk::CompositeAlphaFlagsKHR::POST_MULTIPLIED
            ),
            vk::CompositeAlphaFlagsKHR::POST_MULTIPLIED
        );
    }

    #[test]
    fn test_negotiate_full_config() {
        let config = negotiate(&support(), extent(1024, 768), true)
            .unwrap()
            .unwrap();
        assert_eq!(config.image_count, 3);
        assert_eq!(config.surface_format.format, vk::Format::R8G8B8A8_UNORM);
        assert_eq!((config.extent.width, config.extent.height), (800, 600));
        assert_eq!(config.present_mode, vk::PresentModeKHR::MAILBOX);
        assert_eq!(config.image_usage, REQUIRED_IMAGE_USAGE);
        assert_eq!(config.pre_transform, vk::SurfaceTransformFlagsKHR::IDENTITY);
        assert_eq!(config.composite_alpha, vk::CompositeAlphaFlagsKHR::OPAQUE);
    }

    #[test]
    fn test_negotiate_zero_extent_is_not_an_error() {
        let mut support = support();
        support.capabilities.current_extent = extent(0, 0);
        assert!(negotiate(&support, extent(800, 600), true).unwrap().is_none());

        // Zero area wins even over otherwise fatal support gaps
        support.present_modes.clear();
        assert!(negotiate(&support, extent(800, 600), true).unwrap().is_none());
    }

    #[test]
    fn test_negotiate_fatal_without_present_mode() {
        let mut support = support();
        support.present_modes = vec![vk::PresentModeKHR::IMMEDIATE];
        let err = negotiate(&support, extent(800, 600), true).unwrap_err();
        assert!(matches!(err, RhiError::UnsupportedPresentMode { .. }));
    }

    #[test]
    fn test_negotiate_fatal_without_formats() {
        let mut support = support();
        support.formats.clear();
        let err = negotiate(&support, extent(800, 600), true).unwrap_err();
        assert!(matches!(
            err,
            RhiError::VulkanError(vk::Result::ERROR_FORMAT_NOT_SUPPORTED)
        ));
    }

    #[test]
    fn test_classify_acquire() {
        assert_eq!(
            classify_acquire(Ok((2, false))).unwrap(),
            AcquireOutcome::Ready {
                image_index: 2,
                suboptimal: false
            }
        );
        assert_eq!(
            classify_acquire(Ok((0, true))).unwrap(),
            AcquireOutcome::Ready {
                image_index: 0,
                suboptimal: true
            }
        );
        assert_eq!(
            classify_acquire(Err(vk::Result::ERROR_OUT_OF_DATE_KHR)).unwrap(),
            AcquireOutcome::OutOfDate
        );
        assert!(matches!(
            classify_acquire(Err(vk::Result::TIMEOUT)),
            Err(RhiError::Timeout(_))
        ));
        assert!(matches!(
            classify_acquire(Err(vk::Result::ERROR_SURFACE_LOST_KHR)),
            Err(RhiError::VulkanError(vk::Result::ERROR_SURFACE_LOST_KHR))
        ));
    }

    #[test]
    fn test_classify_present() {
        assert_eq!(classify_present(Ok(false)).unwrap(), PresentOutcome::Presented);
        assert_eq!(classify_present(Ok(true)).unwrap(), PresentOutcome::Suboptimal);
        assert_eq!(
            classify_present(Err(vk::Result::ERROR_OUT_OF_DATE_KHR)).unwrap(),
            PresentOutcome::OutOfDate
        );
        assert!(classify_present(Err(vk::Result::ERROR_DEVICE_LOST)).is_err());

        assert!(!PresentOutcome::Presented.is_stale());
        assert!(PresentOutcome::Suboptimal.is_stale());
        assert!(PresentOutcome::OutOfDate.is_stale());
    }
}
