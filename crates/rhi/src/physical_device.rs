//! Physical device (GPU) selection.
//!
//! Selection is split in two:
//! 1. Enumeration turns every GPU into a plain-data [`DeviceCandidate`].
//! 2. [`rank_candidates`] filters and orders the candidates without touching
//!    Vulkan, so the policy can be tested on hand-built data.
//!
//! A candidate is usable when it supports `VK_KHR_swapchain`, reports API
//! major version 1 or later, allows 2D images of at least
//! [`MIN_IMAGE_DIMENSION_2D`] texels, and exposes a graphics family and a
//! present family (see [`select_queue_families`]).

use std::ffi::CStr;

use ash::vk;
use tracing::{debug, info, warn};

use crate::error::{RhiError, RhiResult};

/// Minimum `maxImageDimension2D` a device must support.
pub const MIN_IMAGE_DIMENSION_2D: u32 = 4096;

/// Queue families chosen for the logical device.
///
/// Fixed once the device is created. When the two indices differ, images
/// moving between queues need ownership-transfer barriers.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct QueueFamilyIndices {
    /// Family the command buffers are submitted to.
    pub graphics_family: u32,
    /// Family presentation requests go to.
    pub present_family: u32,
}

impl QueueFamilyIndices {
    /// Whether a single family serves both graphics and presentation.
    #[inline]
    pub fn is_shared(&self) -> bool {
        self.graphics_family == self.present_family
    }

    /// Distinct family indices, one queue is created per entry.
    pub fn unique_families(&self) -> Vec<u32> {
        if self.is_shared() {
            vec![self.graphics_family]
        } else {
            vec![self.graphics_family, self.present_family]
        }
    }
}

/// One queue family as seen by the selection policy.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct QueueFamilyCandidate {
    pub queue_count: u32,
    pub graphics: bool,
    pub present: bool,
}

/// Picks graphics and present families.
///
/// The first family with queues that does both wins. Otherwise the first
/// graphics family is paired with the first present family.
pub fn select_queue_families(families: &[QueueFamilyCandidate]) -> Option<QueueFamilyIndices> {
    let usable = || {
        families
            .iter()
            .enumerate()
            .filter(|(_, family)| family.queue_count > 0)
            .map(|(i, family)| (i as u32, family))
    };

    if let Some((index, _)) = usable().find(|(_, f)| f.graphics && f.present) {
        return Some(QueueFamilyIndices {
            graphics_family: index,
            present_family: index,
        });
    }

    let graphics_family = usable().find(|(_, f)| f.graphics)?.0;
    let present_family = usable().find(|(_, f)| f.present)?.0;
    Some(QueueFamilyIndices {
        graphics_family,
        present_family,
    })
}

/// Everything the selection policy needs to know about one GPU.
#[derive(Clone, Debug)]
pub struct DeviceCandidate {
    pub name: String,
    pub device_type: vk::PhysicalDeviceType,
    pub api_version: u32,
    pub max_image_dimension_2d: u32,
    pub supports_swapchain: bool,
    pub queue_families: Vec<QueueFamilyCandidate>,
}

/// Why a candidate was rejected.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Rejection {
    MissingSwapchainExtension,
    ApiVersionTooOld,
    ImageDimensionTooSmall,
    NoQueueFamilies,
}

impl DeviceCandidate {
    /// Checks the hard requirements and returns the queue families to use.
    pub fn evaluate(&self) -> Result<QueueFamilyIndices, Rejection> {
        if !self.supports_swapchain {
            return Err(Rejection::MissingSwapchainExtension);
        }
        if vk::api_version_major(self.api_version) < 1 {
            return Err(Rejection::ApiVersionTooOld);
        }
        if self.max_image_dimension_2d < MIN_IMAGE_DIMENSION_2D {
            return Err(Rejection::ImageDimensionTooSmall);
        }
        select_queue_families(&self.queue_families).ok_or(Rejection::NoQueueFamilies)
    }

    fn score(&self, families: &QueueFamilyIndices) -> u64 {
        let type_score: u64 = match self.device_type {
            vk::PhysicalDeviceType::DISCRETE_GPU => 4,
            vk::PhysicalDeviceType::INTEGRATED_GPU => 3,
            vk::PhysicalDeviceType::VIRTUAL_GPU => 2,
            vk::PhysicalDeviceType::CPU => 1,
            _ => 0,
        };
        // Device type dominates, then a shared family, then image size.
        (type_score << 40)
            | (u64::from(families.is_shared()) << 32)
            | u64::from(self.max_image_dimension_2d)
    }
}

/// Filters out unusable candidates and orders the rest best-first.
///
/// Returns `(candidate index, queue families)` pairs. Ties keep enumeration
/// order.
pub fn rank_candidates(candidates: &[DeviceCandidate]) -> Vec<(usize, QueueFamilyIndices)> {
    let mut ranked: Vec<(usize, QueueFamilyIndices, u64)> = candidates
        .iter()
        .enumerate()
        .filter_map(|(i, candidate)| match candidate.evaluate() {
            Ok(families) => Some((i, families, candidate.score(&families))),
            Err(reason) => {
                debug!("GPU '{}' skipped: {:?}", candidate.name, reason);
                None
            }
        })
        .collect();

    ranked.sort_by(|a, b| b.2.cmp(&a.2));
    ranked
        .into_iter()
        .map(|(i, families, _)| (i, families))
        .collect()
}

/// The GPU chosen for rendering.
#[derive(Clone)]
pub struct PhysicalDeviceInfo {
    /// Vulkan physical device handle.
    pub device: vk::PhysicalDevice,
    /// Device properties (name, limits, API version).
    pub properties: vk::PhysicalDeviceProperties,
    /// Queue families for graphics and presentation.
    pub queue_families: QueueFamilyIndices,
}

impl PhysicalDeviceInfo {
    /// Returns the device name as a string.
    pub fn device_name(&self) -> String {
        device_name(&self.properties)
    }

    /// Returns the Vulkan API version supported by the device.
    pub fn api_version(&self) -> (u32, u32, u32) {
        let version = self.properties.api_version;
        (
            vk::api_version_major(version),
            vk::api_version_minor(version),
            vk::api_version_patch(version),
        )
    }
}

impl std::fmt::Debug for PhysicalDeviceInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let (major, minor, patch) = self.api_version();
        f.debug_struct("PhysicalDeviceInfo")
            .field("name", &self.device_name())
            .field("type", &self.properties.device_type)
            .field("api_version", &format!("{major}.{minor}.{patch}"))
            .field("queue_families", &self.queue_families)
            .finish()
    }
}

fn device_name(properties: &vk::PhysicalDeviceProperties) -> String {
    // SAFETY: device_name is a nul-terminated fixed-size array filled by the driver.
    unsafe { CStr::from_ptr(properties.device_name.as_ptr()) }
        .to_string_lossy()
        .into_owned()
}

/// Enumerates GPUs and selects the best one able to present to `surface`.
///
/// # Errors
///
/// Query failures are propagated; [`RhiError::NoSuitableGpu`] if no GPU
/// passes the requirements.
pub fn select_physical_device(
    instance: &ash::Instance,
    surface: vk::SurfaceKHR,
    surface_loader: &ash::khr::surface::Instance,
) -> RhiResult<PhysicalDeviceInfo> {
    let devices = unsafe { instance.enumerate_physical_devices()? };

    if devices.is_empty() {
        warn!("No Vulkan-capable GPUs found");
        return Err(RhiError::NoSuitableGpu);
    }

    info!("Found {} GPU(s)", devices.len());

    let mut candidates = Vec::with_capacity(devices.len());
    for &device in &devices {
        candidates.push(describe_device(instance, device, surface, surface_loader)?);
    }

    let ranked = rank_candidates(&candidates);
    let Some(&(index, queue_families)) = ranked.first() else {
        warn!("No GPU supports swapchain presentation to this surface");
        return Err(RhiError::NoSuitableGpu);
    };

    let device = devices[index];
    let properties = unsafe { instance.get_physical_device_properties(device) };
    let selected = PhysicalDeviceInfo {
        device,
        properties,
        queue_families,
    };

    let (major, minor, patch) = selected.api_version();
    info!(
        "Selected GPU: '{}' ({:?}) - Vulkan {}.{}.{}, graphics family {}, present family {}",
        selected.device_name(),
        properties.device_type,
        major,
        minor,
        patch,
        queue_families.graphics_family,
        queue_families.present_family
    );

    Ok(selected)
}

fn describe_device(
    instance: &ash::Instance,
    device: vk::PhysicalDevice,
    surface: vk::SurfaceKHR,
    surface_loader: &ash::khr::surface::Instance,
) -> RhiResult<DeviceCandidate> {
    let properties = unsafe { instance.get_physical_device_properties(device) };
    let extensions = unsafe { instance.enumerate_device_extension_properties(device)? };
    let supports_swapchain = extensions.iter().any(|ext| {
        // SAFETY: extension_name is a nul-terminated fixed-size array.
        let name = unsafe { CStr::from_ptr(ext.extension_name.as_ptr()) };
        name == ash::khr::swapchain::NAME
    });

    let family_properties =
        unsafe { instance.get_physical_device_queue_family_properties(device) };
    let mut queue_families = Vec::with_capacity(family_properties.len());
    for (i, family) in family_properties.iter().enumerate() {
        let present = unsafe {
            surface_loader.get_physical_device_surface_support(device, i as u32, surface)?
        };
        queue_families.push(QueueFamilyCandidate {
            queue_count: family.queue_count,
            graphics: family.queue_flags.contains(vk::QueueFlags::GRAPHICS),
            present,
        });
    }

    Ok(DeviceCandidate {
        name: device_name(&properties),
        device_type: properties.device_type,
        api_version: properties.api_version,
        max_image_dimension_2d: properties.limits.max_image_dimension2_d,
        supports_swapchain,
        queue_families,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn family(queue_count: u32, graphics: bool, present: bool) -> QueueFamilyCandidate {
        QueueFamilyCandidate {
            queue_count,
            graphics,
            present,
        }
    }

    fn candidate(name: &str, device_type: vk::PhysicalDeviceType) -> DeviceCandidate {
        DeviceCandidate {
            name: name.to_owned(),
            device_type,
            api_version: vk::make_api_version(0, 1, 2, 0),
            max_image_dimension_2d: 16384,
            supports_swapchain: true,
            queue_families: vec![family(1, true, true)],
        }
    }

    #[test]
    fn test_prefers_family_with_graphics_and_present() {
        let families = [
            family(1, true, false),
            family(1, false, true),
            family(4, true, true),
        ];
        let indices = select_queue_families(&families).unwrap();
        assert_eq!(indices.graphics_family, 2);
        assert_eq!(indices.present_family, 2);
        assert!(indices.is_shared());
        assert_eq!(indices.unique_families(), vec![2]);
    }

    #[test]
    fn test_falls_back_to_separate_families() {
        let families = [family(1, false, true), family(2, true, false)];
        let indices = select_queue_families(&families).unwrap();
        assert_eq!(indices.graphics_family, 1);
        assert_eq!(indices.present_family, 0);
        assert!(!indices.is_shared());
        assert_eq!(indices.unique_families(), vec![1, 0]);
    }

    #[test]
    fn test_ignores_families_without_queues() {
        let families = [family(0, true, true), family(1, true, true)];
        let indices = select_queue_families(&families).unwrap();
        assert_eq!(indices.graphics_family, 1);

        assert!(select_queue_families(&[family(0, true, true)]).is_none());
    }

    #[test]
    fn test_no_present_family() {
        let families = [family(1, true, false)];
        assert!(select_queue_families(&families).is_none());
        assert!(select_queue_families(&[]).is_none());
    }

    #[test]
    fn test_rejections() {
        let mut c = candidate("no-swapchain", vk::PhysicalDeviceType::DISCRETE_GPU);
        c.supports_swapchain = false;
        assert_eq!(c.evaluate(), Err(Rejection::MissingSwapchainExtension));

        let mut c = candidate("ancient", vk::PhysicalDeviceType::DISCRETE_GPU);
        c.api_version = vk::make_api_version(0, 0, 9, 0);
        assert_eq!(c.evaluate(), Err(Rejection::ApiVersionTooOld));

        let mut c = candidate("tiny", vk::PhysicalDeviceType::DISCRETE_GPU);
        c.max_image_dimension_2d = 2048;
        assert_eq!(c.evaluate(), Err(Rejection::ImageDimensionTooSmall));

        let mut c = candidate("headless", vk::PhysicalDeviceType::DISCRETE_GPU);
        c.queue_families = vec![family(1, true, false)];
        assert_eq!(c.evaluate(), Err(Rejection::NoQueueFamilies));
    }

    #[test]
    fn test_ranking_prefers_discrete_gpu() {
        let candidates = vec![
            candidate("integrated", vk::PhysicalDeviceType::INTEGRATED_GPU),
            candidate("cpu", vk::PhysicalDeviceType::CPU),
            candidate("discrete", vk::PhysicalDeviceType::DISCRETE_GPU),
        ];
        let ranked = rank_candidates(&candidates);
        let order: Vec<usize> = ranked.iter().map(|(i, _)| *i).collect();
        assert_eq!(order, vec![2, 0, 1]);
    }

    #[test]
    fn test_ranking_prefers_shared_family_then_image_size() {
        let mut split = candidate("split", vk::PhysicalDeviceType::DISCRETE_GPU);
        split.queue_families = vec![family(1, true, false), family(1, false, true)];
        split.max_image_dimension_2d = 32768;

        let mut small = candidate("small", vk::PhysicalDeviceType::DISCRETE_GPU);
        small.max_image_dimension_2d = 8192;

        let large = candidate("large", vk::PhysicalDeviceType::DISCRETE_GPU);

        let ranked = rank_candidates(&[split, small, large]);
        let order: Vec<usize> = ranked.iter().map(|(i, _)| *i).collect();
        assert_eq!(order, vec![2, 1, 0]);
    }

    #[test]
    fn test_ranking_drops_unusable() {
        let mut broken = candidate("broken", vk::PhysicalDeviceType::DISCRETE_GPU);
        broken.supports_swapchain = false;
        let ok = candidate("ok", vk::PhysicalDeviceType::INTEGRATED_GPU);

        let ranked = rank_candidates(&[broken, ok]);
        assert_eq!(ranked.len(), 1);
        assert_eq!(ranked[0].0, 1);
        assert!(rank_candidates(&[]).is_empty());
    }
}
