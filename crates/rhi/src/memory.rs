//! gpu-allocator plumbing shared by buffers and textures.

use std::sync::MutexGuard;

use ash::vk;
use gpu_allocator::MemoryLocation;
use gpu_allocator::vulkan::{Allocation, AllocationCreateDesc, AllocationScheme, Allocator};
use tracing::error;

use crate::device::Device;
use crate::error::{RhiError, RhiResult};

pub(crate) fn lock_allocator(device: &Device) -> RhiResult<MutexGuard<'_, Allocator>> {
    device
        .allocator()
        .lock()
        .map_err(|_| RhiError::InvalidHandle("GPU allocator lock poisoned".to_string()))
}

/// Sub-allocates memory for one resource. `linear` is true for buffers and
/// linear-tiled images.
pub(crate) fn allocate(
    device: &Device,
    name: &str,
    requirements: vk::MemoryRequirements,
    location: MemoryLocation,
    linear: bool,
) -> RhiResult<Allocation> {
    let mut allocator = lock_allocator(device)?;
    let allocation = allocator.allocate(&AllocationCreateDesc {
        name,
        requirements,
        location,
        linear,
        allocation_scheme: AllocationScheme::GpuAllocatorManaged,
    })?;
    Ok(allocation)
}

/// Returns an allocation to the allocator, logging instead of failing.
pub(crate) fn free(device: &Device, allocation: Allocation, what: &str) {
    match lock_allocator(device) {
        Ok(mut allocator) => {
            if let Err(e) = allocator.free(allocation) {
                error!("Failed to free {} allocation: {:?}", what, e);
            }
        }
        Err(e) => error!("Leaking {} allocation: {}", what, e),
    }
}

/// Runs `bind` for a fresh allocation. If binding fails, the allocation goes
/// to `release` together with the object it was meant for, and the bind
/// error is returned.
pub(crate) fn bind_or_release<T>(
    allocation: T,
    bind: impl FnOnce(&T) -> RhiResult<()>,
    release: impl FnOnce(T),
) -> RhiResult<T> {
    match bind(&allocation) {
        Ok(()) => Ok(allocation),
        Err(e) => {
            release(allocation);
            Err(e)
        }
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;

    use super::*;

    #[test]
    fn test_bind_success_keeps_allocation() {
        let released = RefCell::new(Vec::new());
        let result = bind_or_release(7u32, |_| Ok(()), |a| released.borrow_mut().push(a));

        assert_eq!(result.unwrap(), 7);
        assert!(released.borrow().is_empty());
    }

    #[test]
    fn test_bind_failure_releases_allocation() {
        let released = RefCell::new(Vec::new());
        let result = bind_or_release(
            7u32,
            |_| Err(RhiError::VulkanError(vk::Result::ERROR_OUT_OF_DEVICE_MEMORY)),
            |a| released.borrow_mut().push(a),
        );

        assert!(matches!(
            result,
            Err(RhiError::VulkanError(vk::Result::ERROR_OUT_OF_DEVICE_MEMORY))
        ));
        assert_eq!(*released.borrow(), vec![7]);
    }

    #[test]
    fn test_bind_sees_the_allocation() {
        let seen = RefCell::new(None);
        let _ = bind_or_release(
            42u64,
            |a| {
                *seen.borrow_mut() = Some(*a);
                Ok(())
            },
            |_| {},
        );
        assert_eq!(*seen.borrow(), Some(42));
    }
}
