//! GPU buffers backed by gpu-allocator memory.
//!
//! Vertex data lives in device-local memory. It is written once into a
//! host-visible staging buffer and copied over with a one-time transfer
//! submission (see [`Buffer::device_local_with_data`]).

use std::sync::Arc;

use ash::vk;
use gpu_allocator::MemoryLocation;
use gpu_allocator::vulkan::Allocation;
use tracing::debug;

use crate::device::Device;
use crate::error::{RhiError, RhiResult};
use crate::memory;
use crate::upload::submit_one_time;

/// What a buffer is used for; decides its usage flags and memory.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BufferUsage {
    /// Device-local vertex data, filled by a transfer
    Vertex,
    /// Host-visible transfer source
    Staging,
}

impl BufferUsage {
    pub fn to_vk_usage(self) -> vk::BufferUsageFlags {
        match self {
            BufferUsage::Vertex => {
                vk::BufferUsageFlags::VERTEX_BUFFER | vk::BufferUsageFlags::TRANSFER_DST
            }
            BufferUsage::Staging => vk::BufferUsageFlags::TRANSFER_SRC,
        }
    }

    pub fn memory_location(self) -> MemoryLocation {
        match self {
            BufferUsage::Vertex => MemoryLocation::GpuOnly,
            BufferUsage::Staging => MemoryLocation::CpuToGpu,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            BufferUsage::Vertex => "vertex",
            BufferUsage::Staging => "staging",
        }
    }
}

/// Checks that `len` bytes at `offset` fit into a buffer of `size` bytes.
pub fn check_write_range(size: vk::DeviceSize, offset: vk::DeviceSize, len: usize) -> RhiResult<()> {
    let end = offset
        .checked_add(len as vk::DeviceSize)
        .ok_or_else(|| RhiError::InvalidHandle("Buffer write range overflows".to_string()))?;
    if end > size {
        return Err(RhiError::InvalidHandle(format!(
            "Write exceeds buffer size: offset {} + data {} > buffer {}",
            offset, len, size
        )));
    }
    Ok(())
}

/// Whole-buffer copy region.
pub fn full_copy_region(size: vk::DeviceSize) -> vk::BufferCopy {
    vk::BufferCopy {
        src_offset: 0,
        dst_offset: 0,
        size,
    }
}

/// Buffer plus the memory bound to it.
pub struct Buffer {
    device: Arc<Device>,
    buffer: vk::Buffer,
    allocation: Option<Allocation>,
    size: vk::DeviceSize,
    usage: BufferUsage,
}

impl Buffer {
    /// Creates an uninitialized buffer of `size` bytes.
    ///
    /// # Errors
    ///
    /// Returns [`RhiError::InvalidHandle`] for a zero size, or the Vulkan or
    /// allocator error when creation fails. Nothing is leaked on failure.
    pub fn new(device: Arc<Device>, usage: BufferUsage, size: vk::DeviceSize) -> RhiResult<Self> {
        if size == 0 {
            return Err(RhiError::InvalidHandle(
                "Buffer size must be greater than 0".to_string(),
            ));
        }

        let buffer_info = vk::BufferCreateInfo::default()
            .size(size)
            .usage(usage.to_vk_usage())
            .sharing_mode(vk::SharingMode::EXCLUSIVE);

        let buffer = unsafe { device.handle().create_buffer(&buffer_info, None)? };
        let requirements = unsafe { device.handle().get_buffer_memory_requirements(buffer) };

        let allocation = match memory::allocate(
            &device,
            usage.name(),
            requirements,
            usage.memory_location(),
            true,
        ) {
            Ok(allocation) => allocation,
            Err(e) => {
                unsafe { device.handle().destroy_buffer(buffer, None) };
                return Err(e);
            }
        };

        let allocation = memory::bind_or_release(
            allocation,
            |allocation| {
                unsafe {
                    device.handle().bind_buffer_memory(
                        buffer,
                        allocation.memory(),
                        allocation.offset(),
                    )?;
                }
                Ok(())
            },
            |allocation| {
                memory::free(&device, allocation, usage.name());
                unsafe { device.handle().destroy_buffer(buffer, None) };
            },
        )?;

        debug!("Created {} buffer: {} bytes", usage.name(), size);

        Ok(Self {
            device,
            buffer,
            allocation: Some(allocation),
            size,
            usage,
        })
    }

    /// Creates a host-visible buffer holding exactly `data`.
    pub fn with_data(device: Arc<Device>, usage: BufferUsage, data: &[u8]) -> RhiResult<Self> {
        let buffer = Self::new(device, usage, data.len() as vk::DeviceSize)?;
        buffer.write(0, data)?;
        Ok(buffer)
    }

    /// Creates a device-local buffer holding exactly `data`, going through a
    /// staging buffer. Blocks until the copy has finished.
    pub fn device_local_with_data(
        device: Arc<Device>,
        usage: BufferUsage,
        data: &[u8],
    ) -> RhiResult<Self> {
        let staging = Self::with_data(device.clone(), BufferUsage::Staging, data)?;
        let buffer = Self::new(device.clone(), usage, staging.size())?;

        submit_one_time(&device, |cmd| {
            cmd.copy_buffer(staging.handle(), buffer.handle(), &[full_copy_region(staging.size())]);
        })?;

        debug!(
            "Uploaded {} bytes into {} buffer through staging",
            data.len(),
            usage.name()
        );
        Ok(buffer)
    }

    /// Copies `data` into the mapped memory at `offset`.
    ///
    /// Only host-visible buffers are mapped.
    pub fn write(&self, offset: vk::DeviceSize, data: &[u8]) -> RhiResult<()> {
        if data.is_empty() {
            return Ok(());
        }
        check_write_range(self.size, offset, data.len())?;

        let allocation = self.allocation.as_ref().ok_or_else(|| {
            RhiError::InvalidHandle("Buffer allocation is not available".to_string())
        })?;

        let mapped_ptr = allocation.mapped_ptr().ok_or_else(|| {
            RhiError::InvalidHandle(format!("{} buffer memory is not mapped", self.usage.name()))
        })?;

        unsafe {
            let dst = mapped_ptr.as_ptr().cast::<u8>().add(offset as usize);
            std::ptr::copy_nonoverlapping(data.as_ptr(), dst, data.len());
        }

        Ok(())
    }

    #[inline]
    pub fn handle(&self) -> vk::Buffer {
        self.buffer
    }

    #[inline]
    pub fn size(&self) -> vk::DeviceSize {
        self.size
    }

    #[inline]
    pub fn usage(&self) -> BufferUsage {
        self.usage
    }
}

impl Drop for Buffer {
    fn drop(&mut self) {
        if let Some(allocation) = self.allocation.take() {
            memory::free(&self.device, allocation, self.usage.name());
        }

        unsafe {
            self.device.handle().destroy_buffer(self.buffer, None);
        }

        debug!("Destroyed {} buffer", self.usage.name());
    }
}
