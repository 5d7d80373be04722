//! One-time transfer submissions used to fill device-local resources.

use std::sync::Arc;

use ash::vk;
use tracing::debug;

use crate::command::{CommandBuffer, CommandPool};
use crate::device::Device;
use crate::error::{RhiError, RhiResult};
use crate::sync::Fence;

/// Records commands with `record` into a throwaway command buffer, submits
/// it to the graphics queue and blocks until it has executed.
///
/// Only meant for setup work: every call creates its own pool and fence.
pub fn submit_one_time<F>(device: &Arc<Device>, record: F) -> RhiResult<()>
where
    F: FnOnce(&CommandBuffer),
{
    let pool = CommandPool::new(device.clone(), device.queue_families().graphics_family)?;
    let cmd = pool
        .allocate_command_buffers(1)?
        .pop()
        .ok_or_else(|| RhiError::InvalidHandle("No upload command buffer".to_string()))?;

    cmd.begin_one_time()?;
    record(&cmd);
    cmd.end()?;

    let fence = Fence::new(device.clone(), false)?;
    let command_buffers = [cmd.handle()];
    let submit_info = vk::SubmitInfo::default().command_buffers(&command_buffers);

    // SAFETY: the buffer is fully recorded and the fence is new and unsignaled.
    unsafe { device.submit_graphics(&[submit_info], fence.handle())? };

    // The pool must not be destroyed while the copy is pending
    fence.wait(u64::MAX)?;
    debug!("One-time upload submission finished");
    Ok(())
}
