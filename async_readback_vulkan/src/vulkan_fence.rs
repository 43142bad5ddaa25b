/// Fence - Vulkan implementation of the GpuFence trait

use async_readback::device::GpuFence;
use ash::vk;
use std::any::Any;
use std::sync::{Arc, Mutex};

use crate::vulkan_context::GpuContext;

/// One-shot `vk::Fence` plus the command buffer it guards
pub struct Fence {
    /// Shared GPU context (device, allocator, queue, command pool)
    ctx: Arc<GpuContext>,
    /// Vulkan fence
    pub(crate) fence: vk::Fence,
    name: String,
    /// Set by the submission that will signal the fence. `Some(null)` when
    /// nothing was pending at submit time.
    pub(crate) submitted: Mutex<Option<vk::CommandBuffer>>,
}

impl Fence {
    pub(crate) fn new(ctx: Arc<GpuContext>, fence: vk::Fence, name: String) -> Self {
        Self {
            ctx,
            fence,
            name,
            submitted: Mutex::new(None),
        }
    }

    /// Whether a submission will signal this fence
    pub fn is_submitted(&self) -> bool {
        match self.submitted.lock() {
            Ok(submitted) => submitted.is_some(),
            Err(poisoned) => poisoned.into_inner().is_some(),
        }
    }
}

impl GpuFence for Fence {
    fn name(&self) -> &str {
        &self.name
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

impl Drop for Fence {
    fn drop(&mut self) {
        unsafe {
            let submitted = match self.submitted.get_mut() {
                Ok(submitted) => submitted.take(),
                Err(poisoned) => poisoned.into_inner().take(),
            };

            if let Some(command_buffer) = submitted {
                // The GPU may still be executing the copy
                self.ctx.device.wait_for_fences(&[self.fence], true, u64::MAX).ok();

                if command_buffer != vk::CommandBuffer::null() {
                    if let Ok(commands) = self.ctx.commands.lock() {
                        self.ctx.device.free_command_buffers(commands.pool, &[command_buffer]);
                    }
                }
            }

            self.ctx.device.destroy_fence(self.fence, None);
        }
    }
}
