/*!
# Async Readback - Headless Vulkan Backend

Vulkan implementation of the `async_readback` device traits.

This crate provides a headless `ReadbackDevice` (no window, no surface) using
the Ash library for Vulkan bindings and gpu-allocator for memory management.
Render targets are optimal-tiling images; staging textures are host-visible
buffers with aligned rows; each readback fence is a `vk::Fence` signaled by
the submission that carries the copy.

```no_run
use std::sync::Arc;
use async_readback::scheduler::RenderThread;
use async_readback_vulkan::{VulkanDeviceConfig, VulkanReadbackDevice};

let device = Arc::new(VulkanReadbackDevice::new(VulkanDeviceConfig::default())?);
let render = RenderThread::spawn(device)?;
# Ok::<(), async_readback::Error>(())
```
*/

mod vulkan_context;
mod vulkan_device;
mod vulkan_fence;
mod vulkan_format;
mod vulkan_staging;
mod vulkan_texture;

#[cfg(feature = "vulkan-validation")]
mod debug;

pub use vulkan_context::GpuContext;
pub use vulkan_device::{VulkanDeviceConfig, VulkanReadbackDevice};
pub use vulkan_fence::Fence as VulkanFence;
pub use vulkan_format::{pixel_format_to_vk, staging_row_pitch};
pub use vulkan_staging::StagingTexture as VulkanStagingTexture;
pub use vulkan_texture::Texture as VulkanTexture;
