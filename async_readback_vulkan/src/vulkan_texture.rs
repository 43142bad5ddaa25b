/// Texture - Vulkan implementation of the readback Texture trait

use async_readback::device::{Texture as ReadbackTexture, TextureInfo};
use ash::vk;
use gpu_allocator::vulkan::Allocation;
use std::any::Any;
use std::sync::{Arc, Mutex};

use crate::vulkan_context::GpuContext;

/// Vulkan texture implementation (optimal-tiling image)
pub struct Texture {
    /// Shared GPU context (device, allocator, queue, command pool)
    ctx: Arc<GpuContext>,
    /// Vulkan image
    pub(crate) image: vk::Image,
    /// GPU memory allocation
    pub(crate) allocation: Option<Allocation>,
    /// Layout the image will be in once everything recorded so far executes
    pub(crate) layout: Mutex<vk::ImageLayout>,
    /// Debug name
    pub(crate) name: String,
    /// Read-only texture properties
    pub(crate) info: TextureInfo,
}

impl Texture {
    pub(crate) fn new(
        ctx: Arc<GpuContext>,
        image: vk::Image,
        allocation: Allocation,
        layout: vk::ImageLayout,
        name: String,
        info: TextureInfo,
    ) -> Self {
        Self {
            ctx,
            image,
            allocation: Some(allocation),
            layout: Mutex::new(layout),
            name,
            info,
        }
    }

    /// Tracked layout
    pub fn layout(&self) -> vk::ImageLayout {
        match self.layout.lock() {
            Ok(layout) => *layout,
            Err(poisoned) => *poisoned.into_inner(),
        }
    }

    /// Record a new tracked layout, returning the previous one
    pub(crate) fn swap_layout(&self, new_layout: vk::ImageLayout) -> vk::ImageLayout {
        let mut layout = match self.layout.lock() {
            Ok(layout) => layout,
            Err(poisoned) => poisoned.into_inner(),
        };
        std::mem::replace(&mut *layout, new_layout)
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl ReadbackTexture for Texture {
    fn info(&self) -> &TextureInfo {
        &self.info
    }

    fn is_allocated(&self) -> bool {
        self.allocation.is_some()
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

impl Drop for Texture {
    fn drop(&mut self) {
        unsafe {
            // Free GPU memory
            if let Some(allocation) = self.allocation.take() {
                if let Ok(mut allocator) = self.ctx.allocator.lock() {
                    allocator.free(allocation).ok();
                }
            }

            // Destroy image
            self.ctx.device.destroy_image(self.image, None);
        }
    }
}
