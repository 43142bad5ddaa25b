/// StagingTexture - host-visible buffer that receives readback copies

use async_readback::device::{Texture as ReadbackTexture, TextureInfo};
use async_readback::{engine_err, Result};
use ash::vk;
use gpu_allocator::vulkan::Allocation;
use std::any::Any;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::vulkan_context::GpuContext;

/// Vulkan staging texture
///
/// A `GpuToCpu` buffer laid out as rows of `row_pitch_in_pixels` pixels.
/// The memory stays persistently mapped; "mapping" only tracks access.
pub struct StagingTexture {
    /// Shared GPU context (device, allocator, queue, command pool)
    ctx: Arc<GpuContext>,
    /// Vulkan buffer
    pub(crate) buffer: vk::Buffer,
    /// GPU memory allocation
    pub(crate) allocation: Option<Allocation>,
    /// Distance between row starts, in pixels
    pub(crate) row_pitch_in_pixels: u32,
    /// Size in bytes of the readable rows
    pub(crate) size: u64,
    mapped: AtomicBool,
    /// Read-only texture properties
    pub(crate) info: TextureInfo,
}

impl StagingTexture {
    pub(crate) fn new(
        ctx: Arc<GpuContext>,
        buffer: vk::Buffer,
        allocation: Allocation,
        row_pitch_in_pixels: u32,
        size: u64,
        info: TextureInfo,
    ) -> Self {
        Self {
            ctx,
            buffer,
            allocation: Some(allocation),
            row_pitch_in_pixels,
            size,
            mapped: AtomicBool::new(false),
            info,
        }
    }

    pub fn row_pitch_in_pixels(&self) -> u32 {
        self.row_pitch_in_pixels
    }

    pub fn is_mapped(&self) -> bool {
        self.mapped.load(Ordering::Acquire)
    }

    /// Mark as mapped. Returns false if it already was.
    pub(crate) fn begin_map(&self) -> bool {
        !self.mapped.swap(true, Ordering::AcqRel)
    }

    /// Mark as unmapped. Returns false if it was not mapped.
    pub(crate) fn end_map(&self) -> bool {
        self.mapped.swap(false, Ordering::AcqRel)
    }

    /// Readable bytes of the buffer
    ///
    /// Invalidates the host cache first when the memory is not coherent.
    pub(crate) fn read_mapped(&self) -> Result<&[u8]> {
        let allocation = self.allocation.as_ref()
            .ok_or_else(|| engine_err!("readback::vulkan", "Staging buffer has no allocation"))?;

        if !allocation.memory_properties().contains(vk::MemoryPropertyFlags::HOST_COHERENT) {
            let atom = self.ctx.non_coherent_atom_size.max(1);
            let range = vk::MappedMemoryRange::default()
                .memory(unsafe { allocation.memory() })
                .offset(allocation.offset() / atom * atom)
                .size(vk::WHOLE_SIZE);
            unsafe {
                self.ctx.device.invalidate_mapped_memory_ranges(&[range])
                    .map_err(|e| engine_err!("readback::vulkan", "Failed to invalidate staging memory: {:?}", e))?;
            }
        }

        let bytes = allocation.mapped_slice()
            .ok_or_else(|| engine_err!("readback::vulkan", "Staging buffer is not host-mapped"))?;
        bytes.get(..self.size as usize)
            .ok_or_else(|| engine_err!(
                "readback::vulkan",
                "Staging allocation holds {} bytes, expected {}",
                bytes.len(),
                self.size
            ))
    }
}

impl ReadbackTexture for StagingTexture {
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

impl Drop for StagingTexture {
    fn drop(&mut self) {
        unsafe {
            // Free GPU memory
            if let Some(allocation) = self.allocation.take() {
                if let Ok(mut allocator) = self.ctx.allocator.lock() {
                    allocator.free(allocation).ok();
                }
            }

            // Destroy buffer
            self.ctx.device.destroy_buffer(self.buffer, None);
        }
    }
}
