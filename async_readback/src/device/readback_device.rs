/// Device trait consumed by the readback pipeline

use std::borrow::Cow;
use std::sync::Arc;

use glam::UVec2;

use crate::device::{GpuFence, ResourceAccess, Texture, TextureDesc};
use crate::error::Result;
use crate::format::PixelFormat;

/// How a staging surface is mapped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MapMode {
    /// Fence already observed as signaled; mapping must not block
    Poll,
    /// Force outstanding commands to retire, then map (bounded stall)
    Flush,
}

/// Copy region between two textures
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CopyTextureInfo {
    /// Top-left corner read from the source
    pub source_position: UVec2,
    /// Top-left corner written in the destination
    pub dest_position: UVec2,
    /// Width and height of the copied block
    pub size: UVec2,
}

/// CPU view of a mapped staging texture
///
/// Rows are `row_pitch_in_pixels` pixels apart, which may exceed the logical
/// width of the copy.
#[derive(Debug)]
pub struct MappedSurface<'a> {
    /// Raw pixel bytes, `row_pitch_in_pixels * height` pixels long
    pub data: Cow<'a, [u8]>,
    /// Distance between row starts, in pixels
    pub row_pitch_in_pixels: u32,
    /// Number of rows
    pub height: u32,
}

impl MappedSurface<'_> {
    /// Bytes of one pixel at (x, y)
    ///
    /// # Panics
    ///
    /// If the pixel lies outside the mapped bytes.
    pub fn pixel(&self, x: u32, y: u32, format: PixelFormat) -> &[u8] {
        let block = format.block_bytes();
        let offset = (y as usize * self.row_pitch_in_pixels as usize + x as usize) * block;
        &self.data[offset..offset + block]
    }
}

/// Host rendering services needed for readback
///
/// Every method is called from the rendering domain only. Implementations use
/// interior mutability; the pipeline only ever holds `&dyn ReadbackDevice`.
pub trait ReadbackDevice: Send + Sync {
    /// Create a GPU texture (render targets, test sources)
    fn create_texture(&self, desc: TextureDesc) -> Result<Arc<dyn Texture>>;

    /// Create a CPU-readable texture of the given size and format
    fn create_staging_texture(
        &self,
        width: u32,
        height: u32,
        format: PixelFormat,
    ) -> Result<Arc<dyn Texture>>;

    /// Record a resource state transition
    fn transition(&self, texture: &dyn Texture, from: ResourceAccess, to: ResourceAccess) -> Result<()>;

    /// Record a copy of `info.size` pixels from `source` to `dest`
    fn copy_region(&self, source: &dyn Texture, dest: &dyn Texture, info: &CopyTextureInfo) -> Result<()>;

    /// Create a new, unsignaled fence
    fn create_fence(&self, name: &str) -> Result<Arc<dyn GpuFence>>;

    /// Signal `fence` once everything recorded so far has retired
    fn write_fence(&self, fence: &dyn GpuFence) -> Result<()>;

    /// Retire everything recorded since the last `write_fence`
    ///
    /// Called when a recorded sequence is abandoned, while every texture it
    /// references is still alive. Afterwards no pending work may touch them.
    /// Devices that execute commands as they are recorded keep the default.
    fn abandon_recorded(&self) -> Result<()> {
        Ok(())
    }

    /// Non-blocking fence query
    fn poll_fence(&self, fence: &dyn GpuFence) -> bool;

    /// Map a staging texture for reading
    ///
    /// With `MapMode::Flush` this blocks until `fence` signals.
    fn map_staging_surface<'a>(
        &self,
        staging: &'a dyn Texture,
        fence: &dyn GpuFence,
        mode: MapMode,
    ) -> Result<MappedSurface<'a>>;

    /// Release a mapping obtained from `map_staging_surface`
    fn unmap_staging_surface(&self, staging: &dyn Texture) -> Result<()>;
}
