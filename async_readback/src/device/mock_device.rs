/// Mock readback device for tests (no GPU required)
///
/// Executes copies on the CPU as soon as they are recorded, records every
/// command for later inspection, and keeps fences unsignaled until the test
/// signals them or a configured number of polls has elapsed.
///
/// Compiled for this crate's unit tests and, behind the `testing` feature,
/// for integration tests and downstream hosts.

use std::any::Any;
use std::borrow::Cow;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, Weak};

use crate::device::{
    CopyTextureInfo, GpuFence, MapMode, MappedSurface, ReadbackDevice, ResourceAccess, Texture,
    TextureDesc, TextureInfo, TextureUsage,
};
use crate::error::{Error, Result};
use crate::format::PixelFormat;

// ============================================================================
// Mock Texture
// ============================================================================

pub struct MockTexture {
    pub info: TextureInfo,
    pub name: String,
    pub row_pitch_in_pixels: u32,
    pub data: Mutex<Vec<u8>>,
    allocated: AtomicBool,
    mapped: AtomicBool,
}

impl MockTexture {
    fn new(name: String, info: TextureInfo, row_pitch_in_pixels: u32, data: Vec<u8>) -> Self {
        Self {
            info,
            name,
            row_pitch_in_pixels,
            data: Mutex::new(data),
            allocated: AtomicBool::new(true),
            mapped: AtomicBool::new(false),
        }
    }

    /// Simulate the host releasing the texture memory
    pub fn release(&self) {
        self.allocated.store(false, Ordering::Release);
    }

    pub fn is_mapped(&self) -> bool {
        self.mapped.load(Ordering::Acquire)
    }
}

impl Texture for MockTexture {
    fn info(&self) -> &TextureInfo {
        &self.info
    }

    fn is_allocated(&self) -> bool {
        self.allocated.load(Ordering::Acquire)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

// ============================================================================
// Mock Fence
// ============================================================================

pub struct MockFence {
    pub name: String,
    written: AtomicBool,
    signaled: AtomicBool,
    polls: AtomicU32,
}

impl MockFence {
    pub fn is_written(&self) -> bool {
        self.written.load(Ordering::Acquire)
    }

    pub fn is_signaled(&self) -> bool {
        self.signaled.load(Ordering::Acquire)
    }
}

impl GpuFence for MockFence {
    fn name(&self) -> &str {
        &self.name
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

// ============================================================================
// Mock Commands
// ============================================================================

/// Everything the mock device was asked to do, in order
#[derive(Debug, Clone, PartialEq)]
pub enum MockCommand {
    CreateTexture { name: String, width: u32, height: u32, format: PixelFormat },
    CreateStaging { name: String, width: u32, height: u32, format: PixelFormat },
    Transition { texture: String, from: ResourceAccess, to: ResourceAccess },
    Copy { source: String, dest: String, info: CopyTextureInfo },
    CreateFence(String),
    WriteFence(String),
    AbandonRecorded,
    Map { texture: String, mode: MapMode },
    Unmap(String),
}

// ============================================================================
// Mock Device
// ============================================================================

pub struct MockDevice {
    commands: Mutex<Vec<MockCommand>>,
    fences: Mutex<Vec<Arc<MockFence>>>,
    staging: Mutex<Vec<Weak<MockTexture>>>,
    /// Staging names written by copies no fence has covered yet
    unfenced_copies: Mutex<Vec<String>>,
    dangling_copies: AtomicUsize,
    row_padding_pixels: u32,
    fence_latency_polls: Option<u32>,
    auto_signal: AtomicBool,
    fail_next_staging: AtomicBool,
    fail_next_fence: AtomicBool,
    fail_next_fence_write: AtomicBool,
    fail_next_map: AtomicBool,
    reported_geometry: Mutex<(Option<u32>, Option<u32>)>,
    staging_count: AtomicU32,
    maps: AtomicUsize,
    unmaps: AtomicUsize,
}

impl MockDevice {
    pub fn new() -> Self {
        Self::with_row_padding(0)
    }

    /// Staging rows get `row_padding_pixels` extra pixels of garbage at the end
    pub fn with_row_padding(row_padding_pixels: u32) -> Self {
        Self {
            commands: Mutex::new(Vec::new()),
            fences: Mutex::new(Vec::new()),
            staging: Mutex::new(Vec::new()),
            unfenced_copies: Mutex::new(Vec::new()),
            dangling_copies: AtomicUsize::new(0),
            row_padding_pixels,
            fence_latency_polls: None,
            auto_signal: AtomicBool::new(false),
            fail_next_staging: AtomicBool::new(false),
            fail_next_fence: AtomicBool::new(false),
            fail_next_fence_write: AtomicBool::new(false),
            fail_next_map: AtomicBool::new(false),
            reported_geometry: Mutex::new((None, None)),
            staging_count: AtomicU32::new(0),
            maps: AtomicUsize::new(0),
            unmaps: AtomicUsize::new(0),
        }
    }

    /// Written fences signal on their `polls`-th `poll_fence` (simulated GPU latency)
    pub fn with_fence_latency(mut self, polls: u32) -> Self {
        self.fence_latency_polls = Some(polls);
        self
    }

    /// Fences signal as soon as they are written
    pub fn set_auto_signal(&self, enabled: bool) {
        self.auto_signal.store(enabled, Ordering::Release);
    }

    /// Signal every fence written so far
    pub fn signal_fences(&self) {
        for fence in self.fences.lock().unwrap().iter() {
            if fence.is_written() {
                fence.signaled.store(true, Ordering::Release);
            }
        }
    }

    /// Next `create_staging_texture` returns `Error::OutOfMemory`
    pub fn fail_next_staging_allocation(&self) {
        self.fail_next_staging.store(true, Ordering::Release);
    }

    /// Next `create_fence` returns `Error::OutOfMemory`
    pub fn fail_next_fence(&self) {
        self.fail_next_fence.store(true, Ordering::Release);
    }

    /// Next `write_fence` fails before submitting anything
    pub fn fail_next_fence_write(&self) {
        self.fail_next_fence_write.store(true, Ordering::Release);
    }

    /// Next `map_staging_surface` returns a backend error
    pub fn fail_next_map(&self) {
        self.fail_next_map.store(true, Ordering::Release);
    }

    /// Lie about the mapped geometry (host contract violations)
    pub fn override_reported_geometry(&self, row_pitch_in_pixels: Option<u32>, height: Option<u32>) {
        *self.reported_geometry.lock().unwrap() = (row_pitch_in_pixels, height);
    }

    pub fn commands(&self) -> Vec<MockCommand> {
        self.commands.lock().unwrap().clone()
    }

    pub fn fences(&self) -> Vec<Arc<MockFence>> {
        self.fences.lock().unwrap().clone()
    }

    /// Successful `map_staging_surface` calls
    pub fn map_count(&self) -> usize {
        self.maps.load(Ordering::Acquire)
    }

    pub fn unmap_count(&self) -> usize {
        self.unmaps.load(Ordering::Acquire)
    }

    /// Staging textures still referenced by someone
    pub fn live_staging_count(&self) -> usize {
        self.staging.lock().unwrap().iter().filter(|t| t.strong_count() > 0).count()
    }

    /// Copies recorded since the last fence write
    pub fn unfenced_copy_count(&self) -> usize {
        self.unfenced_copies.lock().unwrap().len()
    }

    /// Copies whose staging texture was released before they were fenced or
    /// abandoned (a use-after-free on a real GPU)
    pub fn dangling_copy_count(&self) -> usize {
        self.dangling_copies.load(Ordering::Acquire)
    }

    /// Close out pending copies, counting those whose destination is gone
    fn retire_copies(&self) {
        let copies = std::mem::take(&mut *self.unfenced_copies.lock().unwrap());
        let staging = self.staging.lock().unwrap();
        for dest in copies {
            let released = staging
                .iter()
                .filter_map(Weak::upgrade)
                .all(|texture| texture.name != dest);
            if released {
                self.dangling_copies.fetch_add(1, Ordering::AcqRel);
            }
        }
    }

    fn record(&self, command: MockCommand) {
        self.commands.lock().unwrap().push(command);
    }

    fn mock_texture<'a>(texture: &'a dyn Texture) -> Result<&'a MockTexture> {
        texture
            .as_any()
            .downcast_ref::<MockTexture>()
            .ok_or_else(|| Error::InvalidResource("texture was not created by MockDevice".to_string()))
    }

    fn mock_fence<'a>(fence: &'a dyn GpuFence) -> Result<&'a MockFence> {
        fence
            .as_any()
            .downcast_ref::<MockFence>()
            .ok_or_else(|| Error::InvalidResource("fence was not created by MockDevice".to_string()))
    }
}

impl Default for MockDevice {
    fn default() -> Self {
        Self::new()
    }
}

impl ReadbackDevice for MockDevice {
    fn create_texture(&self, desc: TextureDesc) -> Result<Arc<dyn Texture>> {
        let data = match desc.data.clone() {
            Some(data) => {
                if data.len() != desc.packed_size() {
                    return Err(Error::InvalidResource(format!(
                        "texture '{}' expects {} bytes, got {}",
                        desc.name,
                        desc.packed_size(),
                        data.len()
                    )));
                }
                data
            }
            None => vec![0; desc.packed_size()],
        };
        self.record(MockCommand::CreateTexture {
            name: desc.name.clone(),
            width: desc.width,
            height: desc.height,
            format: desc.format,
        });
        let info = TextureInfo {
            width: desc.width,
            height: desc.height,
            format: desc.format,
            usage: desc.usage,
        };
        Ok(Arc::new(MockTexture::new(desc.name, info, desc.width, data)))
    }

    fn create_staging_texture(
        &self,
        width: u32,
        height: u32,
        format: PixelFormat,
    ) -> Result<Arc<dyn Texture>> {
        if self.fail_next_staging.swap(false, Ordering::AcqRel) {
            return Err(Error::OutOfMemory);
        }
        let index = self.staging_count.fetch_add(1, Ordering::Relaxed);
        let name = format!("staging#{}", index);
        self.record(MockCommand::CreateStaging { name: name.clone(), width, height, format });

        let row_pitch = width + self.row_padding_pixels;
        // Padding is filled with a recognizable pattern so stride bugs show up
        let data = vec![0xCD; row_pitch as usize * height as usize * format.block_bytes()];
        let info = TextureInfo { width, height, format, usage: TextureUsage::STAGING };
        let texture = Arc::new(MockTexture::new(name, info, row_pitch, data));
        self.staging.lock().unwrap().push(Arc::downgrade(&texture));
        Ok(texture)
    }

    fn transition(&self, texture: &dyn Texture, from: ResourceAccess, to: ResourceAccess) -> Result<()> {
        let texture = Self::mock_texture(texture)?;
        self.record(MockCommand::Transition { texture: texture.name.clone(), from, to });
        Ok(())
    }

    fn copy_region(&self, source: &dyn Texture, dest: &dyn Texture, info: &CopyTextureInfo) -> Result<()> {
        let source = Self::mock_texture(source)?;
        let dest = Self::mock_texture(dest)?;
        if source.info.format != dest.info.format {
            return Err(Error::InvalidResource("copy between different formats".to_string()));
        }

        let block = source.info.format.block_bytes();
        let src_data = source.data.lock().unwrap();
        let mut dst_data = dest.data.lock().unwrap();
        for row in 0..info.size.y {
            let src_start = (((info.source_position.y + row) * source.row_pitch_in_pixels
                + info.source_position.x) as usize)
                * block;
            let dst_start = (((info.dest_position.y + row) * dest.row_pitch_in_pixels
                + info.dest_position.x) as usize)
                * block;
            let len = info.size.x as usize * block;
            dst_data[dst_start..dst_start + len].copy_from_slice(&src_data[src_start..src_start + len]);
        }
        drop(dst_data);
        drop(src_data);

        if dest.info.is_staging() {
            self.unfenced_copies.lock().unwrap().push(dest.name.clone());
        }
        self.record(MockCommand::Copy {
            source: source.name.clone(),
            dest: dest.name.clone(),
            info: *info,
        });
        Ok(())
    }

    fn create_fence(&self, name: &str) -> Result<Arc<dyn GpuFence>> {
        if self.fail_next_fence.swap(false, Ordering::AcqRel) {
            return Err(Error::OutOfMemory);
        }
        let fence = Arc::new(MockFence {
            name: name.to_string(),
            written: AtomicBool::new(false),
            signaled: AtomicBool::new(false),
            polls: AtomicU32::new(0),
        });
        self.fences.lock().unwrap().push(fence.clone());
        self.record(MockCommand::CreateFence(name.to_string()));
        Ok(fence)
    }

    fn write_fence(&self, fence: &dyn GpuFence) -> Result<()> {
        let fence = Self::mock_fence(fence)?;
        if self.fail_next_fence_write.swap(false, Ordering::AcqRel) {
            return Err(Error::BackendError(format!("queue rejected fence '{}'", fence.name)));
        }
        self.retire_copies();
        fence.written.store(true, Ordering::Release);
        if self.auto_signal.load(Ordering::Acquire) {
            fence.signaled.store(true, Ordering::Release);
        }
        self.record(MockCommand::WriteFence(fence.name.clone()));
        Ok(())
    }

    fn abandon_recorded(&self) -> Result<()> {
        self.retire_copies();
        self.record(MockCommand::AbandonRecorded);
        Ok(())
    }

    fn poll_fence(&self, fence: &dyn GpuFence) -> bool {
        let Ok(fence) = Self::mock_fence(fence) else {
            return false;
        };
        if let Some(latency) = self.fence_latency_polls {
            if fence.is_written() && fence.polls.fetch_add(1, Ordering::AcqRel) + 1 >= latency {
                fence.signaled.store(true, Ordering::Release);
            }
        }
        fence.is_signaled()
    }

    fn map_staging_surface<'a>(
        &self,
        staging: &'a dyn Texture,
        fence: &dyn GpuFence,
        mode: MapMode,
    ) -> Result<MappedSurface<'a>> {
        let texture = Self::mock_texture(staging)?;
        let mock_fence = Self::mock_fence(fence)?;
        self.record(MockCommand::Map { texture: texture.name.clone(), mode });

        if self.fail_next_map.swap(false, Ordering::AcqRel) {
            return Err(Error::BackendError("device lost while mapping".to_string()));
        }
        match mode {
            MapMode::Poll if !mock_fence.is_signaled() => {
                return Err(Error::FenceNotSignaled(mock_fence.name.clone()));
            }
            MapMode::Flush => {
                if !mock_fence.is_written() {
                    return Err(Error::FenceNotSignaled(mock_fence.name.clone()));
                }
                mock_fence.signaled.store(true, Ordering::Release);
            }
            _ => {}
        }
        if texture.mapped.swap(true, Ordering::AcqRel) {
            return Err(Error::InvalidResource(format!("'{}' is already mapped", texture.name)));
        }

        let (pitch_override, height_override) = *self.reported_geometry.lock().unwrap();
        self.maps.fetch_add(1, Ordering::AcqRel);
        Ok(MappedSurface {
            data: Cow::Owned(texture.data.lock().unwrap().clone()),
            row_pitch_in_pixels: pitch_override.unwrap_or(texture.row_pitch_in_pixels),
            height: height_override.unwrap_or(texture.info.height),
        })
    }

    fn unmap_staging_surface(&self, staging: &dyn Texture) -> Result<()> {
        let texture = Self::mock_texture(staging)?;
        texture.mapped.store(false, Ordering::Release);
        self.unmaps.fetch_add(1, Ordering::AcqRel);
        self.record(MockCommand::Unmap(texture.name.clone()));
        Ok(())
    }
}

#[cfg(test)]
#[path = "mock_device_tests.rs"]
mod tests;
