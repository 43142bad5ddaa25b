//! Integration tests for the headless Vulkan readback device
//!
//! These tests verify that VulkanReadbackDevice correctly implements the
//! ReadbackDevice trait. Tests that need a GPU are marked with #[ignore].
//!
//! Run with: cargo test --test vulkan_readback_tests -- --ignored

use async_readback::device::{CopyTextureInfo, MapMode, ReadbackDevice, ResourceAccess, Texture, TextureDesc};
use async_readback::format::{LinearColor, PixelFormat};
use async_readback::glam::UVec2;
use async_readback::readback::ReadbackHandle;
use async_readback::scheduler::{FrameTicker, RenderThread};
use async_readback::{Error, FlushMode, ReadbackConfig, ReadbackContext, ReadbackRequest, ReadbackResult};
use async_readback_vulkan::{staging_row_pitch, VulkanDeviceConfig, VulkanReadbackDevice, VulkanStagingTexture};
use std::sync::{Arc, Mutex};

fn create_device() -> Arc<VulkanReadbackDevice> {
    Arc::new(VulkanReadbackDevice::new(VulkanDeviceConfig::default()).unwrap())
}

fn gradient_bgra(width: u32, height: u32) -> Vec<u8> {
    let mut data = Vec::with_capacity((width * height * 4) as usize);
    for y in 0..height {
        for x in 0..width {
            data.extend_from_slice(&[(x * 3) as u8, (y * 5) as u8, (x + y) as u8, 255]);
        }
    }
    data
}

fn expected_bgra(x: u32, y: u32) -> LinearColor {
    LinearColor::from_unorm8((x + y) as u8, (y * 5) as u8, (x * 3) as u8, 255)
}

struct Host {
    device: Arc<VulkanReadbackDevice>,
    render: Arc<RenderThread>,
    ticker: Arc<FrameTicker>,
    context: ReadbackContext,
}

impl Host {
    fn new() -> Self {
        let device = create_device();
        let render = Arc::new(RenderThread::spawn(device.clone()).unwrap());
        let ticker = Arc::new(FrameTicker::new());
        let context = ReadbackContext::new(render.clone(), ticker.clone()).with_config(ReadbackConfig {
            log_completion: false,
            ..ReadbackConfig::default()
        });
        Self { device, render, ticker, context }
    }

    fn read(&self, request: ReadbackRequest) -> ReadbackResult {
        let slot = Arc::new(Mutex::new(None));
        let sink = slot.clone();
        let handle = self.context.request_readback(request, move |result| {
            *sink.lock().unwrap() = Some(result);
        });
        self.run_until_dispatched(&handle);
        let result = slot.lock().unwrap().take();
        result.expect("callback did not run")
    }

    fn run_until_dispatched(&self, handle: &ReadbackHandle) {
        for _ in 0..10_000 {
            self.render.flush();
            self.ticker.tick();
            if handle.is_dispatched() {
                return;
            }
            std::thread::yield_now();
        }
        panic!("readback #{} never dispatched", handle.session_id());
    }
}

// ============================================================================
// CONFIG TESTS (no GPU)
// ============================================================================

#[test]
fn test_default_config() {
    let config = VulkanDeviceConfig::default();
    assert_eq!(config.staging_row_alignment, 256);
    assert!(!config.app_name.is_empty());
    if !cfg!(feature = "vulkan-validation") {
        assert!(!config.enable_validation);
    }
}

// ============================================================================
// DEVICE TESTS
// ============================================================================

#[test]
#[ignore] // Requires GPU
fn test_vulkan_create_texture_and_staging() {
    let device = create_device();

    let texture = device
        .create_texture(TextureDesc::render_target("rt", 64, 32, PixelFormat::B8G8R8A8))
        .unwrap();
    assert_eq!(texture.info().width, 64);
    assert_eq!(texture.info().height, 32);
    assert!(texture.is_allocated());

    let staging = device.create_staging_texture(10, 3, PixelFormat::B8G8R8A8).unwrap();
    assert!(staging.info().is_staging());
    let staging = staging.as_any().downcast_ref::<VulkanStagingTexture>().unwrap();
    assert_eq!(staging.row_pitch_in_pixels(), staging_row_pitch(10, PixelFormat::B8G8R8A8, 256));
}

#[test]
#[ignore] // Requires GPU
fn test_vulkan_rejects_bad_texture_data() {
    let device = create_device();
    let result = device.create_texture(
        TextureDesc::render_target("rt", 4, 4, PixelFormat::G8).with_data(vec![0; 3]),
    );
    assert!(matches!(result, Err(Error::BackendError(_))));
}

#[test]
#[ignore] // Requires GPU
fn test_vulkan_copy_fence_map_by_hand() {
    let device = create_device();
    let source = device
        .create_texture(TextureDesc::render_target("rt", 8, 8, PixelFormat::B8G8R8A8).with_data(gradient_bgra(8, 8)))
        .unwrap();
    let staging = device.create_staging_texture(3, 2, PixelFormat::B8G8R8A8).unwrap();

    device.transition(source.as_ref(), ResourceAccess::Unknown, ResourceAccess::CopySrc).unwrap();
    device.transition(staging.as_ref(), ResourceAccess::Unknown, ResourceAccess::CopyDest).unwrap();
    device
        .copy_region(
            source.as_ref(),
            staging.as_ref(),
            &CopyTextureInfo {
                source_position: UVec2::new(4, 5),
                dest_position: UVec2::ZERO,
                size: UVec2::new(3, 2),
            },
        )
        .unwrap();
    device.transition(staging.as_ref(), ResourceAccess::CopyDest, ResourceAccess::CopySrc).unwrap();

    let fence = device.create_fence("manual").unwrap();
    assert!(!device.poll_fence(fence.as_ref()));
    device.write_fence(fence.as_ref()).unwrap();

    let surface = device.map_staging_surface(staging.as_ref(), fence.as_ref(), MapMode::Flush).unwrap();
    assert!(surface.row_pitch_in_pixels >= 3);
    assert_eq!(surface.height, 2);
    let raw = surface.pixel(1, 1, PixelFormat::B8G8R8A8);
    assert_eq!(raw, &[15, 30, 11, 255]);
    drop(surface);

    assert!(device.poll_fence(fence.as_ref()));
    device.unmap_staging_surface(staging.as_ref()).unwrap();
    assert!(device.unmap_staging_surface(staging.as_ref()).is_err());
}

#[test]
#[ignore] // Requires GPU
fn test_vulkan_poll_map_before_write_fails() {
    let device = create_device();
    let staging = device.create_staging_texture(1, 1, PixelFormat::G8).unwrap();
    let fence = device.create_fence("unwritten").unwrap();

    let result = device.map_staging_surface(staging.as_ref(), fence.as_ref(), MapMode::Poll);
    assert!(matches!(result, Err(Error::InvalidResource(_))));
}

#[test]
#[ignore] // Requires GPU
fn test_vulkan_write_fence_twice_fails() {
    let device = create_device();
    let fence = device.create_fence("twice").unwrap();
    device.write_fence(fence.as_ref()).unwrap();
    assert!(device.write_fence(fence.as_ref()).is_err());
}

#[test]
#[ignore] // Requires GPU
fn test_vulkan_abandoned_copy_is_not_submitted_with_next_fence() {
    let device = create_device();
    let source = device
        .create_texture(TextureDesc::render_target("rt", 4, 4, PixelFormat::B8G8R8A8).with_data(gradient_bgra(4, 4)))
        .unwrap();

    let staging = device.create_staging_texture(4, 4, PixelFormat::B8G8R8A8).unwrap();
    device.transition(source.as_ref(), ResourceAccess::Unknown, ResourceAccess::CopySrc).unwrap();
    device
        .copy_region(
            source.as_ref(),
            staging.as_ref(),
            &CopyTextureInfo { source_position: UVec2::ZERO, dest_position: UVec2::ZERO, size: UVec2::new(4, 4) },
        )
        .unwrap();
    device.abandon_recorded().unwrap();
    drop(staging);

    // Nothing pending: the fence rides an empty submission
    let fence = device.create_fence("after-abandon").unwrap();
    device.write_fence(fence.as_ref()).unwrap();
    device.wait_idle().unwrap();
    assert!(device.poll_fence(fence.as_ref()));

    // Tracked layout matches the executed barrier
    let again = device.create_staging_texture(1, 1, PixelFormat::B8G8R8A8).unwrap();
    device.transition(source.as_ref(), ResourceAccess::CopySrc, ResourceAccess::CopySrc).unwrap();
    device
        .copy_region(
            source.as_ref(),
            again.as_ref(),
            &CopyTextureInfo { source_position: UVec2::new(1, 2), dest_position: UVec2::ZERO, size: UVec2::ONE },
        )
        .unwrap();
    device.transition(again.as_ref(), ResourceAccess::CopyDest, ResourceAccess::CopySrc).unwrap();
    let fence = device.create_fence("second").unwrap();
    device.write_fence(fence.as_ref()).unwrap();
    let surface = device.map_staging_surface(again.as_ref(), fence.as_ref(), MapMode::Flush).unwrap();
    assert_eq!(surface.pixel(0, 0, PixelFormat::B8G8R8A8), &[3, 10, 3, 255]);
    drop(surface);
    device.unmap_staging_surface(again.as_ref()).unwrap();
}

#[test]
#[ignore] // Requires GPU
fn test_vulkan_abandon_with_nothing_recorded_is_a_no_op() {
    let device = create_device();
    device.abandon_recorded().unwrap();
    device.abandon_recorded().unwrap();
}

// ============================================================================
// PIPELINE TESTS
// ============================================================================

#[test]
#[ignore] // Requires GPU
fn test_vulkan_pipeline_single_pixel() {
    let host = Host::new();
    let source = host
        .device
        .create_texture(TextureDesc::render_target("rt", 16, 16, PixelFormat::B8G8R8A8).with_data(gradient_bgra(16, 16)))
        .unwrap();

    let result = host.read(ReadbackRequest::pixel(source, 7, 9));

    assert_eq!(result, ReadbackResult::Pixel(expected_bgra(7, 9)));
}

#[test]
#[ignore] // Requires GPU
fn test_vulkan_pipeline_region_strips_row_padding() {
    let host = Host::new();
    let source: Arc<dyn Texture> = host
        .device
        .create_texture(TextureDesc::render_target("rt", 20, 12, PixelFormat::B8G8R8A8).with_data(gradient_bgra(20, 12)))
        .unwrap();

    let result = host.read(ReadbackRequest::rect(source, 3, 2, 5, 4));

    let ReadbackResult::Pixels { width, height, colors } = result else {
        panic!("expected a pixel block");
    };
    assert_eq!((width, height), (5, 4));
    for y in 0..4 {
        for x in 0..5 {
            assert_eq!(colors[(y * 5 + x) as usize], expected_bgra(x + 3, y + 2));
        }
    }
}

#[test]
#[ignore] // Requires GPU
fn test_vulkan_flush_and_poll_agree() {
    let host = Host::new();
    let data: Vec<u8> = (0..8 * 8).map(|i| (i * 4) as u8).collect();
    let source = host
        .device
        .create_texture(TextureDesc::render_target("rt", 8, 8, PixelFormat::G8).with_data(data))
        .unwrap();

    let polled = host.read(ReadbackRequest::entire_surface(source.clone()));
    let flushed = host.read(ReadbackRequest::entire_surface(source).with_flush_mode(FlushMode::Flush));

    assert!(polled.bit_eq(&flushed));
}

#[test]
#[ignore] // Requires GPU
fn test_vulkan_pipeline_hdr_surface() {
    let host = Host::new();
    let values = [4.0f32, -1.0, 0.5, 1.0];
    let data: Vec<u8> = values.iter().flat_map(|v| v.to_ne_bytes()).collect();
    let source = host
        .device
        .create_texture(TextureDesc::render_target("hdr", 1, 1, PixelFormat::A32B32G32R32F).with_data(data))
        .unwrap();

    let result = host.read(ReadbackRequest::entire_surface(source));

    assert_eq!(result.colors(), &[LinearColor::new(4.0, -1.0, 0.5, 1.0)]);
}
