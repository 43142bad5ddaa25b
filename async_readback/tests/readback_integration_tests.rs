//! Integration tests for the readback pipeline
//!
//! Runs the full request -> copy -> poll -> dispatch chain on a real render
//! thread with the mock device (`testing` feature). No GPU required.
//!
//! Run with: cargo test --test readback_integration_tests

use async_readback::device::mock_device::MockDevice;
use async_readback::device::{ReadbackDevice, Texture, TextureDesc};
use async_readback::format::{LinearColor, PixelFormat};
use async_readback::log::{LogEntry, LogSeverity, Logger};
use async_readback::readback::{ReadbackHandle, ReadbackRegion, RegionRequest, SessionState};
use async_readback::scheduler::{FrameTicker, RenderThread};
use async_readback::{
    Engine, FlushMode, ReadbackConfig, ReadbackContext, ReadbackRequest, ReadbackResult,
};
use serial_test::serial;
use std::sync::{Arc, Mutex};

// ============================================================================
// TEST HELPERS
// ============================================================================

/// Test logger that captures log entries for verification
struct TestLogger {
    entries: Arc<Mutex<Vec<LogEntry>>>,
}

impl TestLogger {
    fn new() -> (Self, Arc<Mutex<Vec<LogEntry>>>) {
        let entries = Arc::new(Mutex::new(Vec::new()));
        (Self { entries: entries.clone() }, entries)
    }
}

impl Logger for TestLogger {
    fn log(&self, entry: &LogEntry) {
        self.entries.lock().unwrap().push(entry.clone());
    }
}

struct Host {
    device: Arc<MockDevice>,
    render: Arc<RenderThread>,
    ticker: Arc<FrameTicker>,
    context: ReadbackContext,
}

impl Host {
    fn new(latency_polls: u32) -> Self {
        // Odd padding so every row of a staging surface is misaligned
        let device = Arc::new(MockDevice::with_row_padding(13).with_fence_latency(latency_polls));
        let render = Arc::new(RenderThread::spawn(device.clone()).unwrap());
        let ticker = Arc::new(FrameTicker::new());
        let context = ReadbackContext::new(render.clone(), ticker.clone()).with_config(ReadbackConfig {
            log_completion: false,
            ..ReadbackConfig::default()
        });
        Self { device, render, ticker, context }
    }

    fn texture(&self, width: u32, height: u32, format: PixelFormat, data: Vec<u8>) -> Arc<dyn Texture> {
        self.device
            .create_texture(TextureDesc::render_target("rt", width, height, format).with_data(data))
            .unwrap()
    }

    /// Tick until the handle dispatched; returns the number of frames
    fn run_until_dispatched(&self, handle: &ReadbackHandle) -> usize {
        for frame in 1..=200 {
            self.render.flush();
            self.ticker.tick();
            if handle.is_dispatched() {
                return frame;
            }
        }
        panic!("readback #{} never dispatched", handle.session_id());
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
}

fn bgra_4x4_with_red_at_2_1() -> Vec<u8> {
    let mut data = vec![0u8; 4 * 4 * 4];
    let offset = (4 + 2) * 4;
    data[offset..offset + 4].copy_from_slice(&[0, 0, 255, 255]);
    data
}

// ============================================================================
// SCENARIOS
// ============================================================================

#[test]
fn test_integration_bgra_pixel() {
    let host = Host::new(3);
    let source = host.texture(4, 4, PixelFormat::B8G8R8A8, bgra_4x4_with_red_at_2_1());

    let result = host.read(ReadbackRequest::pixel(source, 2, 1));

    assert_eq!(result, ReadbackResult::Pixel(LinearColor::new(1.0, 0.0, 0.0, 1.0)));
}

#[test]
fn test_integration_g8_whole_surface() {
    let host = Host::new(2);
    let source = host.texture(2, 2, PixelFormat::G8, vec![10, 20, 40, 80]);

    let result = host.read(ReadbackRequest::entire_surface(source));

    let ReadbackResult::Pixels { width, height, colors } = result else {
        panic!("expected a pixel array");
    };
    assert_eq!((width, height), (2, 2));
    for (color, want) in colors.iter().zip([0.039, 0.078, 0.157, 0.314]) {
        assert!(color.abs_diff_eq(LinearColor::new(want, want, want, 1.0), 1.0 / 255.0));
    }
}

#[test]
fn test_integration_result_size_matches_region() {
    let host = Host::new(1);
    let data: Vec<u8> = (0..(7 * 5)).map(|v| v as u8).collect();
    let source = host.texture(7, 5, PixelFormat::G8, data);

    for (x, y, w, h) in [(0, 0, 7, 5), (2, 1, 3, 3), (6, 4, 4, 4), (-3, 2, 2, 1)] {
        let result = host.read(ReadbackRequest::rect(source.clone(), x, y, w, h));
        let region = RegionRequest::Rect { x, y, width: w, height: h }.resolve(7, 5);
        assert_eq!(result.colors().len(), region.pixel_count());

        // Row-major, matching the source values
        for ry in 0..region.height {
            for rx in 0..region.width {
                let expected = ((region.y + ry) * 7 + region.x + rx) as f32 / 255.0;
                assert_eq!(result.get(rx, ry).unwrap().r, expected);
            }
        }
    }
}

#[test]
fn test_integration_flush_and_poll_bit_identical() {
    let host = Host::new(4);
    let data: Vec<u8> = (0..16 * 8 * 16).map(|v| (v * 31 % 251) as u8).collect();
    let source = host.texture(16, 8, PixelFormat::A32B32G32R32F, data);

    let polled = host.read(ReadbackRequest::entire_surface(source.clone()).with_flush_mode(FlushMode::Poll));
    let flushed = host.read(ReadbackRequest::entire_surface(source).with_flush_mode(FlushMode::Flush));

    assert!(polled.bit_eq(&flushed));
}

#[test]
fn test_integration_flush_mode_dispatches_on_first_frame() {
    let host = Host::new(1000);
    let source = host.texture(4, 4, PixelFormat::B8G8R8A8, bgra_4x4_with_red_at_2_1());
    let handle = host.context.request_readback(
        ReadbackRequest::entire_surface(source).with_flush_mode(FlushMode::Flush),
        |_| {},
    );
    assert_eq!(host.run_until_dispatched(&handle), 1);
}

#[test]
fn test_integration_clamped_pixel() {
    let host = Host::new(1);
    let mut data = vec![0u8; 4 * 4 * 4];
    data[60..64].copy_from_slice(&[255, 0, 0, 255]);
    let source = host.texture(4, 4, PixelFormat::B8G8R8A8, data);

    let result = host.read(ReadbackRequest::pixel(source, 4, 4));

    assert_eq!(result, ReadbackResult::Pixel(LinearColor::new(0.0, 0.0, 1.0, 1.0)));
}

#[test]
fn test_integration_hdr_values_survive() {
    let host = Host::new(1);
    let data: Vec<u8> = [4.0f32, -2.0, 0.5, 1.0].iter().flat_map(|v| v.to_ne_bytes()).collect();
    let source = host.texture(1, 1, PixelFormat::A32B32G32R32F, data);

    let result = host.read(ReadbackRequest::pixel(source, 0, 0));

    assert_eq!(result, ReadbackResult::Pixel(LinearColor::new(4.0, -2.0, 0.5, 1.0)));
}

#[test]
fn test_integration_dropped_handle_never_calls_back() {
    let host = Host::new(2);
    let source = host.texture(2, 2, PixelFormat::G8, vec![1, 2, 3, 4]);
    let called = Arc::new(Mutex::new(false));
    let flag = called.clone();

    let handle = host.context.request_readback(ReadbackRequest::entire_surface(source), move |_| {
        *flag.lock().unwrap() = true;
    });
    host.ticker.tick();
    drop(handle);

    for _ in 0..10 {
        host.render.flush();
        host.ticker.tick();
    }

    assert!(!*called.lock().unwrap());
    assert_eq!(host.ticker.pending_count(), 0);
}

#[test]
fn test_integration_every_map_is_unmapped() {
    let host = Host::new(2);
    let source = host.texture(3, 3, PixelFormat::R8G8B8A8, vec![9; 36]);
    for mode in [FlushMode::Poll, FlushMode::Flush, FlushMode::Poll] {
        host.read(ReadbackRequest::entire_surface(source.clone()).with_flush_mode(mode));
    }
    host.render.flush();
    assert_eq!(host.device.map_count(), 3);
    assert_eq!(host.device.unmap_count(), 3);
}

#[test]
fn test_integration_handle_state_progression() {
    let host = Host::new(3);
    let source = host.texture(2, 2, PixelFormat::G8, vec![0; 4]);
    let handle = host.context.request_readback(ReadbackRequest::entire_surface(source), |_| {});
    assert_eq!(handle.region(), ReadbackRegion { x: 0, y: 0, width: 2, height: 2 });

    let mut seen = vec![handle.state()];
    for _ in 0..20 {
        host.render.flush();
        host.ticker.tick();
        let state = handle.state();
        if seen.last() != Some(&state) {
            seen.push(state);
        }
    }

    // Never goes backwards
    assert!(seen.windows(2).all(|w| w[0] < w[1]));
    assert_eq!(seen.last(), Some(&SessionState::Dispatched));
}

// ============================================================================
// LOGGING / ENGINE SCENARIOS (global state, serial)
// ============================================================================

#[test]
#[serial]
fn test_integration_unsupported_format_still_dispatches() {
    let (logger, entries) = TestLogger::new();
    Engine::set_logger(logger);

    let host = Host::new(1);
    let source = host.texture(2, 2, PixelFormat::D32Float, vec![0; 16]);
    let slot = Arc::new(Mutex::new(None));
    let sink = slot.clone();
    let handle = host.context.request_readback(ReadbackRequest::entire_surface(source), move |r| {
        *sink.lock().unwrap() = Some(r);
    });
    host.run_until_dispatched(&handle);

    Engine::reset_logger();

    assert_eq!(handle.state(), SessionState::Dispatched);
    let result = slot.lock().unwrap().take().unwrap();
    assert!(result.colors().iter().all(|c| *c == LinearColor::TRANSPARENT));

    let tag = format!("#{}:", handle.session_id());
    let warnings: Vec<_> = entries
        .lock()
        .unwrap()
        .iter()
        .filter(|e| e.severity == LogSeverity::Warn && e.message.contains(&tag))
        .cloned()
        .collect();
    assert_eq!(warnings.len(), 1);
    assert!(warnings[0].message.contains("D32Float"));
}

#[test]
#[serial]
fn test_integration_entry_points_use_engine_context() {
    Engine::initialize().unwrap();
    let _ = Engine::destroy_readback_context();

    let host = Host::new(2);
    Engine::create_readback_context(host.context.clone()).unwrap();

    let source = host.texture(4, 4, PixelFormat::B8G8R8A8, bgra_4x4_with_red_at_2_1());
    let pixel = Arc::new(Mutex::new(None));
    let entire = Arc::new(Mutex::new(None));
    let region = Arc::new(Mutex::new(None));

    let (p, e, r) = (pixel.clone(), entire.clone(), region.clone());
    let h1 = async_readback::read_render_target_pixel(source.clone(), 2, 1, move |res| {
        *p.lock().unwrap() = Some(res);
    })
    .unwrap();
    let h2 = async_readback::read_entire_render_target(source.clone(), true, move |res| {
        *e.lock().unwrap() = Some(res);
    })
    .unwrap();
    let h3 = async_readback::read_render_target_region(
        source,
        RegionRequest::Rect { x: 1, y: 1, width: 2, height: 1 },
        FlushMode::Poll,
        move |res| *r.lock().unwrap() = Some(res),
    )
    .unwrap();

    assert_eq!(h2.flush_mode(), FlushMode::Flush);
    for handle in [&h1, &h2, &h3] {
        host.run_until_dispatched(handle);
    }
    Engine::destroy_readback_context().unwrap();

    let red = LinearColor::new(1.0, 0.0, 0.0, 1.0);
    assert_eq!(pixel.lock().unwrap().clone(), Some(ReadbackResult::Pixel(red)));
    assert_eq!(entire.lock().unwrap().as_ref().unwrap().get(2, 1), Some(red));
    let region = region.lock().unwrap().clone().unwrap();
    assert_eq!(region.colors().len(), 2);
    assert_eq!(region.get(1, 0), Some(red));
}

#[test]
#[serial]
fn test_integration_entry_points_without_context_fail() {
    Engine::initialize().unwrap();
    let _ = Engine::destroy_readback_context();

    let host = Host::new(1);
    let source = host.texture(1, 1, PixelFormat::G8, vec![0]);
    let result = async_readback::read_render_target_pixel(source, 0, 0, |_| {});

    assert!(result.is_err());
}
