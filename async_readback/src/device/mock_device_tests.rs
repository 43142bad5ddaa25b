//! Unit tests for mock_device.rs

use crate::device::mock_device::*;
use crate::device::*;
use crate::error::Error;
use crate::format::PixelFormat;
use glam::UVec2;

fn source_4x2(device: &MockDevice) -> std::sync::Arc<dyn Texture> {
    let data: Vec<u8> = (0..8u8).collect();
    device
        .create_texture(TextureDesc::render_target("source", 4, 2, PixelFormat::G8).with_data(data))
        .unwrap()
}

#[test]
fn test_create_texture_rejects_wrong_data_size() {
    let device = MockDevice::new();
    let desc = TextureDesc::render_target("bad", 2, 2, PixelFormat::B8G8R8A8).with_data(vec![0; 3]);
    assert!(matches!(device.create_texture(desc), Err(Error::InvalidResource(_))));
}

#[test]
fn test_staging_texture_has_readback_usage() {
    let device = MockDevice::new();
    let staging = device.create_staging_texture(3, 2, PixelFormat::R16F).unwrap();
    assert!(staging.info().is_staging());
    assert_eq!(staging.info().width, 3);
}

#[test]
fn test_copy_region_with_padding() {
    let device = MockDevice::with_row_padding(2);
    let source = source_4x2(&device);
    let staging = device.create_staging_texture(2, 2, PixelFormat::G8).unwrap();
    let info = CopyTextureInfo {
        source_position: UVec2::new(1, 0),
        dest_position: UVec2::ZERO,
        size: UVec2::new(2, 2),
    };
    device.copy_region(source.as_ref(), staging.as_ref(), &info).unwrap();

    let fence = device.create_fence("copy").unwrap();
    device.write_fence(fence.as_ref()).unwrap();
    let mapped = device
        .map_staging_surface(staging.as_ref(), fence.as_ref(), MapMode::Flush)
        .unwrap();

    assert_eq!(mapped.row_pitch_in_pixels, 4);
    assert_eq!(mapped.height, 2);
    assert_eq!(mapped.pixel(0, 0, PixelFormat::G8), &[1]);
    assert_eq!(mapped.pixel(1, 0, PixelFormat::G8), &[2]);
    assert_eq!(mapped.pixel(0, 1, PixelFormat::G8), &[5]);
    assert_eq!(mapped.pixel(2, 0, PixelFormat::G8), &[0xCD]);
}

#[test]
fn test_fence_stays_unsignaled_until_told() {
    let device = MockDevice::new();
    let fence = device.create_fence("f").unwrap();
    assert!(!device.poll_fence(fence.as_ref()));

    device.write_fence(fence.as_ref()).unwrap();
    assert!(!device.poll_fence(fence.as_ref()));

    device.signal_fences();
    assert!(device.poll_fence(fence.as_ref()));
}

#[test]
fn test_unwritten_fence_is_not_signaled_by_signal_fences() {
    let device = MockDevice::new();
    let fence = device.create_fence("f").unwrap();
    device.signal_fences();
    assert!(!device.poll_fence(fence.as_ref()));
}

#[test]
fn test_auto_signal() {
    let device = MockDevice::new();
    device.set_auto_signal(true);
    let fence = device.create_fence("f").unwrap();
    device.write_fence(fence.as_ref()).unwrap();
    assert!(device.poll_fence(fence.as_ref()));
}

#[test]
fn test_poll_map_requires_signaled_fence() {
    let device = MockDevice::new();
    let staging = device.create_staging_texture(1, 1, PixelFormat::G8).unwrap();
    let fence = device.create_fence("f").unwrap();
    device.write_fence(fence.as_ref()).unwrap();

    let result = device.map_staging_surface(staging.as_ref(), fence.as_ref(), MapMode::Poll);
    assert!(matches!(result, Err(Error::FenceNotSignaled(_))));
}

#[test]
fn test_double_map_is_rejected_until_unmapped() {
    let device = MockDevice::new();
    device.set_auto_signal(true);
    let staging = device.create_staging_texture(1, 1, PixelFormat::G8).unwrap();
    let fence = device.create_fence("f").unwrap();
    device.write_fence(fence.as_ref()).unwrap();

    let first = device.map_staging_surface(staging.as_ref(), fence.as_ref(), MapMode::Poll);
    assert!(first.is_ok());
    let second = device.map_staging_surface(staging.as_ref(), fence.as_ref(), MapMode::Poll);
    assert!(second.is_err());

    device.unmap_staging_surface(staging.as_ref()).unwrap();
    let third = device.map_staging_surface(staging.as_ref(), fence.as_ref(), MapMode::Poll);
    assert!(third.is_ok());
}

#[test]
fn test_failure_injection_is_one_shot() {
    let device = MockDevice::new();
    device.fail_next_staging_allocation();
    assert!(matches!(
        device.create_staging_texture(1, 1, PixelFormat::G8),
        Err(Error::OutOfMemory)
    ));
    assert!(device.create_staging_texture(1, 1, PixelFormat::G8).is_ok());
}

#[test]
fn test_commands_are_recorded_in_order() {
    let device = MockDevice::new();
    let source = source_4x2(&device);
    device
        .transition(source.as_ref(), ResourceAccess::Unknown, ResourceAccess::CopySrc)
        .unwrap();
    let fence = device.create_fence("f").unwrap();
    device.write_fence(fence.as_ref()).unwrap();

    let commands = device.commands();
    assert_eq!(commands.len(), 4);
    assert!(matches!(commands[0], MockCommand::CreateTexture { .. }));
    assert_eq!(
        commands[1],
        MockCommand::Transition {
            texture: "source".to_string(),
            from: ResourceAccess::Unknown,
            to: ResourceAccess::CopySrc,
        }
    );
    assert_eq!(commands[3], MockCommand::WriteFence("f".to_string()));
}

#[test]
fn test_released_texture_is_not_allocated() {
    let device = MockDevice::new();
    let source = source_4x2(&device);
    assert!(source.is_allocated());
    source.as_any().downcast_ref::<MockTexture>().unwrap().release();
    assert!(!source.is_allocated());
}

#[test]
fn test_fence_latency_signals_after_enough_polls() {
    let device = MockDevice::new().with_fence_latency(3);
    let fence = device.create_fence("slow").unwrap();
    assert!(!device.poll_fence(fence.as_ref()));

    device.write_fence(fence.as_ref()).unwrap();
    assert!(!device.poll_fence(fence.as_ref()));
    assert!(!device.poll_fence(fence.as_ref()));
    assert!(device.poll_fence(fence.as_ref()));
}

#[test]
fn test_fence_failure_injection_is_one_shot() {
    let device = MockDevice::new();
    device.fail_next_fence();
    assert!(matches!(device.create_fence("a"), Err(Error::OutOfMemory)));

    let fence = device.create_fence("b").unwrap();
    device.fail_next_fence_write();
    assert!(matches!(device.write_fence(fence.as_ref()), Err(Error::BackendError(_))));
    assert!(!fence.as_any().downcast_ref::<MockFence>().unwrap().is_written());
    device.write_fence(fence.as_ref()).unwrap();
}

#[test]
fn test_copy_into_released_staging_is_reported_as_dangling() {
    let device = MockDevice::new();
    let source = source_4x2(&device);
    let staging = device.create_staging_texture(1, 1, PixelFormat::G8).unwrap();
    let info = CopyTextureInfo {
        source_position: UVec2::ZERO,
        dest_position: UVec2::ZERO,
        size: UVec2::ONE,
    };
    device.copy_region(source.as_ref(), staging.as_ref(), &info).unwrap();
    assert_eq!(device.unfenced_copy_count(), 1);

    drop(staging);
    assert_eq!(device.live_staging_count(), 0);
    let fence = device.create_fence("late").unwrap();
    device.write_fence(fence.as_ref()).unwrap();

    assert_eq!(device.dangling_copy_count(), 1);
    assert_eq!(device.unfenced_copy_count(), 0);
}

#[test]
fn test_abandon_while_staging_alive_is_clean() {
    let device = MockDevice::new();
    let source = source_4x2(&device);
    let staging = device.create_staging_texture(1, 1, PixelFormat::G8).unwrap();
    let info = CopyTextureInfo {
        source_position: UVec2::ZERO,
        dest_position: UVec2::ZERO,
        size: UVec2::ONE,
    };
    device.copy_region(source.as_ref(), staging.as_ref(), &info).unwrap();

    device.abandon_recorded().unwrap();
    drop(staging);

    assert_eq!(device.dangling_copy_count(), 0);
    assert_eq!(device.commands().last(), Some(&MockCommand::AbandonRecorded));
}

#[test]
fn test_map_and_unmap_counts() {
    let device = MockDevice::new();
    let staging = device.create_staging_texture(1, 1, PixelFormat::G8).unwrap();
    let fence = device.create_fence("f").unwrap();
    device.write_fence(fence.as_ref()).unwrap();

    // A map that fails does not count
    assert!(device.map_staging_surface(staging.as_ref(), fence.as_ref(), MapMode::Poll).is_err());
    device.map_staging_surface(staging.as_ref(), fence.as_ref(), MapMode::Flush).unwrap();
    device.unmap_staging_surface(staging.as_ref()).unwrap();

    assert_eq!(device.map_count(), 1);
    assert_eq!(device.unmap_count(), 1);
}
