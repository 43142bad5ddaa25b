/// Copy-and-fence: runs once per session on the rendering domain

use glam::UVec2;

use crate::device::{CopyTextureInfo, GpuFence, MapMode, ReadbackDevice, ResourceAccess, Texture};
use crate::error::Result;
use crate::format::PixelDecoderRegistry;
use crate::readback::{poll_and_map, FlushMode, ReadbackSession};
use crate::scheduler::assert_render_domain;

/// Copy the session region into a fresh staging texture and fence it
///
/// In `FlushMode::Flush` the session is mapped and decoded right away.
///
/// # Panics
///
/// Outside the rendering domain, or if the source texture is no longer
/// allocated.
pub fn copy_and_fence(session: &ReadbackSession, device: &dyn ReadbackDevice, decoders: &PixelDecoderRegistry) {
    assert_render_domain("copy_and_fence");
    assert!(
        session.source().is_allocated(),
        "readback #{}: source texture is not allocated",
        session.id()
    );

    if let Err(error) = issue_copy(session, device) {
        session.fail("copy", &error);
        return;
    }
    crate::engine_trace!("readback::copy", "Readback #{} copy issued", session.id());

    if session.flush_mode() == FlushMode::Flush {
        poll_and_map(session, device, decoders, MapMode::Flush);
    }
}

fn issue_copy(session: &ReadbackSession, device: &dyn ReadbackDevice) -> Result<()> {
    let source = session.source();
    let region = session.region();

    // Every resource exists before the first command is recorded
    let fence = device.create_fence(&format!("AsyncReadback#{}", session.id()))?;
    let staging = device.create_staging_texture(region.width, region.height, source.info().format)?;

    if let Err(error) = record_copy(session, device, staging.as_ref(), fence.as_ref()) {
        // Pending commands may still write into `staging`
        if let Err(abandon_error) = device.abandon_recorded() {
            crate::engine_warn!(
                "readback::copy",
                "Readback #{}: failed to abandon recorded commands: {}",
                session.id(),
                abandon_error
            );
        }
        return Err(error);
    }

    session.populate(staging, fence);
    Ok(())
}

fn record_copy(
    session: &ReadbackSession,
    device: &dyn ReadbackDevice,
    staging: &dyn Texture,
    fence: &dyn GpuFence,
) -> Result<()> {
    let source = session.source();
    let region = session.region();

    device.transition(source, ResourceAccess::Unknown, ResourceAccess::CopySrc)?;
    device.transition(staging, ResourceAccess::Unknown, ResourceAccess::CopyDest)?;
    device.copy_region(
        source,
        staging,
        &CopyTextureInfo {
            source_position: UVec2::new(region.x, region.y),
            dest_position: UVec2::ZERO,
            size: UVec2::new(region.width, region.height),
        },
    )?;
    device.transition(staging, ResourceAccess::CopyDest, ResourceAccess::CopySrc)?;
    device.write_fence(fence)
}

#[cfg(test)]
#[path = "copy_stage_tests.rs"]
mod tests;
