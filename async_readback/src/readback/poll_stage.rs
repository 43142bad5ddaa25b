/// Poll-and-map: runs on the rendering domain until the fence signals

use crate::device::{MapMode, MappedSurface, ReadbackDevice, Texture};
use crate::format::{LinearColor, PixelDecoderRegistry, PixelFormat};
use crate::readback::{ReadbackRegion, ReadbackResult, ReadbackSession};
use crate::scheduler::assert_render_domain;

/// Unmaps the staging texture when dropped, including during a panic
struct MappedStaging<'a> {
    device: &'a dyn ReadbackDevice,
    staging: &'a dyn Texture,
    session_id: u64,
}

impl Drop for MappedStaging<'_> {
    fn drop(&mut self) {
        if let Err(error) = self.device.unmap_staging_surface(self.staging) {
            crate::engine_error!(
                "readback::poll",
                "Readback #{}: unmap failed: {}",
                self.session_id,
                error
            );
        }
    }
}

/// Map the staging copy, decode the region and finish the session
///
/// `MapMode::Poll` returns without side effects while the fence is missing
/// or unsignaled. `MapMode::Flush` blocks until the copy retired. Calling
/// this on a finished session does nothing.
///
/// # Panics
///
/// Outside the rendering domain, or when the device reports a row pitch
/// narrower than the region or a height different from it.
pub fn poll_and_map(
    session: &ReadbackSession,
    device: &dyn ReadbackDevice,
    decoders: &PixelDecoderRegistry,
    mode: MapMode,
) {
    assert_render_domain("poll_and_map");

    if session.is_finished() {
        return;
    }
    let (Some(staging), Some(fence)) = (session.staging(), session.fence()) else {
        return;
    };
    if mode == MapMode::Poll && !device.poll_fence(fence) {
        return;
    }

    let mapped = match device.map_staging_surface(staging, fence, mode) {
        Ok(mapped) => mapped,
        Err(error) => {
            session.fail("map", &error);
            return;
        }
    };
    let unmap = MappedStaging { device, staging, session_id: session.id() };

    let result = decode_surface(session, staging.info().format, &mapped, decoders);
    drop(mapped);
    drop(unmap);

    session.finalize(result);
    crate::engine_trace!("readback::poll", "Readback #{} decoded", session.id());
}

fn decode_surface(
    session: &ReadbackSession,
    format: PixelFormat,
    mapped: &MappedSurface<'_>,
    decoders: &PixelDecoderRegistry,
) -> ReadbackResult {
    let region: ReadbackRegion = session.region();
    assert!(
        mapped.row_pitch_in_pixels >= region.width,
        "readback #{}: row pitch {} is narrower than width {}",
        session.id(),
        mapped.row_pitch_in_pixels,
        region.width
    );
    assert_eq!(
        mapped.height,
        region.height,
        "readback #{}: mapped height does not match the region",
        session.id()
    );

    let Some(decoder) = decoders.get(format) else {
        crate::engine_warn!(
            "readback::poll",
            "Readback #{}: unsupported render target format {:?}, pixels left at default",
            session.id(),
            format
        );
        return ReadbackResult::filled(region, session.is_single_pixel());
    };

    if session.is_single_pixel() {
        return ReadbackResult::Pixel((decoder.decode)(mapped.pixel(0, 0, format)));
    }

    let mut colors: Vec<LinearColor> = Vec::with_capacity(region.pixel_count());
    for y in 0..region.height {
        for x in 0..region.width {
            colors.push((decoder.decode)(mapped.pixel(x, y, format)));
        }
    }
    ReadbackResult::Pixels {
        width: region.width,
        height: region.height,
        colors,
    }
}

#[cfg(test)]
#[path = "poll_stage_tests.rs"]
mod tests;
