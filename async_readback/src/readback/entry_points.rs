/// Free functions using the readback context registered in [`Engine`]

use std::sync::Arc;

use crate::device::Texture;
use crate::engine::Engine;
use crate::error::Result;
use crate::readback::{FlushMode, ReadbackHandle, ReadbackRequest, ReadbackResult, RegionRequest};

/// Read one pixel of `source`, delivered as `ReadbackResult::Pixel`
///
/// Coordinates are clamped into the texture. Uses the context's default
/// flush mode.
///
/// # Errors
///
/// If no readback context is registered.
pub fn read_render_target_pixel<F>(source: Arc<dyn Texture>, x: i32, y: i32, callback: F) -> Result<ReadbackHandle>
where
    F: FnOnce(ReadbackResult) + Send + 'static,
{
    let context = Engine::readback_context()?;
    Ok(context.request_readback(ReadbackRequest::pixel(source, x, y), callback))
}

/// Read all of `source`, delivered as row-major `ReadbackResult::Pixels`
///
/// `flush` maps right after the copy instead of polling the fence.
pub fn read_entire_render_target<F>(source: Arc<dyn Texture>, flush: bool, callback: F) -> Result<ReadbackHandle>
where
    F: FnOnce(ReadbackResult) + Send + 'static,
{
    let context = Engine::readback_context()?;
    let mode = if flush { FlushMode::Flush } else { FlushMode::Poll };
    Ok(context.request_readback(ReadbackRequest::entire_surface(source).with_flush_mode(mode), callback))
}

/// Read a rectangle of `source`; the rectangle is clamped into the texture
pub fn read_render_target_region<F>(
    source: Arc<dyn Texture>,
    region: RegionRequest,
    flush_mode: FlushMode,
    callback: F,
) -> Result<ReadbackHandle>
where
    F: FnOnce(ReadbackResult) + Send + 'static,
{
    let context = Engine::readback_context()?;
    let request = ReadbackRequest {
        source,
        region,
        flush_mode: Some(flush_mode),
    };
    Ok(context.request_readback(request, callback))
}
