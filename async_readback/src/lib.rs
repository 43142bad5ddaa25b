/*!
# Async Readback

Asynchronous GPU render-target readback.

A readback copies a region of a GPU texture into a CPU-readable staging
texture, waits for the copy on the GPU timeline without stalling either
thread, decodes the pixels and hands them back to the consumer thread.

## Architecture

- **device**: `ReadbackDevice`, `Texture` and `GpuFence` traits implemented by a backend
- **scheduler**: the rendering domain (`RenderThread`, `DeferredRenderQueue`) and the
  consumer domain (`FrameTicker`)
- **format**: pixel formats, `LinearColor` and the decoder registry
- **readback**: sessions, the copy and poll stages, completion dispatch and the
  `ReadbackContext` entry point

Backend implementations (Vulkan, ...) live in their own crates.
*/

// Internal modules
mod error;
mod engine;
pub mod log;
pub mod format;
pub mod device;
pub mod scheduler;
pub mod readback;

// Error types
pub use crate::error::{Error, Result};

// Engine singleton
pub use crate::engine::Engine;

pub use crate::readback::{
    read_entire_render_target, read_render_target_pixel, read_render_target_region, FlushMode,
    ReadbackConfig, ReadbackContext, ReadbackHandle, ReadbackRequest, ReadbackResult,
};

// Re-export math library at crate root
pub use glam;
