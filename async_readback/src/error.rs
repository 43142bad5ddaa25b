//! Error types for the readback pipeline
//!
//! Only recoverable conditions are modelled here (device failures, bad
//! descriptors, missing singletons). Precondition and host-contract violations
//! are programming errors and panic instead.

use std::fmt;

use crate::format::PixelFormat;

/// Result type for readback operations
pub type Result<T> = std::result::Result<T, Error>;

/// Readback errors
#[derive(Debug, Clone)]
pub enum Error {
    /// Backend-specific error (Vulkan, mock device, etc.)
    BackendError(String),

    /// Out of GPU memory (staging allocation failed)
    OutOfMemory,

    /// Invalid resource (texture, fence, staging surface)
    InvalidResource(String),

    /// Initialization failed (engine, device, readback context)
    InitializationFailed(String),

    /// No decoder is registered for the pixel format
    UnsupportedFormat(PixelFormat),

    /// A non-blocking map was attempted before the fence signaled
    FenceNotSignaled(String),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::BackendError(msg) => write!(f, "Backend error: {}", msg),
            Error::OutOfMemory => write!(f, "Out of GPU memory"),
            Error::InvalidResource(msg) => write!(f, "Invalid resource: {}", msg),
            Error::InitializationFailed(msg) => write!(f, "Initialization failed: {}", msg),
            Error::UnsupportedFormat(format) => write!(f, "Unsupported pixel format: {:?}", format),
            Error::FenceNotSignaled(name) => write!(f, "Fence '{}' has not signaled yet", name),
        }
    }
}

impl std::error::Error for Error {}

#[cfg(test)]
#[path = "error_tests.rs"]
mod tests;
