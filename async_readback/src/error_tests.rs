//! Unit tests for error.rs
//!
//! Tests all Error variants and their implementations (Display, Debug, Clone, std::error::Error).

use crate::error::{Error, Result};
use crate::format::PixelFormat;

// ============================================================================
// ERROR DISPLAY TESTS
// ============================================================================

#[test]
fn test_backend_error_display() {
    let err = Error::BackendError("vkQueueSubmit failed".to_string());
    let display = format!("{}", err);
    assert!(display.contains("Backend error"));
    assert!(display.contains("vkQueueSubmit failed"));
}

#[test]
fn test_out_of_memory_display() {
    let err = Error::OutOfMemory;
    assert_eq!(format!("{}", err), "Out of GPU memory");
}

#[test]
fn test_invalid_resource_display() {
    let err = Error::InvalidResource("staging texture already unmapped".to_string());
    let display = format!("{}", err);
    assert!(display.contains("Invalid resource"));
    assert!(display.contains("already unmapped"));
}

#[test]
fn test_unsupported_format_display_names_the_format() {
    let err = Error::UnsupportedFormat(PixelFormat::D32Float);
    let display = format!("{}", err);
    assert!(display.contains("Unsupported pixel format"));
    assert!(display.contains("D32Float"));
}

#[test]
fn test_fence_not_signaled_display() {
    let err = Error::FenceNotSignaled("AsyncRTReadback".to_string());
    assert_eq!(format!("{}", err), "Fence 'AsyncRTReadback' has not signaled yet");
}

// ============================================================================
// ERROR TRAIT IMPLEMENTATIONS
// ============================================================================

#[test]
fn test_error_is_std_error() {
    let err = Error::OutOfMemory;
    let _: &dyn std::error::Error = &err;
}

#[test]
fn test_error_debug() {
    let debug = format!("{:?}", Error::InitializationFailed("init".to_string()));
    assert!(debug.contains("InitializationFailed"));

    let debug = format!("{:?}", Error::UnsupportedFormat(PixelFormat::G8));
    assert!(debug.contains("UnsupportedFormat"));
}

#[test]
fn test_error_clone() {
    let err1 = Error::BackendError("test".to_string());
    let err2 = err1.clone();
    assert_eq!(format!("{}", err1), format!("{}", err2));
}

#[test]
fn test_result_propagates_with_question_mark() {
    fn inner() -> Result<u32> {
        Err(Error::OutOfMemory)
    }
    fn outer() -> Result<u32> {
        let value = inner()?;
        Ok(value + 1)
    }
    assert!(matches!(outer(), Err(Error::OutOfMemory)));
}
