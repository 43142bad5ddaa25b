/// Device module - GPU resource traits consumed by the readback pipeline

pub mod texture;
pub mod fence;
pub mod readback_device;

// Mock readback device for tests (no GPU required)
#[cfg(any(test, feature = "testing"))]
pub mod mock_device;

pub use texture::*;
pub use fence::*;
pub use readback_device::*;
