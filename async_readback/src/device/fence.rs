/// GPU completion fence

use std::any::Any;

/// One-shot GPU completion signal
///
/// Created once per readback session and never reused. Signaled by the GPU
/// once every command submitted before `ReadbackDevice::write_fence` retired.
pub trait GpuFence: Send + Sync {
    /// Debug name given at creation
    fn name(&self) -> &str;

    /// Backend downcasting
    fn as_any(&self) -> &dyn Any;
}
