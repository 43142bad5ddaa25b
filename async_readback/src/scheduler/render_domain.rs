/// Rendering-domain scheduling and the domain marker

use std::cell::Cell;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use crate::device::ReadbackDevice;

/// Work executed on the rendering domain with device access
pub type RenderCommand = Box<dyn FnOnce(&dyn ReadbackDevice) + Send>;

/// Host render queue
///
/// Commands run in FIFO order, one at a time, with the rendering domain
/// marker active.
pub trait RenderDomain: Send + Sync {
    fn enqueue(&self, command: RenderCommand);
}

// ===== DOMAIN MARKER =====

thread_local! {
    static IN_RENDER_DOMAIN: Cell<bool> = const { Cell::new(false) };
}

/// Marks the current thread as executing rendering-domain work
///
/// The marker is cleared (restored) when the guard drops.
pub struct RenderDomainGuard {
    previous: bool,
}

impl RenderDomainGuard {
    pub fn enter() -> Self {
        let previous = IN_RENDER_DOMAIN.with(|flag| flag.replace(true));
        Self { previous }
    }

    pub fn is_active() -> bool {
        IN_RENDER_DOMAIN.with(Cell::get)
    }
}

impl Drop for RenderDomainGuard {
    fn drop(&mut self) {
        IN_RENDER_DOMAIN.with(|flag| flag.set(self.previous));
    }
}

/// Panic unless called from rendering-domain work
#[track_caller]
pub fn assert_render_domain(stage: &str) {
    assert!(
        RenderDomainGuard::is_active(),
        "{} must run on the rendering domain",
        stage
    );
}

// ===== DEFERRED QUEUE =====

/// Render queue drained by the host at the end of its frame
///
/// Equivalent of a post-render callback list: nothing runs until the host
/// calls [`DeferredRenderQueue::execute_pending`] on its render thread.
pub struct DeferredRenderQueue {
    device: Arc<dyn ReadbackDevice>,
    pending: Mutex<VecDeque<RenderCommand>>,
}

impl DeferredRenderQueue {
    pub fn new(device: Arc<dyn ReadbackDevice>) -> Self {
        Self {
            device,
            pending: Mutex::new(VecDeque::new()),
        }
    }

    pub fn device(&self) -> &Arc<dyn ReadbackDevice> {
        &self.device
    }

    pub fn pending_count(&self) -> usize {
        self.pending.lock().map(|p| p.len()).unwrap_or(0)
    }

    /// Run every command enqueued before this call, in order
    ///
    /// Returns the number of commands executed.
    pub fn execute_pending(&self) -> usize {
        let commands = match self.pending.lock() {
            Ok(mut pending) => std::mem::take(&mut *pending),
            Err(poisoned) => std::mem::take(&mut *poisoned.into_inner()),
        };
        let count = commands.len();
        let _guard = RenderDomainGuard::enter();
        for command in commands {
            command(self.device.as_ref());
        }
        count
    }
}

impl RenderDomain for DeferredRenderQueue {
    fn enqueue(&self, command: RenderCommand) {
        match self.pending.lock() {
            Ok(mut pending) => pending.push_back(command),
            Err(poisoned) => poisoned.into_inner().push_back(command),
        }
    }
}

#[cfg(test)]
#[path = "render_domain_tests.rs"]
mod tests;
