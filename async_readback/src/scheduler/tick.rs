/// Consumer-domain scheduling: "run this once at the start of the next tick"

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

/// One-shot task run on the consumer domain
pub type TickTask = Box<dyn FnOnce() + Send>;

/// Host per-frame scheduler
pub trait TickScheduler: Send + Sync {
    /// Run `task` once, at the start of the next tick
    fn schedule_next_tick(&self, task: TickTask);

    /// Number of ticks started so far
    fn current_tick(&self) -> u64;
}

/// Minimal tick scheduler driven by the host loop
///
/// Call [`FrameTicker::tick`] once per frame from the consumer thread. Tasks
/// scheduled while a tick is running wait for the following tick, so a task
/// that reschedules itself runs exactly once per tick.
pub struct FrameTicker {
    pending: Mutex<Vec<TickTask>>,
    frame: AtomicU64,
}

impl FrameTicker {
    pub fn new() -> Self {
        Self {
            pending: Mutex::new(Vec::new()),
            frame: AtomicU64::new(0),
        }
    }

    /// Start a new tick and run every task scheduled before it
    ///
    /// Returns the number of tasks run.
    pub fn tick(&self) -> usize {
        self.frame.fetch_add(1, Ordering::AcqRel);
        let tasks = match self.pending.lock() {
            Ok(mut pending) => std::mem::take(&mut *pending),
            Err(poisoned) => std::mem::take(&mut *poisoned.into_inner()),
        };
        let count = tasks.len();
        for task in tasks {
            task();
        }
        count
    }

    /// Tasks waiting for the next tick
    pub fn pending_count(&self) -> usize {
        self.pending.lock().map(|p| p.len()).unwrap_or(0)
    }
}

impl Default for FrameTicker {
    fn default() -> Self {
        Self::new()
    }
}

impl TickScheduler for FrameTicker {
    fn schedule_next_tick(&self, task: TickTask) {
        match self.pending.lock() {
            Ok(mut pending) => pending.push(task),
            Err(poisoned) => poisoned.into_inner().push(task),
        }
    }

    fn current_tick(&self) -> u64 {
        self.frame.load(Ordering::Acquire)
    }
}

#[cfg(test)]
#[path = "tick_tests.rs"]
mod tests;
