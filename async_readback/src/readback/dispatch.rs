/// Completion dispatch: the consumer-side half of a readback

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex, Weak};

use crate::device::MapMode;
use crate::format::PixelDecoderRegistry;
use crate::readback::{
    copy_and_fence, poll_and_map, FlushMode, ReadbackConfig, ReadbackResult, ReadbackSession,
};
use crate::scheduler::{RenderDomain, TickScheduler};

/// One-shot completion callback
pub type ReadbackCallback = Box<dyn FnOnce(ReadbackResult) + Send>;

/// Consumer object of one readback
///
/// Owned by the caller's handle. Every scheduled closure holds it weakly, so
/// dropping the handle stops polling and delivery.
pub(crate) struct ReadbackAction {
    pub(crate) session: Arc<ReadbackSession>,
    render: Arc<dyn RenderDomain>,
    ticks: Arc<dyn TickScheduler>,
    decoders: Arc<PixelDecoderRegistry>,
    config: ReadbackConfig,
    callback: Mutex<Option<ReadbackCallback>>,
    start_tick: u64,
    ticks_waited: AtomicU32,
    stall_warned: AtomicBool,
}

impl ReadbackAction {
    pub(crate) fn new(
        session: Arc<ReadbackSession>,
        render: Arc<dyn RenderDomain>,
        ticks: Arc<dyn TickScheduler>,
        decoders: Arc<PixelDecoderRegistry>,
        config: ReadbackConfig,
        callback: ReadbackCallback,
    ) -> Self {
        let start_tick = ticks.current_tick();
        Self {
            session,
            render,
            ticks,
            decoders,
            config,
            callback: Mutex::new(Some(callback)),
            start_tick,
            ticks_waited: AtomicU32::new(0),
            stall_warned: AtomicBool::new(false),
        }
    }

    pub(crate) fn ticks_waited(&self) -> u32 {
        self.ticks_waited.load(Ordering::Relaxed)
    }

    /// Enqueue copy-and-fence, then the first dispatch tick
    pub(crate) fn start(self: &Arc<Self>) {
        let weak = Arc::downgrade(self);
        let session = self.session.clone();
        let decoders = self.decoders.clone();
        self.render.enqueue(Box::new(move |device| {
            if weak.strong_count() == 0 {
                return;
            }
            copy_and_fence(&session, device, &decoders);
        }));
        self.schedule_next_tick();
    }

    fn schedule_next_tick(self: &Arc<Self>) {
        let weak: Weak<Self> = Arc::downgrade(self);
        self.ticks.schedule_next_tick(Box::new(move || {
            if let Some(action) = weak.upgrade() {
                action.on_tick();
            }
        }));
    }

    fn enqueue_poll(self: &Arc<Self>) {
        let weak = Arc::downgrade(self);
        let session = self.session.clone();
        let decoders = self.decoders.clone();
        self.session.note_poll_requested();
        self.render.enqueue(Box::new(move |device| {
            if weak.strong_count() == 0 {
                return;
            }
            poll_and_map(&session, device, &decoders, MapMode::Poll);
        }));
    }

    /// Deliver the result if the session finished, otherwise poll again
    pub(crate) fn on_tick(self: &Arc<Self>) {
        let waited = self.ticks_waited.fetch_add(1, Ordering::Relaxed) + 1;

        if let Some(result) = self.session.take_for_dispatch() {
            if self.config.log_completion {
                crate::engine_debug!(
                    "readback::dispatch",
                    "Readback #{} delivered after {} ticks",
                    self.session.id(),
                    self.ticks.current_tick().saturating_sub(self.start_tick)
                );
            }
            let callback = match self.callback.lock() {
                Ok(mut slot) => slot.take(),
                Err(poisoned) => poisoned.into_inner().take(),
            };
            if let Some(callback) = callback {
                callback(result);
            }
            return;
        }
        if self.session.is_dispatched() {
            return;
        }

        if self.config.stall_warning_ticks > 0
            && waited >= self.config.stall_warning_ticks
            && !self.stall_warned.swap(true, Ordering::Relaxed)
        {
            crate::engine_warn!(
                "readback::dispatch",
                "Readback #{} still pending after {} ticks (fence not signaled)",
                self.session.id(),
                waited
            );
        }

        // In Flush mode the copy command maps inline; polls are only needed
        // until it has run.
        if self.session.flush_mode() == FlushMode::Poll || !self.session.is_copy_issued() {
            self.enqueue_poll();
        }
        self.schedule_next_tick();
    }
}

#[cfg(test)]
#[path = "dispatch_tests.rs"]
mod tests;
