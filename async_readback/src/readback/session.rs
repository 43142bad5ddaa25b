/// One in-flight GPU to CPU copy
///
/// Shared between the rendering-domain task chain and the consumer-domain
/// dispatcher. Cross-domain handoff goes through `finished` (release/acquire)
/// and the write-once `result`; nothing on the session is ever locked.

use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, OnceLock};

use crate::device::{GpuFence, Texture};
use crate::error::Error;
use crate::format::LinearColor;
use crate::readback::{FlushMode, ReadbackRegion, RegionRequest};

static NEXT_SESSION_ID: AtomicU64 = AtomicU64::new(1);

/// Decoded readback data
#[derive(Debug, Clone, PartialEq)]
pub enum ReadbackResult {
    /// Single-pixel request
    Pixel(LinearColor),
    /// Rectangle or whole-surface request, row-major, `width * height` entries
    Pixels {
        width: u32,
        height: u32,
        colors: Vec<LinearColor>,
    },
}

impl ReadbackResult {
    /// Result filled with the default color
    pub fn filled(region: ReadbackRegion, single_pixel: bool) -> Self {
        if single_pixel {
            ReadbackResult::Pixel(LinearColor::TRANSPARENT)
        } else {
            ReadbackResult::Pixels {
                width: region.width,
                height: region.height,
                colors: vec![LinearColor::TRANSPARENT; region.pixel_count()],
            }
        }
    }

    /// All decoded colors, row-major
    pub fn colors(&self) -> &[LinearColor] {
        match self {
            ReadbackResult::Pixel(color) => std::slice::from_ref(color),
            ReadbackResult::Pixels { colors, .. } => colors,
        }
    }

    /// Color at (x, y) relative to the region origin
    pub fn get(&self, x: u32, y: u32) -> Option<LinearColor> {
        match self {
            ReadbackResult::Pixel(color) => (x == 0 && y == 0).then_some(*color),
            ReadbackResult::Pixels { width, height, colors } => {
                if x < *width && y < *height {
                    colors.get(y as usize * *width as usize + x as usize).copied()
                } else {
                    None
                }
            }
        }
    }

    /// Bitwise comparison of every channel of every pixel
    pub fn bit_eq(&self, other: &ReadbackResult) -> bool {
        let (a, b) = (self.colors(), other.colors());
        a.len() == b.len() && a.iter().zip(b).all(|(x, y)| x.bit_eq(*y))
    }
}

/// Lifecycle position of a session
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum SessionState {
    /// Copy not yet executed on the rendering domain
    Created,
    /// Staging copy and fence recorded
    CopyIssued,
    /// At least one poll has been requested
    Polling,
    /// Result decoded, waiting for the consumer tick
    Finished,
    /// Result delivered (terminal)
    Dispatched,
}

pub struct ReadbackSession {
    // Declared first so it drops first: a backend fence may wait for the copy
    // reading `source` and writing `staging` to retire.
    fence: OnceLock<Arc<dyn GpuFence>>,
    id: u64,
    source: Arc<dyn Texture>,
    region: ReadbackRegion,
    single_pixel: bool,
    flush_mode: FlushMode,
    staging: OnceLock<Arc<dyn Texture>>,
    copy_issued: AtomicBool,
    polls_requested: AtomicU32,
    result: OnceLock<ReadbackResult>,
    finished: AtomicBool,
    dispatched: AtomicBool,
}

impl ReadbackSession {
    /// Create a session, clamping `request` against the source size
    pub fn new(source: Arc<dyn Texture>, request: RegionRequest, flush_mode: FlushMode) -> Self {
        let info = source.info();
        let region = request.resolve(info.width, info.height);
        Self {
            id: NEXT_SESSION_ID.fetch_add(1, Ordering::Relaxed),
            source,
            region,
            single_pixel: request.is_single_pixel(),
            flush_mode,
            staging: OnceLock::new(),
            fence: OnceLock::new(),
            copy_issued: AtomicBool::new(false),
            polls_requested: AtomicU32::new(0),
            result: OnceLock::new(),
            finished: AtomicBool::new(false),
            dispatched: AtomicBool::new(false),
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn source(&self) -> &dyn Texture {
        self.source.as_ref()
    }

    pub fn region(&self) -> ReadbackRegion {
        self.region
    }

    pub fn is_single_pixel(&self) -> bool {
        self.single_pixel
    }

    pub fn flush_mode(&self) -> FlushMode {
        self.flush_mode
    }

    pub fn staging(&self) -> Option<&dyn Texture> {
        self.staging.get().map(|s| s.as_ref())
    }

    pub fn fence(&self) -> Option<&dyn GpuFence> {
        self.fence.get().map(|f| f.as_ref())
    }

    pub fn is_copy_issued(&self) -> bool {
        self.copy_issued.load(Ordering::Acquire)
    }

    pub fn is_finished(&self) -> bool {
        self.finished.load(Ordering::Acquire)
    }

    pub fn is_dispatched(&self) -> bool {
        self.dispatched.load(Ordering::Acquire)
    }

    pub fn polls_requested(&self) -> u32 {
        self.polls_requested.load(Ordering::Relaxed)
    }

    pub fn state(&self) -> SessionState {
        if self.is_dispatched() {
            SessionState::Dispatched
        } else if self.is_finished() {
            SessionState::Finished
        } else if !self.is_copy_issued() {
            SessionState::Created
        } else if self.polls_requested() > 0 {
            SessionState::Polling
        } else {
            SessionState::CopyIssued
        }
    }

    /// Decoded result, once finished
    pub fn result(&self) -> Option<&ReadbackResult> {
        if self.is_finished() {
            self.result.get()
        } else {
            None
        }
    }

    /// Store the staging copy and its fence
    ///
    /// # Panics
    ///
    /// If called twice.
    pub fn populate(&self, staging: Arc<dyn Texture>, fence: Arc<dyn GpuFence>) {
        assert!(
            !self.is_copy_issued(),
            "readback #{} populated twice",
            self.id
        );
        if self.staging.set(staging).is_err() || self.fence.set(fence).is_err() {
            panic!("readback #{} populated twice", self.id);
        }
        self.copy_issued.store(true, Ordering::Release);
    }

    /// Store the decoded result and mark the session finished
    ///
    /// # Panics
    ///
    /// If the copy has not been issued yet or the session already finished.
    pub fn finalize(&self, result: ReadbackResult) {
        assert!(
            self.is_copy_issued(),
            "readback #{} finalized before its copy was issued",
            self.id
        );
        assert!(
            self.result.set(result).is_ok(),
            "readback #{} finalized twice",
            self.id
        );
        self.finished.store(true, Ordering::Release);
    }

    /// Log a device error and finish with default-filled pixels
    ///
    /// No-op on a session that already finished.
    pub(crate) fn fail(&self, stage: &str, error: &Error) {
        if self.is_finished() {
            return;
        }
        crate::engine_error!(
            "readback::session",
            "Readback #{} failed during {}: {}. Delivering default pixels",
            self.id,
            stage,
            error
        );
        self.copy_issued.store(true, Ordering::Release);
        self.finalize(ReadbackResult::filled(self.region, self.single_pixel));
    }

    pub(crate) fn note_poll_requested(&self) {
        self.polls_requested.fetch_add(1, Ordering::Relaxed);
    }

    /// Claim the result for delivery
    ///
    /// Returns it exactly once, after the session finished.
    pub(crate) fn take_for_dispatch(&self) -> Option<ReadbackResult> {
        if !self.is_finished() {
            return None;
        }
        if self.dispatched.swap(true, Ordering::AcqRel) {
            return None;
        }
        self.result.get().cloned()
    }
}

impl std::fmt::Debug for ReadbackSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReadbackSession")
            .field("id", &self.id)
            .field("region", &self.region)
            .field("flush_mode", &self.flush_mode)
            .field("state", &self.state())
            .finish()
    }
}

#[cfg(test)]
#[path = "session_tests.rs"]
mod tests;
