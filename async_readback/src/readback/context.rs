/// Consumer-facing entry point: requests and handles

use std::sync::Arc;

use crate::device::Texture;
use crate::format::PixelDecoderRegistry;
use crate::readback::dispatch::ReadbackAction;
use crate::readback::{
    FlushMode, ReadbackConfig, ReadbackRegion, ReadbackResult, ReadbackSession, RegionRequest,
    SessionState,
};
use crate::scheduler::{RenderDomain, TickScheduler};

/// What to read back
#[derive(Clone)]
pub struct ReadbackRequest {
    /// Source render target; must stay allocated until the copy ran
    pub source: Arc<dyn Texture>,
    /// Region to read
    pub region: RegionRequest,
    /// `None` uses `ReadbackConfig::default_flush_mode`
    pub flush_mode: Option<FlushMode>,
}

impl ReadbackRequest {
    pub fn pixel(source: Arc<dyn Texture>, x: i32, y: i32) -> Self {
        Self { source, region: RegionRequest::Pixel { x, y }, flush_mode: None }
    }

    pub fn rect(source: Arc<dyn Texture>, x: i32, y: i32, width: u32, height: u32) -> Self {
        Self {
            source,
            region: RegionRequest::Rect { x, y, width, height },
            flush_mode: None,
        }
    }

    pub fn entire_surface(source: Arc<dyn Texture>) -> Self {
        Self { source, region: RegionRequest::EntireSurface, flush_mode: None }
    }

    pub fn with_flush_mode(mut self, mode: FlushMode) -> Self {
        self.flush_mode = Some(mode);
        self
    }
}

/// Services a readback needs from the host
///
/// # Example
///
/// ```no_run
/// use std::sync::Arc;
/// use async_readback::readback::{ReadbackContext, ReadbackRequest, ReadbackResult};
/// use async_readback::scheduler::{FrameTicker, RenderThread};
/// # fn run(device: Arc<dyn async_readback::device::ReadbackDevice>,
/// #        target: Arc<dyn async_readback::device::Texture>) -> async_readback::Result<()> {
/// let render = Arc::new(RenderThread::spawn(device)?);
/// let ticker = Arc::new(FrameTicker::new());
/// let context = ReadbackContext::new(render, ticker.clone());
///
/// let handle = context.request_readback(ReadbackRequest::pixel(target, 10, 20), |result| {
///     if let ReadbackResult::Pixel(color) = result {
///         println!("{:?}", color);
///     }
/// });
/// while !handle.is_dispatched() {
///     ticker.tick();
/// }
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct ReadbackContext {
    pub render: Arc<dyn RenderDomain>,
    pub ticks: Arc<dyn TickScheduler>,
    pub decoders: Arc<PixelDecoderRegistry>,
    pub config: ReadbackConfig,
}

impl ReadbackContext {
    /// Context with the built-in decoders and default configuration
    pub fn new(render: Arc<dyn RenderDomain>, ticks: Arc<dyn TickScheduler>) -> Self {
        Self {
            render,
            ticks,
            decoders: Arc::new(PixelDecoderRegistry::with_defaults()),
            config: ReadbackConfig::default(),
        }
    }

    pub fn with_config(mut self, config: ReadbackConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_decoders(mut self, decoders: PixelDecoderRegistry) -> Self {
        self.decoders = Arc::new(decoders);
        self
    }

    /// Start an asynchronous readback
    ///
    /// The copy is enqueued on the rendering domain and `callback` runs on
    /// the consumer domain, during a tick, once the data is decoded. Keep the
    /// returned handle alive until then: dropping it abandons the readback.
    ///
    /// # Panics
    ///
    /// If the source texture is not allocated.
    pub fn request_readback<F>(&self, request: ReadbackRequest, callback: F) -> ReadbackHandle
    where
        F: FnOnce(ReadbackResult) + Send + 'static,
    {
        assert!(
            request.source.is_allocated(),
            "cannot read back from an unallocated texture"
        );
        let mode = request.flush_mode.unwrap_or(self.config.default_flush_mode);
        let session = Arc::new(ReadbackSession::new(request.source, request.region, mode));

        crate::engine_debug!(
            "readback::context",
            "Readback #{} requested: {:?} ({:?})",
            session.id(),
            session.region(),
            mode
        );

        let action = Arc::new(ReadbackAction::new(
            session,
            self.render.clone(),
            self.ticks.clone(),
            self.decoders.clone(),
            self.config.clone(),
            Box::new(callback),
        ));
        action.start();
        ReadbackHandle { action }
    }
}

/// Owning handle of an in-flight readback
///
/// Dropping it before delivery abandons the readback: queued rendering work
/// turns into no-ops and the callback never runs.
pub struct ReadbackHandle {
    action: Arc<ReadbackAction>,
}

impl ReadbackHandle {
    pub fn session_id(&self) -> u64 {
        self.action.session.id()
    }

    pub fn state(&self) -> SessionState {
        self.action.session.state()
    }

    pub fn is_finished(&self) -> bool {
        self.action.session.is_finished()
    }

    /// True once the callback has been handed the result
    pub fn is_dispatched(&self) -> bool {
        self.action.session.is_dispatched()
    }

    /// Dispatch ticks run so far
    pub fn ticks_waited(&self) -> u32 {
        self.action.ticks_waited()
    }

    /// Region after clamping
    pub fn region(&self) -> ReadbackRegion {
        self.action.session.region()
    }

    pub fn flush_mode(&self) -> FlushMode {
        self.action.session.flush_mode()
    }
}

impl std::fmt::Debug for ReadbackHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReadbackHandle")
            .field("session", &self.action.session)
            .field("ticks_waited", &self.ticks_waited())
            .finish()
    }
}

#[cfg(test)]
#[path = "context_tests.rs"]
mod tests;
