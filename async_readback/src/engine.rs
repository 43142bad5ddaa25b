/// Engine - Singleton manager for the global logger and readback context
///
/// This module provides global singleton management for the readback context
/// used by the free entry points and for the logger shared by both scheduling
/// domains. It uses thread-safe static storage with RwLock for safe concurrent
/// access.

use std::sync::{OnceLock, RwLock, Arc};
use std::time::SystemTime;
use crate::readback::ReadbackContext;
use crate::error::{Result, Error};
use crate::log::{Logger, LogEntry, LogSeverity, DefaultLogger};

// ===== INTERNAL STATE =====

/// Global engine state storage
static ENGINE_STATE: OnceLock<EngineState> = OnceLock::new();

/// Global logger (initialized with DefaultLogger)
static LOGGER: OnceLock<RwLock<Box<dyn Logger>>> = OnceLock::new();

/// Internal state structure holding all engine singletons
struct EngineState {
    /// Readback context used by `read_render_target_*`
    readback_context: RwLock<Option<Arc<ReadbackContext>>>,
}

impl EngineState {
    /// Create a new empty engine state
    fn new() -> Self {
        Self {
            readback_context: RwLock::new(None),
        }
    }
}

fn logger() -> &'static RwLock<Box<dyn Logger>> {
    LOGGER.get_or_init(|| RwLock::new(Box::new(DefaultLogger::new())))
}

// ===== PUBLIC API =====

/// Main engine singleton manager
///
/// # Example
///
/// ```no_run
/// use std::sync::Arc;
/// use async_readback::Engine;
/// use async_readback::readback::{ReadbackContext, read_render_target_pixel};
/// use async_readback::scheduler::{FrameTicker, RenderThread};
/// # fn run(device: Arc<dyn async_readback::device::ReadbackDevice>,
/// #        target: Arc<dyn async_readback::device::Texture>) -> async_readback::Result<()> {
/// Engine::initialize()?;
///
/// let render = Arc::new(RenderThread::spawn(device)?);
/// let ticker = Arc::new(FrameTicker::new());
/// Engine::create_readback_context(ReadbackContext::new(render, ticker.clone()))?;
///
/// let handle = read_render_target_pixel(target, 3, 7, |result| println!("{:?}", result))?;
/// while !handle.is_dispatched() {
///     ticker.tick();
/// }
///
/// Engine::shutdown();
/// # Ok(())
/// # }
/// ```
pub struct Engine;

impl Engine {
    /// Helper to log errors before returning them (internal use)
    fn log_and_return_error(error: Error) -> Error {
        match &error {
            Error::InitializationFailed(msg) => {
                crate::engine_error!("readback::Engine", "Initialization failed: {}", msg);
            }
            Error::BackendError(msg) => {
                crate::engine_error!("readback::Engine", "Backend error: {}", msg);
            }
            _ => {
                crate::engine_error!("readback::Engine", "Engine error: {}", error);
            }
        }
        error
    }

    fn state() -> Result<&'static EngineState> {
        ENGINE_STATE.get()
            .ok_or_else(|| Self::log_and_return_error(
                Error::InitializationFailed("Engine not initialized. Call Engine::initialize() first.".to_string())
            ))
    }

    /// Initialize the engine
    ///
    /// Idempotent. Must be called before registering a readback context.
    pub fn initialize() -> Result<()> {
        ENGINE_STATE.get_or_init(EngineState::new);
        Ok(())
    }

    /// Drop the registered readback context
    ///
    /// Readbacks already requested keep running; their handles own everything
    /// they need.
    pub fn shutdown() {
        if let Some(state) = ENGINE_STATE.get() {
            if let Ok(mut context) = state.readback_context.write() {
                *context = None;
            }
        }
    }

    // ===== READBACK CONTEXT API =====

    /// Register the readback context used by the free entry points
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The engine is not initialized
    /// - A context is already registered
    /// - The context lock is poisoned
    pub fn create_readback_context(context: ReadbackContext) -> Result<()> {
        let state = Self::state()?;

        let mut lock = state.readback_context.write()
            .map_err(|_| Self::log_and_return_error(
                Error::BackendError("ReadbackContext lock poisoned".to_string())
            ))?;

        if lock.is_some() {
            return Err(Self::log_and_return_error(
                Error::InitializationFailed("ReadbackContext already exists. Call Engine::destroy_readback_context() first.".to_string())
            ));
        }

        *lock = Some(Arc::new(context));

        crate::engine_info!("readback::Engine", "ReadbackContext singleton created successfully");

        Ok(())
    }

    /// Get the registered readback context
    ///
    /// # Errors
    ///
    /// Returns an error if the engine is not initialized or no context was
    /// registered.
    pub fn readback_context() -> Result<Arc<ReadbackContext>> {
        let state = Self::state()?;

        let lock = state.readback_context.read()
            .map_err(|_| Self::log_and_return_error(
                Error::BackendError("ReadbackContext lock poisoned".to_string())
            ))?;

        lock.clone()
            .ok_or_else(|| Self::log_and_return_error(
                Error::InitializationFailed("ReadbackContext not created. Call Engine::create_readback_context() first.".to_string())
            ))
    }

    /// Unregister the readback context
    ///
    /// # Errors
    ///
    /// Returns an error if the engine is not initialized
    pub fn destroy_readback_context() -> Result<()> {
        let state = Self::state()?;

        let mut lock = state.readback_context.write()
            .map_err(|_| Self::log_and_return_error(
                Error::BackendError("ReadbackContext lock poisoned".to_string())
            ))?;

        *lock = None;

        crate::engine_info!("readback::Engine", "ReadbackContext singleton destroyed");

        Ok(())
    }

    /// Reset all singletons for testing (only available in test builds)
    #[cfg(test)]
    pub fn reset_for_testing() {
        Self::shutdown();
    }

    // ===== LOGGING API =====

    /// Set a custom logger
    ///
    /// Replace the default logger with a custom implementation (file logger, network logger, etc.)
    ///
    /// # Example
    ///
    /// ```no_run
    /// use async_readback::{Engine, log::{Logger, LogEntry}};
    ///
    /// struct FileLogger;
    /// impl Logger for FileLogger {
    ///     fn log(&self, entry: &LogEntry) {
    ///         // Write to file...
    ///     }
    /// }
    ///
    /// Engine::set_logger(FileLogger);
    /// ```
    pub fn set_logger<L: Logger + 'static>(logger_impl: L) {
        if let Ok(mut lock) = logger().write() {
            *lock = Box::new(logger_impl);
        }
    }

    /// Reset logger to default (DefaultLogger)
    pub fn reset_logger() {
        if let Ok(mut lock) = logger().write() {
            *lock = Box::new(DefaultLogger::new());
        }
    }

    /// Internal logging method (for simple logs without file:line)
    ///
    /// Used by macros like engine_info!, engine_warn!, etc.
    pub fn log(severity: LogSeverity, source: &str, message: String) {
        if let Ok(lock) = logger().read() {
            lock.log(&LogEntry {
                severity,
                timestamp: SystemTime::now(),
                source: source.to_string(),
                message,
                file: None,
                line: None,
            });
        }
    }

    /// Internal logging method with file:line information (for ERROR logs)
    ///
    /// Used by engine_error! macro to include source location.
    pub fn log_detailed(
        severity: LogSeverity,
        source: &str,
        message: String,
        file: &'static str,
        line: u32,
    ) {
        if let Ok(lock) = logger().read() {
            lock.log(&LogEntry {
                severity,
                timestamp: SystemTime::now(),
                source: source.to_string(),
                message,
                file: Some(file),
                line: Some(line),
            });
        }
    }
}

#[cfg(test)]
#[path = "engine_tests.rs"]
mod tests;
