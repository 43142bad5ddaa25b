/// Readback configuration

/// How the copy is waited on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FlushMode {
    /// Poll the fence once per tick; never blocks
    #[default]
    Poll,
    /// Map right after the copy, stalling the rendering domain until it retires
    Flush,
}

/// Readback configuration
#[derive(Debug, Clone)]
pub struct ReadbackConfig {
    /// Mode used by requests that do not pick one
    pub default_flush_mode: FlushMode,

    /// Ticks without completion before a stall warning is logged (0 = never)
    pub stall_warning_ticks: u32,

    /// Log a DEBUG line with the ticks waited when a readback is delivered
    pub log_completion: bool,
}

impl Default for ReadbackConfig {
    fn default() -> Self {
        Self {
            default_flush_mode: FlushMode::Poll,
            stall_warning_ticks: 120,
            log_completion: cfg!(debug_assertions),
        }
    }
}
