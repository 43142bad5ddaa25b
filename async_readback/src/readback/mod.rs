/// Readback module - the GPU to CPU readback state machine
///
/// A request creates a [`ReadbackSession`], enqueues [`copy_and_fence`] on the
/// rendering domain and schedules a dispatch tick on the consumer domain.
/// Each tick either delivers the finished result or enqueues one more
/// [`poll_and_map`].

pub mod region;
pub mod config;
pub mod session;
pub mod copy_stage;
pub mod poll_stage;
pub mod dispatch;
pub mod context;
pub mod entry_points;

pub use region::*;
pub use config::*;
pub use session::*;
pub use copy_stage::*;
pub use poll_stage::*;
pub use dispatch::ReadbackCallback;
pub use context::*;
pub use entry_points::*;
