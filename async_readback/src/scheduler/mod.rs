/// Scheduler module - the two domains the readback pipeline hops between

pub mod tick;
pub mod render_domain;
pub mod render_thread;

pub use tick::*;
pub use render_domain::*;
pub use render_thread::*;
