// Stale-account detection run
pub mod coordinator;
pub mod event;

pub use coordinator::*;
pub use event::*;
