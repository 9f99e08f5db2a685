pub mod detection_scheduler;

pub use detection_scheduler::*;
