// Domain services
pub mod features;
pub mod isolation_forest;
pub mod risk;

pub use features::*;
pub use isolation_forest::*;
pub use risk::*;
