// Domain entities
pub mod account;
pub mod anomaly;
pub mod config;
pub mod detection;
pub mod feature_vector;
pub mod transaction;

pub use account::*;
pub use anomaly::*;
pub use config::*;
pub use detection::*;
pub use feature_vector::*;
pub use transaction::*;
