// Backend Application Layer

pub mod commands;
pub mod detect;
pub mod error;
pub mod metrics;
pub mod queries;
pub mod state;

pub use error::{AppError, RunError};
pub use metrics::Metrics;
pub use state::AppState;
