// Read-side use cases
pub mod account_queries;
pub mod anomaly_queries;
pub mod run_queries;
