pub mod clickhouse_ledger;
pub mod memory_ledger;
pub mod run_lease;

pub use clickhouse_ledger::*;
pub use memory_ledger::*;
pub use run_lease::*;
