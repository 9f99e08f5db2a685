pub mod detect_handlers;
pub mod ledger_handlers;
pub mod ops_handlers;

pub use detect_handlers::*;
pub use ledger_handlers::*;
pub use ops_handlers::*;
