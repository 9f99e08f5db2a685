// Domain value objects
pub mod account_type;
pub mod identifiers;
pub mod risk_level;
pub mod transaction_type;

pub use account_type::*;
pub use identifiers::*;
pub use risk_level::*;
pub use transaction_type::*;
