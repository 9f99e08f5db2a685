// Transaction type value object

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::errors::DetectionError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TransactionType {
    Deposit,
    Withdrawal,
    Transfer,
    Purchase,
    Payment,
}

impl TransactionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionType::Deposit => "DEPOSIT",
            TransactionType::Withdrawal => "WITHDRAWAL",
            TransactionType::Transfer => "TRANSFER",
            TransactionType::Purchase => "PURCHASE",
            TransactionType::Payment => "PAYMENT",
        }
    }

    /// Debits take money out of the account; everything else credits it.
    pub fn is_debit(&self) -> bool {
        matches!(
            self,
            TransactionType::Withdrawal | TransactionType::Purchase | TransactionType::Payment
        )
    }
}

impl fmt::Display for TransactionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TransactionType {
    type Err = DetectionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "DEPOSIT" => Ok(TransactionType::Deposit),
            "WITHDRAWAL" => Ok(TransactionType::Withdrawal),
            "TRANSFER" => Ok(TransactionType::Transfer),
            "PURCHASE" => Ok(TransactionType::Purchase),
            "PAYMENT" => Ok(TransactionType::Payment),
            other => Err(DetectionError::Validation(format!(
                "unknown transaction type '{}'",
                other
            ))),
        }
    }
}
