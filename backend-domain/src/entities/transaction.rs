// Transaction entity
// Immutable ledger row apart from the risk fields the detection run patches

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::value_objects::{RiskLevel, TransactionType};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    pub transaction_id: String,
    pub account_id: String,
    pub transaction_type: TransactionType,
    /// Signed: credits positive, debits negative.
    pub amount: Decimal,
    pub balance_after: Decimal,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub timestamp: i64,
    /// The account's `write_seq` right after this row was booked.
    #[serde(default)]
    pub sequence: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub risk_score: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub risk_level: Option<RiskLevel>,
    #[serde(default)]
    pub is_anomaly: bool,
}

impl Transaction {
    pub fn apply_patch(&mut self, patch: &TransactionRiskPatch) {
        self.risk_score = Some(patch.risk_score);
        self.risk_level = Some(patch.risk_level);
        self.is_anomaly = patch.is_anomaly;
    }
}

/// Write-path request; `amount` is the positive magnitude.
#[derive(Debug, Clone, Deserialize)]
pub struct TransactionDraft {
    pub transaction_type: TransactionType,
    pub amount: Decimal,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub timestamp: Option<i64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct TransactionRiskPatch {
    pub risk_score: f64,
    pub risk_level: RiskLevel,
    pub is_anomaly: bool,
}
