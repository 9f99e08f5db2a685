// Account entity
// Owns the running balance and the dirty flag the detection run drains

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::entities::{Transaction, TransactionDraft};
use crate::errors::DetectionError;
use crate::value_objects::{new_transaction_id, AccountType, RiskLevel};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Account {
    pub account_id: String,
    pub account_type: AccountType,
    pub balance: Decimal,
    pub opening_balance: Decimal,
    pub risk_level: RiskLevel,
    pub risk_score: f64,
    pub dirty: bool,
    pub last_transaction_at: Option<i64>,
    /// Bumped once per booked transaction.
    #[serde(default)]
    pub write_seq: u64,
    pub created_at: i64,
    pub updated_at: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewAccount {
    pub account_id: String,
    #[serde(default)]
    pub account_type: AccountType,
    #[serde(default)]
    pub opening_balance: Decimal,
}

/// Fields the detection run writes back onto an account.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AccountPatch {
    pub risk: Option<(f64, RiskLevel)>,
    pub clear_dirty: bool,
    /// Highest `write_seq` covered by the pass. The dirty flag is only
    /// cleared when no transaction has been booked since.
    pub processed_seq: Option<u64>,
    pub updated_at: i64,
}

impl Account {
    pub fn open(request: NewAccount, now: i64) -> Self {
        Self {
            account_id: request.account_id,
            account_type: request.account_type,
            balance: request.opening_balance,
            opening_balance: request.opening_balance,
            risk_level: RiskLevel::Low,
            risk_score: 0.0,
            dirty: false,
            last_transaction_at: None,
            write_seq: 0,
            created_at: now,
            updated_at: now,
        }
    }

    /// Books a transaction against this account and returns the row to persist.
    ///
    /// The draft carries a positive magnitude; the sign comes from the
    /// transaction type. The account's balance moves to the new
    /// `balance_after` and the account becomes dirty.
    pub fn apply(&mut self, draft: TransactionDraft, now: i64) -> Result<Transaction, DetectionError> {
        if draft.amount <= Decimal::ZERO {
            return Err(DetectionError::Validation(
                "transaction amount must be positive".to_string(),
            ));
        }
        check_money_scale(draft.amount, "transaction amount")?;
        let timestamp = draft.timestamp.unwrap_or(now);
        if let Some(last) = self.last_transaction_at {
            if timestamp < last {
                return Err(DetectionError::Validation(format!(
                    "transaction timestamp {} is older than the latest booked transaction {}",
                    timestamp, last
                )));
            }
        }

        let signed = if draft.transaction_type.is_debit() {
            -draft.amount
        } else {
            draft.amount
        };
        let balance_after = self.balance + signed;

        self.balance = balance_after;
        self.dirty = true;
        self.last_transaction_at = Some(timestamp);
        self.write_seq += 1;
        self.updated_at = now;

        Ok(Transaction {
            transaction_id: new_transaction_id(),
            account_id: self.account_id.clone(),
            transaction_type: draft.transaction_type,
            amount: signed,
            balance_after,
            description: draft
                .description
                .map(|text| text.trim().to_string())
                .filter(|text| !text.is_empty()),
            timestamp,
            sequence: self.write_seq,
            risk_score: None,
            risk_level: None,
            is_anomaly: false,
        })
    }

    /// Applies a detection patch in place. Returns whether the dirty flag was cleared.
    pub fn apply_patch(&mut self, patch: &AccountPatch) -> bool {
        if let Some((score, level)) = patch.risk {
            self.risk_score = score;
            self.risk_level = level;
        }
        let mut cleared = false;
        if patch.clear_dirty {
            let newer_arrived = patch
                .processed_seq
                .map_or(false, |seq| self.write_seq > seq);
            if !newer_arrived {
                self.dirty = false;
                cleared = true;
            }
        }
        self.updated_at = patch.updated_at;
        cleared
    }
}

/// Money is kept to whole cents.
pub const MONEY_SCALE: u32 = 2;

/// Rejects values with a fractional part finer than a cent.
pub fn check_money_scale(value: Decimal, field: &str) -> Result<(), DetectionError> {
    if value.normalize().scale() > MONEY_SCALE {
        return Err(DetectionError::Validation(format!(
            "{} {} has more than {} decimal places",
            field, value, MONEY_SCALE
        )));
    }
    Ok(())
}
