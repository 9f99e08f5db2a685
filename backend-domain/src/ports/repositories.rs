use async_trait::async_trait;
use thiserror::Error;

use crate::entities::{
    Account,
    AccountPatch,
    AnomalyQuery,
    AnomalyRecord,
    Transaction,
    TransactionRiskPatch,
    WindowSpec,
};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store unavailable: {0}")]
    Unavailable(String),
    #[error("{kind} {id} not found")]
    NotFound { kind: &'static str, id: String },
    #[error("{kind} {id} already exists")]
    Conflict { kind: &'static str, id: String },
    #[error("malformed stored record: {0}")]
    Malformed(String),
    #[error(transparent)]
    Backend(#[from] anyhow::Error),
}

/// Accounts, transactions and anomaly records.
#[async_trait]
pub trait LedgerStore: Send + Sync {
    async fn ensure_schema(&self) -> Result<(), StoreError>;
    async fn ping(&self) -> Result<(), StoreError>;

    async fn insert_account(&self, account: &Account) -> Result<(), StoreError>;
    async fn get_account(&self, account_id: &str) -> Result<Account, StoreError>;
    /// Full overwrite, used by the write path after booking a transaction.
    async fn put_account(&self, account: &Account) -> Result<(), StoreError>;
    async fn list_dirty_accounts(&self) -> Result<Vec<Account>, StoreError>;
    async fn patch_account(&self, account_id: &str, patch: &AccountPatch) -> Result<(), StoreError>;

    async fn insert_transaction(&self, transaction: &Transaction) -> Result<(), StoreError>;
    /// Most recent `limit` transactions inside the window, oldest first.
    async fn get_transaction_window(
        &self,
        account_id: &str,
        window: &WindowSpec,
    ) -> Result<Vec<Transaction>, StoreError>;
    async fn patch_transaction(
        &self,
        transaction_id: &str,
        patch: &TransactionRiskPatch,
    ) -> Result<(), StoreError>;

    async fn put_anomaly(&self, record: &AnomalyRecord) -> Result<(), StoreError>;
    /// Newest first.
    async fn list_anomalies(&self, query: &AnomalyQuery) -> Result<Vec<AnomalyRecord>, StoreError>;
}
