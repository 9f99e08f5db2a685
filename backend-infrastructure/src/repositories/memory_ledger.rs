use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use backend_domain::{
    Account,
    AccountPatch,
    AnomalyQuery,
    AnomalyRecord,
    LedgerStore,
    StoreError,
    Transaction,
    TransactionRiskPatch,
    WindowSpec,
};

#[derive(Default)]
struct LedgerTables {
    accounts: HashMap<String, Account>,
    /// Per-account history in booking order.
    transactions: HashMap<String, Vec<Transaction>>,
    /// transaction_id -> account_id
    transaction_index: HashMap<String, String>,
    anomalies: Vec<AnomalyRecord>,
}

/// Process-local ledger used for development and tests.
#[derive(Default)]
pub struct InMemoryLedgerStore {
    tables: RwLock<LedgerTables>,
}

impl InMemoryLedgerStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn transactions_for(&self, account_id: &str) -> Vec<Transaction> {
        let tables = self.tables.read().await;
        tables
            .transactions
            .get(account_id)
            .cloned()
            .unwrap_or_default()
    }

    pub async fn anomaly_count(&self) -> usize {
        self.tables.read().await.anomalies.len()
    }
}

#[async_trait]
impl LedgerStore for InMemoryLedgerStore {
    async fn ensure_schema(&self) -> Result<(), StoreError> {
        Ok(())
    }

    async fn ping(&self) -> Result<(), StoreError> {
        Ok(())
    }

    async fn insert_account(&self, account: &Account) -> Result<(), StoreError> {
        let mut tables = self.tables.write().await;
        if tables.accounts.contains_key(&account.account_id) {
            return Err(StoreError::Conflict {
                kind: "account",
                id: account.account_id.clone(),
            });
        }
        tables
            .accounts
            .insert(account.account_id.clone(), account.clone());
        Ok(())
    }

    async fn get_account(&self, account_id: &str) -> Result<Account, StoreError> {
        let tables = self.tables.read().await;
        tables
            .accounts
            .get(account_id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound {
                kind: "account",
                id: account_id.to_string(),
            })
    }

    async fn put_account(&self, account: &Account) -> Result<(), StoreError> {
        let mut tables = self.tables.write().await;
        tables
            .accounts
            .insert(account.account_id.clone(), account.clone());
        Ok(())
    }

    async fn list_dirty_accounts(&self) -> Result<Vec<Account>, StoreError> {
        let tables = self.tables.read().await;
        let mut dirty: Vec<Account> = tables
            .accounts
            .values()
            .filter(|account| account.dirty)
            .cloned()
            .collect();
        dirty.sort_by(|a, b| a.account_id.cmp(&b.account_id));
        Ok(dirty)
    }

    async fn patch_account(&self, account_id: &str, patch: &AccountPatch) -> Result<(), StoreError> {
        let mut tables = self.tables.write().await;
        let account = tables
            .accounts
            .get_mut(account_id)
            .ok_or_else(|| StoreError::NotFound {
                kind: "account",
                id: account_id.to_string(),
            })?;
        account.apply_patch(patch);
        Ok(())
    }

    async fn insert_transaction(&self, transaction: &Transaction) -> Result<(), StoreError> {
        let mut tables = self.tables.write().await;
        if tables
            .transaction_index
            .contains_key(&transaction.transaction_id)
        {
            return Err(StoreError::Conflict {
                kind: "transaction",
                id: transaction.transaction_id.clone(),
            });
        }
        tables.transaction_index.insert(
            transaction.transaction_id.clone(),
            transaction.account_id.clone(),
        );
        let history = tables
            .transactions
            .entry(transaction.account_id.clone())
            .or_default();
        let position = history.partition_point(|existing| existing.timestamp <= transaction.timestamp);
        history.insert(position, transaction.clone());
        Ok(())
    }

    async fn get_transaction_window(
        &self,
        account_id: &str,
        window: &WindowSpec,
    ) -> Result<Vec<Transaction>, StoreError> {
        let tables = self.tables.read().await;
        let Some(history) = tables.transactions.get(account_id) else {
            return Ok(Vec::new());
        };
        let in_window: Vec<&Transaction> = history
            .iter()
            .filter(|txn| txn.timestamp >= window.since_ms && txn.timestamp <= window.until_ms)
            .collect();
        let skip = in_window.len().saturating_sub(window.limit);
        Ok(in_window.into_iter().skip(skip).cloned().collect())
    }

    async fn patch_transaction(
        &self,
        transaction_id: &str,
        patch: &TransactionRiskPatch,
    ) -> Result<(), StoreError> {
        let mut tables = self.tables.write().await;
        let account_id = tables
            .transaction_index
            .get(transaction_id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound {
                kind: "transaction",
                id: transaction_id.to_string(),
            })?;
        let transaction = tables
            .transactions
            .get_mut(&account_id)
            .and_then(|history| {
                history
                    .iter_mut()
                    .find(|txn| txn.transaction_id == transaction_id)
            })
            .ok_or_else(|| StoreError::Malformed(format!(
                "transaction {} indexed but missing from account {}",
                transaction_id, account_id
            )))?;
        transaction.apply_patch(patch);
        Ok(())
    }

    async fn put_anomaly(&self, record: &AnomalyRecord) -> Result<(), StoreError> {
        let mut tables = self.tables.write().await;
        tables.anomalies.push(record.clone());
        Ok(())
    }

    async fn list_anomalies(&self, query: &AnomalyQuery) -> Result<Vec<AnomalyRecord>, StoreError> {
        let tables = self.tables.read().await;
        let mut matched: Vec<AnomalyRecord> = tables
            .anomalies
            .iter()
            .filter(|record| {
                query
                    .account_id
                    .as_deref()
                    .map_or(true, |id| record.account_id == id)
            })
            .filter(|record| {
                query
                    .transaction_id
                    .as_deref()
                    .map_or(true, |id| record.transaction_id == id)
            })
            .cloned()
            .collect();
        matched.sort_by(|a, b| {
            b.detected_at
                .cmp(&a.detected_at)
                .then_with(|| b.anomaly_id.cmp(&a.anomaly_id))
        });
        if let Some(limit) = query.limit {
            matched.truncate(limit);
        }
        Ok(matched)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use backend_domain::{NewAccount, RiskLevel, TransactionDraft, TransactionType};
    use rust_decimal::Decimal;

    async fn seeded(store: &InMemoryLedgerStore, timestamps: &[i64]) -> Vec<Transaction> {
        let mut account = Account::open(
            NewAccount {
                account_id: "acct-1".to_string(),
                account_type: Default::default(),
                opening_balance: Decimal::new(100_000, 2),
            },
            0,
        );
        store.insert_account(&account).await.expect("insert account");
        let mut booked = Vec::new();
        for ts in timestamps {
            let txn = account
                .apply(
                    TransactionDraft {
                        transaction_type: TransactionType::Deposit,
                        amount: Decimal::new(1_000, 2),
                        description: None,
                        timestamp: Some(*ts),
                    },
                    *ts,
                )
                .expect("apply");
            store.insert_transaction(&txn).await.expect("insert txn");
            booked.push(txn);
        }
        store.put_account(&account).await.expect("put account");
        booked
    }

    #[tokio::test]
    async fn duplicate_account_conflicts() {
        let store = InMemoryLedgerStore::new();
        seeded(&store, &[]).await;
        let account = store.get_account("acct-1").await.expect("get");
        let err = store.insert_account(&account).await.expect_err("conflict");
        assert!(matches!(err, StoreError::Conflict { kind: "account", .. }));
    }

    #[tokio::test]
    async fn window_returns_most_recent_oldest_first() {
        let store = InMemoryLedgerStore::new();
        let booked = seeded(&store, &[10, 20, 30, 40, 50]).await;
        let window = WindowSpec {
            since_ms: 15,
            until_ms: 50,
            limit: 3,
        };
        let got = store
            .get_transaction_window("acct-1", &window)
            .await
            .expect("window");
        let ids: Vec<&str> = got.iter().map(|t| t.transaction_id.as_str()).collect();
        let expected: Vec<&str> = booked[2..].iter().map(|t| t.transaction_id.as_str()).collect();
        assert_eq!(ids, expected);
    }

    #[tokio::test]
    async fn unknown_account_window_is_empty() {
        let store = InMemoryLedgerStore::new();
        let window = WindowSpec {
            since_ms: 0,
            until_ms: 100,
            limit: 10,
        };
        let got = store
            .get_transaction_window("missing", &window)
            .await
            .expect("window");
        assert!(got.is_empty());
    }

    #[tokio::test]
    async fn patch_transaction_updates_scores() {
        let store = InMemoryLedgerStore::new();
        let booked = seeded(&store, &[10]).await;
        let patch = TransactionRiskPatch {
            risk_score: 0.9,
            risk_level: RiskLevel::High,
            is_anomaly: true,
        };
        store
            .patch_transaction(&booked[0].transaction_id, &patch)
            .await
            .expect("patch");
        let stored = store.transactions_for("acct-1").await;
        assert_eq!(stored[0].risk_level, Some(RiskLevel::High));
        assert!(stored[0].is_anomaly);

        let err = store
            .patch_transaction("txn-missing", &patch)
            .await
            .expect_err("missing");
        assert!(matches!(err, StoreError::NotFound { kind: "transaction", .. }));
    }

    #[tokio::test]
    async fn dirty_listing_tracks_patch() {
        let store = InMemoryLedgerStore::new();
        seeded(&store, &[10, 20]).await;
        assert_eq!(store.list_dirty_accounts().await.expect("list").len(), 1);

        let stale = AccountPatch {
            risk: Some((0.2, RiskLevel::Low)),
            clear_dirty: true,
            processed_seq: Some(1),
            updated_at: 30,
        };
        store.patch_account("acct-1", &stale).await.expect("patch");
        assert_eq!(store.list_dirty_accounts().await.expect("list").len(), 1);

        let current = AccountPatch {
            processed_seq: Some(2),
            ..stale
        };
        store.patch_account("acct-1", &current).await.expect("patch");
        assert!(store.list_dirty_accounts().await.expect("list").is_empty());
    }
}
