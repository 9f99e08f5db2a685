use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};

use anyhow::anyhow;
use async_trait::async_trait;
use clickhouse::{Client, Row};
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use backend_domain::{
    Account,
    AccountPatch,
    AccountType,
    AnomalyQuery,
    AnomalyRecord,
    DbConfig,
    FeatureVector,
    LedgerStore,
    RiskLevel,
    StoreError,
    Transaction,
    TransactionRiskPatch,
    TransactionType,
    WindowSpec,
};

use crate::utils::{cents_to_decimal, decimal_to_cents, millis_to_offset, offset_to_millis};

#[derive(Debug, Clone, Serialize, Deserialize, Row)]
struct AccountRow {
    account_id: String,
    account_type: String,
    balance_cents: i64,
    opening_balance_cents: i64,
    risk_level: String,
    risk_score: f64,
    dirty: u8,
    last_transaction_ms: Option<i64>,
    write_seq: u64,
    #[serde(with = "clickhouse::serde::time::datetime64::millis")]
    created_at: OffsetDateTime,
    #[serde(with = "clickhouse::serde::time::datetime64::millis")]
    updated_at: OffsetDateTime,
    version: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, Row)]
struct TransactionRow {
    transaction_id: String,
    account_id: String,
    transaction_type: String,
    amount_cents: i64,
    balance_after_cents: i64,
    description: Option<String>,
    #[serde(with = "clickhouse::serde::time::datetime64::millis")]
    event_time: OffsetDateTime,
    sequence: u64,
    risk_score: Option<f64>,
    risk_level: Option<String>,
    is_anomaly: u8,
    version: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, Row)]
struct AnomalyRow {
    anomaly_id: String,
    transaction_id: String,
    account_id: String,
    risk_score: f64,
    risk_level: String,
    #[serde(with = "clickhouse::serde::time::datetime64::millis")]
    detected_at: OffsetDateTime,
    model_version: String,
    features_json: String,
}

/// Ledger backed by ClickHouse.
///
/// Accounts and transactions live in `ReplacingMergeTree` tables keyed by a
/// row version; every update writes a new version and reads use `FINAL`.
/// Anomaly records are append-only.
pub struct ClickhouseLedgerStore {
    client: Client,
    database: String,
    version: AtomicU64,
}

impl ClickhouseLedgerStore {
    pub fn new(config: &DbConfig) -> Self {
        let mut client = Client::default()
            .with_url(config.clickhouse_url.clone())
            .with_database(config.clickhouse_database.clone());
        if let Some(user) = &config.clickhouse_user {
            client = client.with_user(user.clone());
        }
        if let Some(password) = &config.clickhouse_password {
            client = client.with_password(password.clone());
        }
        Self {
            client,
            database: config.clickhouse_database.clone(),
            version: AtomicU64::new(0),
        }
    }

    /// Strictly increasing within the process, seeded from the wall clock.
    fn next_version(&self) -> u64 {
        let now = OffsetDateTime::now_utc().unix_timestamp_nanos().max(0) as u64;
        let mut current = self.version.load(Ordering::Relaxed);
        loop {
            let next = now.max(current + 1);
            match self
                .version
                .compare_exchange(current, next, Ordering::SeqCst, Ordering::Relaxed)
            {
                Ok(_) => return next,
                Err(actual) => current = actual,
            }
        }
    }

    async fn write_account(&self, account: &Account) -> Result<(), StoreError> {
        let row = account_to_row(account, self.next_version())?;
        let mut insert = self.client.insert("accounts").map_err(store_err)?;
        insert.write(&row).await.map_err(store_err)?;
        insert.end().await.map_err(store_err)?;
        Ok(())
    }

    async fn write_transaction(&self, transaction: &Transaction) -> Result<(), StoreError> {
        let row = transaction_to_row(transaction, self.next_version())?;
        let mut insert = self.client.insert("transactions").map_err(store_err)?;
        insert.write(&row).await.map_err(store_err)?;
        insert.end().await.map_err(store_err)?;
        Ok(())
    }

    async fn find_account(&self, account_id: &str) -> Result<Option<Account>, StoreError> {
        let rows = self
            .client
            .query("SELECT ?fields FROM accounts FINAL WHERE account_id = ? LIMIT 1")
            .bind(account_id)
            .fetch_all::<AccountRow>()
            .await
            .map_err(store_err)?;
        rows.into_iter().next().map(row_to_account).transpose()
    }
}

#[async_trait]
impl LedgerStore for ClickhouseLedgerStore {
    async fn ensure_schema(&self) -> Result<(), StoreError> {
        let create_db = format!(
            "CREATE DATABASE IF NOT EXISTS {}",
            quote_identifier(&self.database)?
        );
        self.client
            .clone()
            .with_database("default")
            .query(&create_db)
            .execute()
            .await
            .map_err(store_err)?;

        let create_accounts = r#"
CREATE TABLE IF NOT EXISTS accounts (
    account_id String,
    account_type LowCardinality(String),
    balance_cents Int64,
    opening_balance_cents Int64,
    risk_level LowCardinality(String),
    risk_score Float64,
    dirty UInt8,
    last_transaction_ms Nullable(Int64),
    write_seq UInt64,
    created_at DateTime64(3),
    updated_at DateTime64(3),
    version UInt64
) ENGINE = ReplacingMergeTree(version)
ORDER BY account_id
"#;
        self.client
            .query(create_accounts)
            .execute()
            .await
            .map_err(store_err)?;

        let create_transactions = r#"
CREATE TABLE IF NOT EXISTS transactions (
    transaction_id String,
    account_id String,
    transaction_type LowCardinality(String),
    amount_cents Int64,
    balance_after_cents Int64,
    description Nullable(String),
    event_time DateTime64(3),
    sequence UInt64,
    risk_score Nullable(Float64),
    risk_level Nullable(String),
    is_anomaly UInt8,
    version UInt64
) ENGINE = ReplacingMergeTree(version)
PARTITION BY toYYYYMM(event_time)
ORDER BY (account_id, event_time, transaction_id)
"#;
        self.client
            .query(create_transactions)
            .execute()
            .await
            .map_err(store_err)?;

        let create_anomalies = r#"
CREATE TABLE IF NOT EXISTS anomalies (
    anomaly_id String,
    transaction_id String,
    account_id String,
    risk_score Float64,
    risk_level LowCardinality(String),
    detected_at DateTime64(3),
    model_version String,
    features_json String
) ENGINE = MergeTree
PARTITION BY toYYYYMM(detected_at)
ORDER BY (account_id, detected_at, anomaly_id)
"#;
        self.client
            .query(create_anomalies)
            .execute()
            .await
            .map_err(store_err)?;
        Ok(())
    }

    async fn ping(&self) -> Result<(), StoreError> {
        let _: u8 = self
            .client
            .query("SELECT toUInt8(1)")
            .fetch_one()
            .await
            .map_err(store_err)?;
        Ok(())
    }

    async fn insert_account(&self, account: &Account) -> Result<(), StoreError> {
        if self.find_account(&account.account_id).await?.is_some() {
            return Err(StoreError::Conflict {
                kind: "account",
                id: account.account_id.clone(),
            });
        }
        self.write_account(account).await
    }

    async fn get_account(&self, account_id: &str) -> Result<Account, StoreError> {
        self.find_account(account_id)
            .await?
            .ok_or_else(|| StoreError::NotFound {
                kind: "account",
                id: account_id.to_string(),
            })
    }

    async fn put_account(&self, account: &Account) -> Result<(), StoreError> {
        self.write_account(account).await
    }

    async fn list_dirty_accounts(&self) -> Result<Vec<Account>, StoreError> {
        let rows = self
            .client
            .query("SELECT ?fields FROM accounts FINAL WHERE dirty = 1 ORDER BY account_id")
            .fetch_all::<AccountRow>()
            .await
            .map_err(store_err)?;
        rows.into_iter().map(row_to_account).collect()
    }

    async fn patch_account(&self, account_id: &str, patch: &AccountPatch) -> Result<(), StoreError> {
        let mut account = self.get_account(account_id).await?;
        account.apply_patch(patch);
        self.write_account(&account).await
    }

    async fn insert_transaction(&self, transaction: &Transaction) -> Result<(), StoreError> {
        self.write_transaction(transaction).await
    }

    async fn get_transaction_window(
        &self,
        account_id: &str,
        window: &WindowSpec,
    ) -> Result<Vec<Transaction>, StoreError> {
        let mut rows = self
            .client
            .query(
                "SELECT ?fields FROM transactions FINAL \
                 WHERE account_id = ? \
                 AND event_time >= fromUnixTimestamp64Milli(?) \
                 AND event_time <= fromUnixTimestamp64Milli(?) \
                 ORDER BY event_time DESC, sequence DESC, transaction_id DESC \
                 LIMIT ?",
            )
            .bind(account_id)
            .bind(window.since_ms)
            .bind(window.until_ms)
            .bind(window.limit as u64)
            .fetch_all::<TransactionRow>()
            .await
            .map_err(store_err)?;
        rows.reverse();
        rows.into_iter().map(row_to_transaction).collect()
    }

    async fn patch_transaction(
        &self,
        transaction_id: &str,
        patch: &TransactionRiskPatch,
    ) -> Result<(), StoreError> {
        let rows = self
            .client
            .query("SELECT ?fields FROM transactions FINAL WHERE transaction_id = ? LIMIT 1")
            .bind(transaction_id)
            .fetch_all::<TransactionRow>()
            .await
            .map_err(store_err)?;
        let row = rows.into_iter().next().ok_or_else(|| StoreError::NotFound {
            kind: "transaction",
            id: transaction_id.to_string(),
        })?;
        let mut transaction = row_to_transaction(row)?;
        transaction.apply_patch(patch);
        self.write_transaction(&transaction).await
    }

    async fn put_anomaly(&self, record: &AnomalyRecord) -> Result<(), StoreError> {
        let row = anomaly_to_row(record)?;
        let mut insert = self.client.insert("anomalies").map_err(store_err)?;
        insert.write(&row).await.map_err(store_err)?;
        insert.end().await.map_err(store_err)?;
        Ok(())
    }

    async fn list_anomalies(&self, query: &AnomalyQuery) -> Result<Vec<AnomalyRecord>, StoreError> {
        let mut sql = String::from("SELECT ?fields FROM anomalies WHERE 1 = 1");
        if query.account_id.is_some() {
            sql.push_str(" AND account_id = ?");
        }
        if query.transaction_id.is_some() {
            sql.push_str(" AND transaction_id = ?");
        }
        sql.push_str(" ORDER BY detected_at DESC, anomaly_id DESC");
        if query.limit.is_some() {
            sql.push_str(" LIMIT ?");
        }

        let mut select = self.client.query(&sql);
        if let Some(account_id) = &query.account_id {
            select = select.bind(account_id.as_str());
        }
        if let Some(transaction_id) = &query.transaction_id {
            select = select.bind(transaction_id.as_str());
        }
        if let Some(limit) = query.limit {
            select = select.bind(limit as u64);
        }
        let rows = select.fetch_all::<AnomalyRow>().await.map_err(store_err)?;
        rows.into_iter().map(row_to_anomaly).collect()
    }
}

fn store_err(err: clickhouse::error::Error) -> StoreError {
    match err {
        clickhouse::error::Error::Network(inner) => StoreError::Unavailable(inner.to_string()),
        other => StoreError::Backend(anyhow!(other)),
    }
}

fn to_cents(value: rust_decimal::Decimal, field: &str) -> Result<i64, StoreError> {
    decimal_to_cents(value).ok_or_else(|| {
        StoreError::Malformed(format!("{} {} is not a whole number of cents", field, value))
    })
}

/// Backtick-quotes a plain identifier; anything else is refused.
fn quote_identifier(name: &str) -> Result<String, StoreError> {
    if !crate::config::is_plain_identifier(name) {
        return Err(StoreError::Malformed(format!("invalid identifier '{}'", name)));
    }
    Ok(format!("`{}`", name))
}

fn parse_column<T: FromStr>(value: &str, column: &str) -> Result<T, StoreError> {
    value
        .parse()
        .map_err(|_| StoreError::Malformed(format!("unexpected {} '{}'", column, value)))
}

fn account_to_row(account: &Account, version: u64) -> Result<AccountRow, StoreError> {
    Ok(AccountRow {
        account_id: account.account_id.clone(),
        account_type: account.account_type.as_str().to_string(),
        balance_cents: to_cents(account.balance, "balance")?,
        opening_balance_cents: to_cents(account.opening_balance, "opening_balance")?,
        risk_level: account.risk_level.as_str().to_string(),
        risk_score: account.risk_score,
        dirty: u8::from(account.dirty),
        last_transaction_ms: account.last_transaction_at,
        write_seq: account.write_seq,
        created_at: millis_to_offset(account.created_at),
        updated_at: millis_to_offset(account.updated_at),
        version,
    })
}

fn row_to_account(row: AccountRow) -> Result<Account, StoreError> {
    Ok(Account {
        account_type: parse_column::<AccountType>(&row.account_type, "account_type")?,
        risk_level: parse_column::<RiskLevel>(&row.risk_level, "risk_level")?,
        account_id: row.account_id,
        balance: cents_to_decimal(row.balance_cents),
        opening_balance: cents_to_decimal(row.opening_balance_cents),
        risk_score: row.risk_score,
        dirty: row.dirty != 0,
        last_transaction_at: row.last_transaction_ms,
        write_seq: row.write_seq,
        created_at: offset_to_millis(row.created_at),
        updated_at: offset_to_millis(row.updated_at),
    })
}

fn transaction_to_row(transaction: &Transaction, version: u64) -> Result<TransactionRow, StoreError> {
    Ok(TransactionRow {
        transaction_id: transaction.transaction_id.clone(),
        account_id: transaction.account_id.clone(),
        transaction_type: transaction.transaction_type.as_str().to_string(),
        amount_cents: to_cents(transaction.amount, "amount")?,
        balance_after_cents: to_cents(transaction.balance_after, "balance_after")?,
        description: transaction.description.clone(),
        event_time: millis_to_offset(transaction.timestamp),
        sequence: transaction.sequence,
        risk_score: transaction.risk_score,
        risk_level: transaction.risk_level.map(|level| level.as_str().to_string()),
        is_anomaly: u8::from(transaction.is_anomaly),
        version,
    })
}

fn row_to_transaction(row: TransactionRow) -> Result<Transaction, StoreError> {
    let risk_level = match row.risk_level.as_deref() {
        Some(level) => Some(parse_column::<RiskLevel>(level, "risk_level")?),
        None => None,
    };
    Ok(Transaction {
        transaction_type: parse_column::<TransactionType>(&row.transaction_type, "transaction_type")?,
        transaction_id: row.transaction_id,
        account_id: row.account_id,
        amount: cents_to_decimal(row.amount_cents),
        balance_after: cents_to_decimal(row.balance_after_cents),
        description: row.description,
        timestamp: offset_to_millis(row.event_time),
        sequence: row.sequence,
        risk_score: row.risk_score,
        risk_level,
        is_anomaly: row.is_anomaly != 0,
    })
}

fn anomaly_to_row(record: &AnomalyRecord) -> Result<AnomalyRow, StoreError> {
    let features_json = serde_json::to_string(&record.features)
        .map_err(|err| StoreError::Malformed(format!("features: {}", err)))?;
    Ok(AnomalyRow {
        anomaly_id: record.anomaly_id.clone(),
        transaction_id: record.transaction_id.clone(),
        account_id: record.account_id.clone(),
        risk_score: record.risk_score,
        risk_level: record.risk_level.as_str().to_string(),
        detected_at: millis_to_offset(record.detected_at),
        model_version: record.model_version.clone(),
        features_json,
    })
}

fn row_to_anomaly(row: AnomalyRow) -> Result<AnomalyRecord, StoreError> {
    let features: FeatureVector = serde_json::from_str(&row.features_json)
        .map_err(|err| StoreError::Malformed(format!("features_json: {}", err)))?;
    Ok(AnomalyRecord {
        risk_level: parse_column::<RiskLevel>(&row.risk_level, "risk_level")?,
        anomaly_id: row.anomaly_id,
        transaction_id: row.transaction_id,
        account_id: row.account_id,
        risk_score: row.risk_score,
        detected_at: offset_to_millis(row.detected_at),
        model_version: row.model_version,
        features,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use backend_domain::NewAccount;
    use rust_decimal::Decimal;

    #[test]
    fn account_row_roundtrip_keeps_money_exact() {
        let mut account = Account::open(
            NewAccount {
                account_id: "acct-9".to_string(),
                account_type: AccountType::Business,
                opening_balance: Decimal::new(350_000, 2),
            },
            1_791_763_200_000,
        );
        account.dirty = true;
        account.last_transaction_at = Some(1_791_763_260_000);
        account.write_seq = 3;
        let row = account_to_row(&account, 7).expect("row");
        assert_eq!(row.balance_cents, 350_000);
        assert_eq!(row.account_type, "BUSINESS");
        assert_eq!(row_to_account(row).expect("account"), account);
    }

    #[test]
    fn unknown_stored_level_is_malformed() {
        let row = AnomalyRow {
            anomaly_id: "anom-1".to_string(),
            transaction_id: "txn-1".to_string(),
            account_id: "acct-1".to_string(),
            risk_score: 0.9,
            risk_level: "SEVERE".to_string(),
            detected_at: millis_to_offset(0),
            model_version: "isolation-forest-v1.0".to_string(),
            features_json: "{}".to_string(),
        };
        assert!(matches!(row_to_anomaly(row), Err(StoreError::Malformed(_))));
    }

    #[test]
    fn versions_strictly_increase() {
        let store = ClickhouseLedgerStore::new(&crate::AppConfig::default().to_db_config());
        let first = store.next_version();
        let second = store.next_version();
        assert!(second > first);
    }

    #[test]
    fn sub_cent_money_is_refused_not_rounded() {
        let mut account = Account::open(
            NewAccount {
                account_id: "acct-9".to_string(),
                account_type: AccountType::Checking,
                opening_balance: Decimal::ZERO,
            },
            0,
        );
        account.balance = Decimal::new(10_005, 3);
        match account_to_row(&account, 1) {
            Err(StoreError::Malformed(message)) => assert!(message.contains("balance")),
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn only_plain_identifiers_are_quoted() {
        assert_eq!(quote_identifier("liveflow_2").expect("quoted"), "`liveflow_2`");
        assert!(quote_identifier("liveflow; DROP DATABASE prod").is_err());
        assert!(quote_identifier("a`b").is_err());
    }
}
