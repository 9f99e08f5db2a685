use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use rust_decimal::Decimal;

use backend_application::commands::ledger_commands::{open_account, record_transaction};
use backend_application::detect::{run_detection, DETECTION_LEASE};
use backend_application::{AppError, AppState, RunError};
use backend_domain::{
    Account, AccountPatch, AccountType, AnomalyQuery, AnomalyRecord, DetectionEvent, LedgerStore,
    NewAccount, RiskLevel, RunLease, RunStatus, RuntimeConfig, StoreError, Transaction,
    TransactionDraft, TransactionRiskPatch, TransactionType, WindowSpec, MILLIS_PER_DAY,
};
use backend_infrastructure::{AppConfig, InMemoryLedgerStore, InMemoryRunLease};

/// 2026-10-12 00:00:00 UTC, a Monday.
const MONDAY: i64 = 1_791_763_200_000;
const HOUR: i64 = 3_600_000;

/// Wraps the in-memory ledger and fails selected calls on demand.
struct FaultyStore {
    inner: InMemoryLedgerStore,
    fail_selection: AtomicBool,
    fail_windows: Mutex<HashSet<String>>,
}

impl FaultyStore {
    fn new() -> Self {
        Self {
            inner: InMemoryLedgerStore::new(),
            fail_selection: AtomicBool::new(false),
            fail_windows: Mutex::new(HashSet::new()),
        }
    }

    fn fail_window_for(&self, account_id: &str) {
        self.fail_windows
            .lock()
            .expect("lock")
            .insert(account_id.to_string());
    }
}

#[async_trait]
impl LedgerStore for FaultyStore {
    async fn ensure_schema(&self) -> Result<(), StoreError> {
        self.inner.ensure_schema().await
    }

    async fn ping(&self) -> Result<(), StoreError> {
        self.inner.ping().await
    }

    async fn insert_account(&self, account: &Account) -> Result<(), StoreError> {
        self.inner.insert_account(account).await
    }

    async fn get_account(&self, account_id: &str) -> Result<Account, StoreError> {
        self.inner.get_account(account_id).await
    }

    async fn put_account(&self, account: &Account) -> Result<(), StoreError> {
        self.inner.put_account(account).await
    }

    async fn list_dirty_accounts(&self) -> Result<Vec<Account>, StoreError> {
        if self.fail_selection.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("connection refused".to_string()));
        }
        self.inner.list_dirty_accounts().await
    }

    async fn patch_account(&self, account_id: &str, patch: &AccountPatch) -> Result<(), StoreError> {
        self.inner.patch_account(account_id, patch).await
    }

    async fn insert_transaction(&self, transaction: &Transaction) -> Result<(), StoreError> {
        self.inner.insert_transaction(transaction).await
    }

    async fn get_transaction_window(
        &self,
        account_id: &str,
        window: &WindowSpec,
    ) -> Result<Vec<Transaction>, StoreError> {
        if self.fail_windows.lock().expect("lock").contains(account_id) {
            return Err(StoreError::Unavailable("read timed out".to_string()));
        }
        self.inner.get_transaction_window(account_id, window).await
    }

    async fn patch_transaction(
        &self,
        transaction_id: &str,
        patch: &TransactionRiskPatch,
    ) -> Result<(), StoreError> {
        self.inner.patch_transaction(transaction_id, patch).await
    }

    async fn put_anomaly(&self, record: &AnomalyRecord) -> Result<(), StoreError> {
        self.inner.put_anomaly(record).await
    }

    async fn list_anomalies(&self, query: &AnomalyQuery) -> Result<Vec<AnomalyRecord>, StoreError> {
        self.inner.list_anomalies(query).await
    }
}

fn runtime_config() -> RuntimeConfig {
    let mut config = AppConfig::default().to_runtime_config();
    config.detection.model_seed = Some(7);
    config
}

fn state_with(store: Arc<FaultyStore>) -> AppState {
    AppState::new(runtime_config(), store, Arc::new(InMemoryRunLease::new()))
}

fn cents(value: i64) -> Decimal {
    Decimal::new(value, 2)
}

async fn open(state: &AppState, account_id: &str, opening: Decimal) -> Account {
    open_account(
        state,
        NewAccount {
            account_id: account_id.to_string(),
            account_type: AccountType::Checking,
            opening_balance: opening,
        },
    )
    .await
    .expect("open account")
}

async fn book(
    state: &AppState,
    account_id: &str,
    transaction_type: TransactionType,
    amount: Decimal,
    timestamp: i64,
) -> Transaction {
    record_transaction(
        state,
        account_id,
        TransactionDraft {
            transaction_type,
            amount,
            description: None,
            timestamp: Some(timestamp),
        },
    )
    .await
    .expect("record transaction")
}

/// Ten days of small purchase/refund pairs around midday. Leaves the balance unchanged.
async fn book_routine(state: &AppState, account_id: &str, start_day: i64) {
    for day in start_day..start_day + 10 {
        let amount = cents(1_500 + day * 100);
        let base = MONDAY + day * MILLIS_PER_DAY;
        book(state, account_id, TransactionType::Purchase, amount, base + 12 * HOUR).await;
        book(state, account_id, TransactionType::Deposit, amount, base + 13 * HOUR).await;
    }
}

#[tokio::test]
async fn deposit_outlier_is_recorded_as_high_anomaly() {
    let store = Arc::new(FaultyStore::new());
    let state = state_with(store.clone());

    open(&state, "acct-e2e", cents(100_000)).await;
    let outlier = book(
        &state,
        "acct-e2e",
        TransactionType::Deposit,
        cents(250_000),
        MONDAY + 3 * HOUR,
    )
    .await;
    let account = store.get_account("acct-e2e").await.expect("account");
    assert_eq!(account.balance, cents(350_000));
    assert!(account.dirty);

    book_routine(&state, "acct-e2e", 1).await;

    let summary = run_detection(&state, DetectionEvent::default())
        .await
        .expect("run");
    assert_eq!(summary.status, RunStatus::Completed);
    assert_eq!(summary.accounts_selected, 1);
    assert_eq!(summary.accounts_processed, 1);
    assert_eq!(summary.transactions_scored, 21);
    assert!(summary.anomalies_recorded >= 1);

    let account = store.get_account("acct-e2e").await.expect("account");
    assert_eq!(account.balance, cents(350_000));
    assert!(!account.dirty);
    assert_eq!(account.risk_level, RiskLevel::High);

    let history = store.inner.transactions_for("acct-e2e").await;
    assert!(history.iter().all(|txn| txn.risk_score.is_some()));
    let scored_outlier = history
        .iter()
        .find(|txn| txn.transaction_id == outlier.transaction_id)
        .expect("outlier stored");
    assert_eq!(scored_outlier.risk_level, Some(RiskLevel::High));
    assert!(scored_outlier.is_anomaly);
    let top = history
        .iter()
        .filter_map(|txn| txn.risk_score)
        .fold(f64::MIN, f64::max);
    assert_eq!(scored_outlier.risk_score, Some(top));

    let records = store
        .list_anomalies(&AnomalyQuery {
            transaction_id: Some(outlier.transaction_id.clone()),
            ..AnomalyQuery::default()
        })
        .await
        .expect("anomalies");
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].risk_level, RiskLevel::High);
    assert_eq!(records[0].account_id, "acct-e2e");
    assert_eq!(records[0].model_version, "isolation-forest-v1.0");
    assert_eq!(records[0].features.amount, 2500.0);
    assert_eq!(records[0].features.balance_before, 1000.0);

    let last = state.last_run.read().await.clone().expect("last run stored");
    assert_eq!(last.run_id, summary.run_id);
}

#[tokio::test]
async fn short_history_is_skipped_and_cleared() {
    let store = Arc::new(FaultyStore::new());
    let state = state_with(store.clone());

    open(&state, "acct-short", cents(50_000)).await;
    for i in 0..3 {
        book(
            &state,
            "acct-short",
            TransactionType::Purchase,
            cents(2_000 + i),
            MONDAY + i * HOUR,
        )
        .await;
    }

    let summary = run_detection(&state, DetectionEvent::default())
        .await
        .expect("run");
    assert_eq!(summary.accounts_skipped, 1);
    assert_eq!(summary.accounts_processed, 0);
    assert_eq!(summary.anomalies_recorded, 0);

    let account = store.get_account("acct-short").await.expect("account");
    assert!(!account.dirty);
    assert_eq!(account.risk_level, RiskLevel::Low);
    assert_eq!(store.inner.anomaly_count().await, 0);
    let history = store.inner.transactions_for("acct-short").await;
    assert!(history.iter().all(|txn| txn.risk_score.is_none()));
}

#[tokio::test]
async fn clean_accounts_are_not_touched() {
    let store = Arc::new(FaultyStore::new());
    let state = state_with(store.clone());

    let opened = open(&state, "acct-clean", cents(10_000)).await;
    let summary = run_detection(&state, DetectionEvent::default())
        .await
        .expect("run");
    assert_eq!(summary.accounts_selected, 0);
    assert_eq!(store.get_account("acct-clean").await.expect("account"), opened);
}

#[tokio::test]
async fn second_run_keeps_earlier_anomaly_records() {
    let store = Arc::new(FaultyStore::new());
    let state = state_with(store.clone());

    open(&state, "acct-twice", cents(100_000)).await;
    book(
        &state,
        "acct-twice",
        TransactionType::Withdrawal,
        cents(90_000),
        MONDAY + 2 * HOUR,
    )
    .await;
    book_routine(&state, "acct-twice", 1).await;

    run_detection(&state, DetectionEvent::default())
        .await
        .expect("first run");
    let first: HashSet<String> = store
        .list_anomalies(&AnomalyQuery::default())
        .await
        .expect("anomalies")
        .into_iter()
        .map(|record| record.anomaly_id)
        .collect();
    assert!(!first.is_empty());

    let idle = run_detection(&state, DetectionEvent::default())
        .await
        .expect("idle run");
    assert_eq!(idle.accounts_selected, 0);

    book(
        &state,
        "acct-twice",
        TransactionType::Purchase,
        cents(1_800),
        MONDAY + 11 * MILLIS_PER_DAY + 12 * HOUR,
    )
    .await;
    let rerun = run_detection(&state, DetectionEvent::default())
        .await
        .expect("second run");
    assert_eq!(rerun.accounts_processed, 1);

    let second: HashSet<String> = store
        .list_anomalies(&AnomalyQuery::default())
        .await
        .expect("anomalies")
        .into_iter()
        .map(|record| record.anomaly_id)
        .collect();
    assert!(second.is_superset(&first));
    assert!(!store.get_account("acct-twice").await.expect("account").dirty);
}

#[tokio::test]
async fn unreachable_store_fails_the_run_and_keeps_flags() {
    let store = Arc::new(FaultyStore::new());
    let state = state_with(store.clone());

    open(&state, "acct-down", cents(10_000)).await;
    book(&state, "acct-down", TransactionType::Deposit, cents(500), MONDAY).await;
    store.fail_selection.store(true, Ordering::SeqCst);

    let err = run_detection(&state, DetectionEvent::default())
        .await
        .expect_err("selection must fail");
    assert!(matches!(err, RunError::StoreUnavailable(_)));
    assert!(store.get_account("acct-down").await.expect("account").dirty);
    assert!(state.last_run.read().await.is_none());

    // lease was released, the next run goes through
    store.fail_selection.store(false, Ordering::SeqCst);
    run_detection(&state, DetectionEvent::default())
        .await
        .expect("recovered run");
}

#[tokio::test]
async fn failing_account_stays_dirty_while_others_finish() {
    let store = Arc::new(FaultyStore::new());
    let state = state_with(store.clone());

    open(&state, "acct-bad", cents(10_000)).await;
    open(&state, "acct-good", cents(10_000)).await;
    book_routine(&state, "acct-bad", 0).await;
    book_routine(&state, "acct-good", 0).await;
    store.fail_window_for("acct-bad");

    let summary = run_detection(&state, DetectionEvent::default())
        .await
        .expect("run");
    assert_eq!(summary.accounts_selected, 2);
    assert_eq!(summary.accounts_failed, 1);
    assert_eq!(summary.accounts_processed, 1);

    assert!(store.get_account("acct-bad").await.expect("account").dirty);
    assert!(!store.get_account("acct-good").await.expect("account").dirty);
    assert!(state
        .metrics
        .render_prometheus()
        .contains("liveflow_accounts_failed_total 1\n"));
}

#[tokio::test]
async fn account_filter_limits_the_run() {
    let store = Arc::new(FaultyStore::new());
    let state = state_with(store.clone());

    open(&state, "acct-a", cents(10_000)).await;
    open(&state, "acct-b", cents(10_000)).await;
    book(&state, "acct-a", TransactionType::Deposit, cents(100), MONDAY).await;
    book(&state, "acct-b", TransactionType::Deposit, cents(100), MONDAY).await;

    let summary = run_detection(
        &state,
        DetectionEvent {
            account_ids: Some(vec!["acct-b".to_string()]),
            ..DetectionEvent::default()
        },
    )
    .await
    .expect("run");
    assert_eq!(summary.accounts_selected, 1);
    assert!(store.get_account("acct-a").await.expect("account").dirty);
    assert!(!store.get_account("acct-b").await.expect("account").dirty);
}

#[tokio::test]
async fn disabled_event_does_nothing() {
    let store = Arc::new(FaultyStore::new());
    let state = state_with(store.clone());

    open(&state, "acct-idle", cents(10_000)).await;
    book(&state, "acct-idle", TransactionType::Deposit, cents(100), MONDAY).await;

    let summary = run_detection(
        &state,
        DetectionEvent {
            process_stale_accounts: false,
            ..DetectionEvent::default()
        },
    )
    .await
    .expect("run");
    assert_eq!(summary.status, RunStatus::Skipped);
    assert!(store.get_account("acct-idle").await.expect("account").dirty);
}

#[tokio::test]
async fn held_lease_rejects_overlapping_run() {
    let store = Arc::new(FaultyStore::new());
    let lease = Arc::new(InMemoryRunLease::new());
    let state = AppState::new(runtime_config(), store.clone(), lease.clone());

    open(&state, "acct-lease", cents(10_000)).await;
    book(&state, "acct-lease", TransactionType::Deposit, cents(100), MONDAY).await;

    assert!(lease
        .try_acquire(DETECTION_LEASE, "run-elsewhere", Duration::from_secs(60))
        .await
        .expect("acquire"));
    let err = run_detection(&state, DetectionEvent::default())
        .await
        .expect_err("overlap");
    assert!(matches!(err, RunError::AlreadyRunning));
    assert!(store.get_account("acct-lease").await.expect("account").dirty);

    lease
        .release(DETECTION_LEASE, "run-elsewhere")
        .await
        .expect("release");
    run_detection(&state, DetectionEvent::default())
        .await
        .expect("run after release");
}

#[tokio::test]
async fn write_during_run_keeps_account_dirty() {
    let store = Arc::new(FaultyStore::new());
    let state = state_with(store.clone());

    open(&state, "acct-race", cents(10_000)).await;
    book_routine(&state, "acct-race", 0).await;

    // A pass covering the current history finishes after another write
    // landed on the same millisecond as the newest scored transaction.
    let scored = store.get_account("acct-race").await.expect("account");
    let last_at = scored.last_transaction_at.expect("history");
    book(&state, "acct-race", TransactionType::Purchase, cents(900), last_at).await;
    store
        .patch_account(
            "acct-race",
            &AccountPatch {
                risk: Some((0.5, RiskLevel::Medium)),
                clear_dirty: true,
                processed_seq: Some(scored.write_seq),
                updated_at: last_at + 1,
            },
        )
        .await
        .expect("patch");

    let account = store.get_account("acct-race").await.expect("account");
    assert!(account.dirty);
    assert_eq!(account.risk_level, RiskLevel::Medium);
}

#[tokio::test]
async fn sub_cent_money_is_rejected_at_the_write_path() {
    let store = Arc::new(FaultyStore::new());
    let state = state_with(store.clone());

    let err = open_account(
        &state,
        NewAccount {
            account_id: "acct-fraction".to_string(),
            account_type: AccountType::Checking,
            opening_balance: Decimal::new(100_001, 3),
        },
    )
    .await
    .expect_err("sub-cent opening balance");
    assert!(matches!(err, AppError::BadRequest(_)));

    open(&state, "acct-cents", cents(10_000)).await;
    let err = record_transaction(
        &state,
        "acct-cents",
        TransactionDraft {
            transaction_type: TransactionType::Deposit,
            amount: Decimal::new(12_345, 3),
            description: None,
            timestamp: Some(MONDAY),
        },
    )
    .await
    .expect_err("sub-cent amount");
    assert!(matches!(err, AppError::BadRequest(_)));

    let account = store.get_account("acct-cents").await.expect("account");
    assert_eq!(account.balance, cents(10_000));
    assert!(!account.dirty);
    assert!(store.inner.transactions_for("acct-cents").await.is_empty());
}
