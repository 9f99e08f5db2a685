use std::collections::hash_map::DefaultHasher;
use std::collections::HashSet;
use std::hash::{Hash, Hasher};
use std::time::Duration;

use futures_util::stream::{self, StreamExt};
use thiserror::Error;
use tracing::{debug, error, info, warn};

use backend_domain::{
    account_risk, current_millis, extract_window_with_lead_in, fit_and_score, new_anomaly_id, new_run_id,
    Account, AccountPatch, AnomalyRecord, DetectionConfig, DetectionError, DetectionEvent,
    FeatureVector, RiskLevel, RunStatus, RunSummary, ScoredWindow, StoreError, Transaction,
    TransactionRiskPatch, WindowSpec,
};

use crate::error::RunError;
use crate::AppState;

/// Lease name shared by every detection run.
pub const DETECTION_LEASE: &str = "stale-account-detection";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum AccountOutcome {
    Processed {
        transactions_scored: usize,
        anomalies_recorded: usize,
    },
    Skipped,
    Failed,
}

#[derive(Debug, Error)]
enum AccountFailure {
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Detection(#[from] DetectionError),
    #[error("model fitting task failed: {0}")]
    Model(String),
}

/// Runs one detection pass over the dirty accounts.
///
/// Per-account failures are contained and counted; only a failed account
/// selection (or a held lease) fails the run as a whole.
pub async fn run_detection(
    state: &AppState,
    event: DetectionEvent,
) -> Result<RunSummary, RunError> {
    let run_id = new_run_id();
    let started_at = current_millis();
    info!(
        run_id = %run_id,
        process_stale_accounts = event.process_stale_accounts,
        force_retrain = event.force_retrain,
        "detection run starting"
    );
    if event.force_retrain {
        debug!(run_id = %run_id, "forceRetrain requested; models are refit every run");
    }

    let explicit_empty = matches!(&event.account_ids, Some(ids) if ids.is_empty());
    if !event.process_stale_accounts || explicit_empty {
        info!(run_id = %run_id, "stale account processing disabled, skipping");
        let summary = empty_summary(run_id, RunStatus::Skipped, started_at);
        *state.last_run.write().await = Some(summary.clone());
        return Ok(summary);
    }

    let ttl = Duration::from_secs(state.config.detection.run_lease_ttl_seconds);
    let acquired = state
        .run_lease
        .try_acquire(DETECTION_LEASE, &run_id, ttl)
        .await
        .map_err(RunError::Lease)?;
    if !acquired {
        warn!(run_id = %run_id, "detection lease held by another run");
        return Err(RunError::AlreadyRunning);
    }

    let result = run_with_lease(state, &event, &run_id, started_at).await;

    if let Err(err) = state.run_lease.release(DETECTION_LEASE, &run_id).await {
        warn!(run_id = %run_id, "failed to release detection lease: {}", err);
    }

    match &result {
        Ok(summary) => {
            state.metrics.record_run(summary);
            *state.last_run.write().await = Some(summary.clone());
            info!(
                run_id = %run_id,
                processed = summary.accounts_processed,
                skipped = summary.accounts_skipped,
                failed = summary.accounts_failed,
                anomalies = summary.anomalies_recorded,
                "detection run complete"
            );
        }
        Err(err) => {
            state.metrics.record_run_failure();
            error!(run_id = %run_id, "detection run failed: {}", err);
        }
    }
    result
}

async fn run_with_lease(
    state: &AppState,
    event: &DetectionEvent,
    run_id: &str,
    started_at: i64,
) -> Result<RunSummary, RunError> {
    let mut accounts = state
        .store
        .list_dirty_accounts()
        .await
        .map_err(RunError::StoreUnavailable)?;
    if let Some(ids) = &event.account_ids {
        let wanted: HashSet<&str> = ids.iter().map(String::as_str).collect();
        accounts.retain(|account| wanted.contains(account.account_id.as_str()));
    }
    info!(run_id = %run_id, "found {} stale accounts for processing", accounts.len());

    let mut summary = empty_summary(run_id.to_string(), RunStatus::Completed, started_at);
    summary.accounts_selected = accounts.len();
    if accounts.is_empty() {
        summary.finished_at = current_millis();
        return Ok(summary);
    }

    let config = &state.config.detection;
    let run_seed = config.model_seed.unwrap_or_else(rand::random);
    debug!(run_id = %run_id, run_seed, "model seed for this run");

    let concurrency = config.max_concurrent_accounts.max(1);
    let tasks: Vec<_> = accounts
        .into_iter()
        .map(|account| process_account(state, account, run_seed))
        .collect();
    let outcomes: Vec<AccountOutcome> = stream::iter(tasks)
        .buffer_unordered(concurrency)
        .collect()
        .await;

    for outcome in outcomes {
        match outcome {
            AccountOutcome::Processed {
                transactions_scored,
                anomalies_recorded,
            } => {
                summary.accounts_processed += 1;
                summary.transactions_scored += transactions_scored;
                summary.anomalies_recorded += anomalies_recorded;
            }
            AccountOutcome::Skipped => summary.accounts_skipped += 1,
            AccountOutcome::Failed => summary.accounts_failed += 1,
        }
    }
    summary.finished_at = current_millis();
    Ok(summary)
}

async fn process_account(state: &AppState, account: Account, run_seed: u64) -> AccountOutcome {
    let account_id = account.account_id.clone();
    debug!(account_id = %account_id, "processing account");
    match score_account(state, &account, run_seed).await {
        Ok(outcome) => outcome,
        Err(err) => {
            error!(
                account_id = %account_id,
                "failed to process account, leaving it dirty: {}",
                err
            );
            AccountOutcome::Failed
        }
    }
}

async fn score_account(
    state: &AppState,
    account: &Account,
    run_seed: u64,
) -> Result<AccountOutcome, AccountFailure> {
    let config = &state.config.detection;
    let window = window_for(account, config, current_millis());
    let transactions = state
        .store
        .get_transaction_window(&account.account_id, &window)
        .await?;
    debug!(
        account_id = %account.account_id,
        "retrieved {} transactions",
        transactions.len()
    );

    let processed_seq = Some(
        transactions
            .last()
            .map_or(account.write_seq, |txn| txn.sequence.max(account.write_seq)),
    );

    let lead_in = velocity_lead_in(state, &account.account_id, &transactions, config).await?;
    let features = match extract_window_with_lead_in(
        &lead_in,
        &transactions,
        config.velocity_window_ms(),
    ) {
        Ok(features) => features,
        Err(err) if err.is_skip() => {
            return skip_account(state, account, processed_seq, &err).await;
        }
        Err(err) => return Err(err.into()),
    };
    if features.len() < config.min_population {
        let err = DetectionError::InsufficientData {
            have: features.len(),
            need: config.min_population,
        };
        return skip_account(state, account, processed_seq, &err).await;
    }

    let scorer = config.scorer();
    let seed = account_seed(run_seed, &account.account_id);
    let (features, fitted) = tokio::task::spawn_blocking(move || {
        let fitted = fit_and_score(&features, &scorer, seed);
        (features, fitted)
    })
    .await
    .map_err(|err| AccountFailure::Model(err.to_string()))?;
    let scored = match fitted {
        Ok(scored) => scored,
        Err(err) if err.is_skip() => {
            return skip_account(state, account, processed_seq, &err).await;
        }
        Err(err) => return Err(err.into()),
    };
    debug!(
        account_id = %account.account_id,
        model_outliers = scored.outlier_count(),
        "model fitted on {} transactions",
        features.len()
    );

    let anomalies_recorded =
        persist_scores(state, account, &transactions, &features, &scored, config).await?;

    let (risk_score, risk_level) = account_risk(
        &scored.scores,
        config.account_aggregate,
        config.recent_weight_decay,
    );
    state
        .store
        .patch_account(
            &account.account_id,
            &AccountPatch {
                risk: Some((risk_score, risk_level)),
                clear_dirty: true,
                processed_seq,
                updated_at: current_millis(),
            },
        )
        .await?;

    info!(
        account_id = %account.account_id,
        risk_level = %risk_level,
        "account processed: {} anomalies detected from {} transactions",
        anomalies_recorded,
        transactions.len()
    );
    Ok(AccountOutcome::Processed {
        transactions_scored: transactions.len(),
        anomalies_recorded,
    })
}

async fn persist_scores(
    state: &AppState,
    account: &Account,
    transactions: &[Transaction],
    features: &[FeatureVector],
    scored: &ScoredWindow,
    config: &DetectionConfig,
) -> Result<usize, AccountFailure> {
    let detected_at = current_millis();
    let mut anomalies_recorded = 0;
    for ((txn, feature), score) in transactions.iter().zip(features).zip(&scored.scores) {
        let risk_level = RiskLevel::from_score(*score);
        let is_anomaly = risk_level.is_flagged();
        state
            .store
            .patch_transaction(
                &txn.transaction_id,
                &TransactionRiskPatch {
                    risk_score: *score,
                    risk_level,
                    is_anomaly,
                },
            )
            .await?;
        if !is_anomaly {
            continue;
        }
        let record = AnomalyRecord {
            anomaly_id: new_anomaly_id(),
            transaction_id: txn.transaction_id.clone(),
            account_id: account.account_id.clone(),
            risk_score: *score,
            risk_level,
            detected_at,
            model_version: config.model_version.clone(),
            features: *feature,
        };
        state.store.put_anomaly(&record).await?;
        debug!(
            account_id = %account.account_id,
            transaction_id = %txn.transaction_id,
            anomaly_id = %record.anomaly_id,
            "anomaly recorded"
        );
        anomalies_recorded += 1;
    }
    Ok(anomalies_recorded)
}

async fn skip_account(
    state: &AppState,
    account: &Account,
    processed_seq: Option<u64>,
    reason: &DetectionError,
) -> Result<AccountOutcome, AccountFailure> {
    warn!(account_id = %account.account_id, "skipping account: {}", reason);
    if state.config.detection.skip_clears_dirty {
        state
            .store
            .patch_account(
                &account.account_id,
                &AccountPatch {
                    risk: None,
                    clear_dirty: true,
                    processed_seq,
                    updated_at: current_millis(),
                },
            )
            .await?;
    }
    Ok(AccountOutcome::Skipped)
}

/// Transactions booked within the velocity window before `window[0]` that
/// the window itself left out, oldest first.
async fn velocity_lead_in(
    state: &AppState,
    account_id: &str,
    window: &[Transaction],
    config: &DetectionConfig,
) -> Result<Vec<Transaction>, StoreError> {
    let Some(first) = window.first() else {
        return Ok(Vec::new());
    };
    let spec = lead_in_spec(first.timestamp, window.len(), config);
    let in_window: HashSet<&str> = window
        .iter()
        .map(|txn| txn.transaction_id.as_str())
        .collect();
    let mut lead_in = state.store.get_transaction_window(account_id, &spec).await?;
    lead_in.retain(|txn| !in_window.contains(txn.transaction_id.as_str()));
    Ok(lead_in)
}

/// Velocity range before a window starting at `first_timestamp`. Rows sharing
/// that timestamp may already be in the window, so the limit leaves room for them.
fn lead_in_spec(first_timestamp: i64, window_len: usize, config: &DetectionConfig) -> WindowSpec {
    WindowSpec {
        since_ms: first_timestamp
            .saturating_sub(config.velocity_window_ms())
            .saturating_add(1),
        until_ms: first_timestamp,
        limit: config.window_limit.max(1).saturating_add(window_len),
    }
}

/// Trailing window ending at the account's newest transaction.
pub fn window_for(account: &Account, config: &DetectionConfig, now: i64) -> WindowSpec {
    let until_ms = account.last_transaction_at.unwrap_or(now);
    WindowSpec {
        since_ms: until_ms.saturating_sub(config.lookback_ms()),
        until_ms,
        limit: config.window_limit.max(1),
    }
}

fn account_seed(run_seed: u64, account_id: &str) -> u64 {
    let mut hasher = DefaultHasher::new();
    account_id.hash(&mut hasher);
    run_seed ^ hasher.finish()
}

fn empty_summary(run_id: String, status: RunStatus, started_at: i64) -> RunSummary {
    RunSummary {
        run_id,
        status,
        accounts_selected: 0,
        accounts_processed: 0,
        accounts_skipped: 0,
        accounts_failed: 0,
        transactions_scored: 0,
        anomalies_recorded: 0,
        started_at,
        finished_at: current_millis(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use backend_domain::{AccountType, NewAccount};
    use rust_decimal::Decimal;

    fn account(last_transaction_at: Option<i64>) -> Account {
        let mut account = Account::open(
            NewAccount {
                account_id: "acct-1".to_string(),
                account_type: AccountType::Savings,
                opening_balance: Decimal::ZERO,
            },
            0,
        );
        account.last_transaction_at = last_transaction_at;
        account
    }

    #[test]
    fn window_ends_at_latest_transaction() {
        let config = DetectionConfig::default();
        let window = window_for(&account(Some(40 * 86_400_000)), &config, 99 * 86_400_000);
        assert_eq!(window.until_ms, 40 * 86_400_000);
        assert_eq!(window.since_ms, 10 * 86_400_000);
        assert_eq!(window.limit, 100);
    }

    #[test]
    fn window_falls_back_to_now_without_history() {
        let config = DetectionConfig::default();
        let window = window_for(&account(None), &config, 5_000);
        assert_eq!(window.until_ms, 5_000);
    }

    #[test]
    fn account_seed_is_stable_within_a_run() {
        assert_eq!(account_seed(9, "acct-1"), account_seed(9, "acct-1"));
        assert_ne!(account_seed(9, "acct-1"), account_seed(9, "acct-2"));
    }

    #[test]
    fn lead_in_covers_the_velocity_window_before_the_first_row() {
        let config = DetectionConfig::default();
        let spec = lead_in_spec(10_000_000, 3, &config);
        assert_eq!(spec.until_ms, 10_000_000);
        assert_eq!(spec.since_ms, 10_000_000 - 3_600_000 + 1);
        assert_eq!(spec.limit, 103);
    }
}
