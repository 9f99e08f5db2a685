// Feature extraction over one account's ordered transaction window

use chrono::{Datelike, Timelike};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;

use crate::entities::{FeatureVector, Transaction};
use crate::errors::DetectionError;
use crate::utils::millis_to_utc;

/// Features for every transaction of `window`, in window order.
///
/// `window` must hold a single account's transactions sorted by timestamp
/// ascending. An empty window has nothing to score.
pub fn extract_window(
    window: &[Transaction],
    velocity_window_ms: i64,
) -> Result<Vec<FeatureVector>, DetectionError> {
    extract_window_with_lead_in(&[], window, velocity_window_ms)
}

/// Like [`extract_window`], with `lead_in` holding the transactions booked
/// just before `window[0]`. They only feed the velocity count and are not
/// scored themselves.
pub fn extract_window_with_lead_in(
    lead_in: &[Transaction],
    window: &[Transaction],
    velocity_window_ms: i64,
) -> Result<Vec<FeatureVector>, DetectionError> {
    validate_window(window)?;
    validate_lead_in(lead_in, window)?;
    (0..window.len())
        .map(|index| build(lead_in, window, index, velocity_window_ms))
        .collect()
}

/// Features for `window[index]` given the transactions before it.
pub fn extract(
    window: &[Transaction],
    index: usize,
    velocity_window_ms: i64,
) -> Result<FeatureVector, DetectionError> {
    validate_window(window)?;
    if index >= window.len() {
        return Err(DetectionError::Validation(format!(
            "transaction index {} outside window of {}",
            index,
            window.len()
        )));
    }
    build(&[], window, index, velocity_window_ms)
}

fn validate_window(window: &[Transaction]) -> Result<(), DetectionError> {
    let Some(first) = window.first() else {
        return Err(DetectionError::InsufficientHistory);
    };
    check_ordered(window, &first.account_id)
}

fn validate_lead_in(lead_in: &[Transaction], window: &[Transaction]) -> Result<(), DetectionError> {
    let (Some(last), Some(first)) = (lead_in.last(), window.first()) else {
        return Ok(());
    };
    if let Some(stray) = lead_in.iter().find(|txn| txn.account_id != first.account_id) {
        return Err(DetectionError::Validation(format!(
            "lead-in for account {} contains transaction {} of account {}",
            first.account_id, stray.transaction_id, stray.account_id
        )));
    }
    check_ordered(lead_in, &first.account_id)?;
    if last.timestamp > first.timestamp {
        return Err(DetectionError::Validation(format!(
            "lead-in transaction {} is newer than window start {}",
            last.transaction_id, first.transaction_id
        )));
    }
    Ok(())
}

fn check_ordered(rows: &[Transaction], account_id: &str) -> Result<(), DetectionError> {
    for pair in rows.windows(2) {
        if pair[1].account_id != account_id {
            return Err(DetectionError::Validation(format!(
                "window for account {} contains transaction {} of account {}",
                account_id, pair[1].transaction_id, pair[1].account_id
            )));
        }
        if pair[1].timestamp < pair[0].timestamp {
            return Err(DetectionError::Validation(format!(
                "window for account {} is not ordered by timestamp at {}",
                account_id, pair[1].transaction_id
            )));
        }
    }
    Ok(())
}

fn build(
    lead_in: &[Transaction],
    window: &[Transaction],
    index: usize,
    velocity_window_ms: i64,
) -> Result<FeatureVector, DetectionError> {
    let txn = &window[index];
    let at = millis_to_utc(txn.timestamp);

    let balance_before = match index.checked_sub(1) {
        Some(prev) => window[prev].balance_after,
        None => txn.balance_after - txn.amount,
    };

    let window_start = txn.timestamp.saturating_sub(velocity_window_ms);
    let velocity = lead_in
        .iter()
        .chain(&window[..=index])
        .rev()
        .take_while(|earlier| earlier.timestamp > window_start)
        .count();

    Ok(FeatureVector {
        amount: to_f64(txn.amount.abs(), &txn.transaction_id)?,
        hour_of_day: at.hour(),
        day_of_week: at.weekday().num_days_from_monday(),
        balance_before: to_f64(balance_before, &txn.transaction_id)?,
        transaction_velocity: u32::try_from(velocity).unwrap_or(u32::MAX),
    })
}

fn to_f64(value: Decimal, transaction_id: &str) -> Result<f64, DetectionError> {
    value.to_f64().ok_or_else(|| {
        DetectionError::Validation(format!(
            "amount {} of transaction {} is not representable",
            value, transaction_id
        ))
    })
}
