// Identifier value objects

use uuid::Uuid;

pub fn new_transaction_id() -> String {
    format!("txn-{}", Uuid::new_v4().simple())
}

pub fn new_anomaly_id() -> String {
    format!("anom-{}", Uuid::new_v4().simple())
}

pub fn new_run_id() -> String {
    format!("run-{}", Uuid::new_v4().simple())
}

pub fn normalize_account_id(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() || trimmed.len() > 128 {
        return None;
    }
    if !trimmed
        .chars()
        .all(|ch| ch.is_ascii_alphanumeric() || ch == '-' || ch == '_')
    {
        return None;
    }
    Some(trimmed.to_string())
}
