// Detection run entities: invocation event, window selection and run summary

use serde::{Deserialize, Serialize};

/// Structured event accepted by the detection entry point.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DetectionEvent {
    #[serde(default = "default_true")]
    pub process_stale_accounts: bool,
    /// Reserved for persisted-model extensions; logged only.
    #[serde(default)]
    pub force_retrain: bool,
    /// Restricts the run to these dirty accounts. An empty list is a no-op run.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub account_ids: Option<Vec<String>>,
}

impl Default for DetectionEvent {
    fn default() -> Self {
        Self {
            process_stale_accounts: true,
            force_retrain: false,
            account_ids: None,
        }
    }
}

fn default_true() -> bool {
    true
}

/// Bounded slice of one account's history, ending at `until_ms` inclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowSpec {
    pub since_ms: i64,
    pub until_ms: i64,
    pub limit: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RunStatus {
    Completed,
    Skipped,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunSummary {
    pub run_id: String,
    pub status: RunStatus,
    pub accounts_selected: usize,
    pub accounts_processed: usize,
    pub accounts_skipped: usize,
    pub accounts_failed: usize,
    pub transactions_scored: usize,
    pub anomalies_recorded: usize,
    pub started_at: i64,
    pub finished_at: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn event_defaults_to_processing_stale_accounts() {
        let event: DetectionEvent = serde_json::from_str("{}").expect("parse");
        assert!(event.process_stale_accounts);
        assert!(!event.force_retrain);
        assert!(event.account_ids.is_none());
    }

    #[test]
    fn event_reads_camel_case_fields() {
        let event: DetectionEvent = serde_json::from_str(
            r#"{"processStaleAccounts":false,"forceRetrain":true,"accountIds":["a"]}"#,
        )
        .expect("parse");
        assert!(!event.process_stale_accounts);
        assert!(event.force_retrain);
        assert_eq!(event.account_ids, Some(vec!["a".to_string()]));
    }

    #[test]
    fn summary_uses_invoker_field_names() {
        let summary = RunSummary {
            run_id: "run-1".to_string(),
            status: RunStatus::Completed,
            accounts_selected: 3,
            accounts_processed: 1,
            accounts_skipped: 1,
            accounts_failed: 1,
            transactions_scored: 12,
            anomalies_recorded: 2,
            started_at: 1,
            finished_at: 2,
        };
        let value = serde_json::to_value(&summary).expect("serialize");
        assert_eq!(value["accountsProcessed"], 1);
        assert_eq!(value["accountsSkipped"], 1);
        assert_eq!(value["accountsFailed"], 1);
        assert_eq!(value["status"], "COMPLETED");
    }
}
