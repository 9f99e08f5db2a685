use std::sync::atomic::{AtomicU64, Ordering};

use backend_domain::RunSummary;

#[derive(Debug, Default)]
pub struct Metrics {
    transactions_recorded: AtomicU64,
    runs: AtomicU64,
    run_failures: AtomicU64,
    accounts_processed: AtomicU64,
    accounts_skipped: AtomicU64,
    accounts_failed: AtomicU64,
    transactions_scored: AtomicU64,
    anomalies: AtomicU64,
}

impl Metrics {
    pub fn record_transaction(&self) {
        self.transactions_recorded.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_run(&self, summary: &RunSummary) {
        self.runs.fetch_add(1, Ordering::Relaxed);
        self.accounts_processed
            .fetch_add(summary.accounts_processed as u64, Ordering::Relaxed);
        self.accounts_skipped
            .fetch_add(summary.accounts_skipped as u64, Ordering::Relaxed);
        self.accounts_failed
            .fetch_add(summary.accounts_failed as u64, Ordering::Relaxed);
        self.transactions_scored
            .fetch_add(summary.transactions_scored as u64, Ordering::Relaxed);
        self.anomalies
            .fetch_add(summary.anomalies_recorded as u64, Ordering::Relaxed);
    }

    pub fn record_run_failure(&self) {
        self.runs.fetch_add(1, Ordering::Relaxed);
        self.run_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn render_prometheus(&self) -> String {
        let counters = [
            ("liveflow_transactions_recorded_total", &self.transactions_recorded),
            ("liveflow_detection_runs_total", &self.runs),
            ("liveflow_detection_run_failures_total", &self.run_failures),
            ("liveflow_accounts_processed_total", &self.accounts_processed),
            ("liveflow_accounts_skipped_total", &self.accounts_skipped),
            ("liveflow_accounts_failed_total", &self.accounts_failed),
            ("liveflow_transactions_scored_total", &self.transactions_scored),
            ("liveflow_anomalies_total", &self.anomalies),
        ];
        let mut out = String::new();
        for (name, counter) in counters {
            out.push_str(&format!(
                "# TYPE {name} counter\n{name} {}\n",
                counter.load(Ordering::Relaxed)
            ));
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use backend_domain::RunStatus;

    #[test]
    fn renders_run_counters() {
        let metrics = Metrics::default();
        metrics.record_run(&RunSummary {
            run_id: "run-1".to_string(),
            status: RunStatus::Completed,
            accounts_selected: 3,
            accounts_processed: 2,
            accounts_skipped: 1,
            accounts_failed: 0,
            transactions_scored: 24,
            anomalies_recorded: 4,
            started_at: 0,
            finished_at: 1,
        });
        metrics.record_run_failure();
        let text = metrics.render_prometheus();
        assert!(text.contains("liveflow_detection_runs_total 2\n"));
        assert!(text.contains("liveflow_detection_run_failures_total 1\n"));
        assert!(text.contains("liveflow_anomalies_total 4\n"));
        assert!(text.contains("# TYPE liveflow_accounts_processed_total counter\n"));
    }
}
