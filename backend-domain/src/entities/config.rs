// Runtime configuration handed to the application layer

use serde::{Deserialize, Serialize};

use crate::services::ScorerConfig;
use crate::utils::{MILLIS_PER_DAY, MILLIS_PER_SECOND};

#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    pub bind_addr: String,
    pub max_body_bytes: u64,
    pub request_timeout_seconds: u64,
    pub detection_interval_seconds: u64,
    pub detection: DetectionConfig,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccountAggregate {
    #[default]
    Max,
    RecentWeighted,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DetectionConfig {
    pub lookback_days: u64,
    pub window_limit: usize,
    pub velocity_window_seconds: u64,
    pub min_population: usize,
    pub contamination: f64,
    pub n_estimators: usize,
    pub max_samples: usize,
    pub model_seed: Option<u64>,
    pub model_version: String,
    pub account_aggregate: AccountAggregate,
    pub recent_weight_decay: f64,
    pub skip_clears_dirty: bool,
    pub max_concurrent_accounts: usize,
    pub run_lease_ttl_seconds: u64,
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            lookback_days: 30,
            window_limit: 100,
            velocity_window_seconds: 3_600,
            min_population: 10,
            contamination: 0.1,
            n_estimators: 100,
            max_samples: 256,
            model_seed: None,
            model_version: "isolation-forest-v1.0".to_string(),
            account_aggregate: AccountAggregate::Max,
            recent_weight_decay: 0.9,
            skip_clears_dirty: true,
            max_concurrent_accounts: 4,
            run_lease_ttl_seconds: 900,
        }
    }
}

impl DetectionConfig {
    pub fn lookback_ms(&self) -> i64 {
        (self.lookback_days as i64).saturating_mul(MILLIS_PER_DAY)
    }

    pub fn velocity_window_ms(&self) -> i64 {
        (self.velocity_window_seconds as i64).saturating_mul(MILLIS_PER_SECOND)
    }

    pub fn scorer(&self) -> ScorerConfig {
        ScorerConfig {
            n_estimators: self.n_estimators,
            max_samples: self.max_samples,
            contamination: self.contamination,
            min_population: self.min_population,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StorageBackend {
    #[default]
    Memory,
    Clickhouse,
}

#[derive(Debug, Clone)]
pub struct DbConfig {
    pub storage_backend: StorageBackend,
    pub clickhouse_url: String,
    pub clickhouse_database: String,
    pub clickhouse_user: Option<String>,
    pub clickhouse_password: Option<String>,
}
