use std::env;
use std::path::Path;

use anyhow::{anyhow, Result};
use serde::Deserialize;
use tokio::fs;
use tracing::warn;

use backend_domain::{AccountAggregate, DbConfig, DetectionConfig, RuntimeConfig, StorageBackend};

use crate::config::validation::{is_plain_identifier, validate_detection};

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct AppConfig {
    pub bind_addr: String,
    pub storage_backend: StorageBackend,
    pub clickhouse_url: String,
    pub clickhouse_database: String,
    pub clickhouse_user: Option<String>,
    pub clickhouse_password: Option<String>,
    pub max_body_bytes: u64,
    pub request_timeout_seconds: u64,
    pub detection_interval_seconds: u64,
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

impl Default for AppConfig {
    fn default() -> Self {
        let detection = DetectionConfig::default();
        Self {
            bind_addr: "127.0.0.1:3234".to_string(),
            storage_backend: StorageBackend::Memory,
            clickhouse_url: "http://127.0.0.1:8123".to_string(),
            clickhouse_database: "liveflow".to_string(),
            clickhouse_user: None,
            clickhouse_password: None,
            max_body_bytes: 1024 * 1024,
            request_timeout_seconds: 15,
            detection_interval_seconds: 300,
            lookback_days: detection.lookback_days,
            window_limit: detection.window_limit,
            velocity_window_seconds: detection.velocity_window_seconds,
            min_population: detection.min_population,
            contamination: detection.contamination,
            n_estimators: detection.n_estimators,
            max_samples: detection.max_samples,
            model_seed: detection.model_seed,
            model_version: detection.model_version,
            account_aggregate: detection.account_aggregate,
            recent_weight_decay: detection.recent_weight_decay,
            skip_clears_dirty: detection.skip_clears_dirty,
            max_concurrent_accounts: detection.max_concurrent_accounts,
            run_lease_ttl_seconds: detection.run_lease_ttl_seconds,
        }
    }
}

impl AppConfig {
    pub async fn load() -> Result<Self> {
        let path = env::var("LIVEFLOW_CONFIG").unwrap_or_else(|_| "./config.toml".to_string());
        let file_path = Path::new(&path);
        let mut config = if file_path.exists() {
            let content = fs::read_to_string(file_path).await?;
            toml::from_str(&content)?
        } else {
            warn!("{} not found, using defaults", path);
            AppConfig::default()
        };
        config.apply_env_overrides();
        config.normalize();
        config.validate()?;
        Ok(config)
    }

    pub fn normalize(&mut self) {
        if let Some(user) = &self.clickhouse_user {
            if user.trim().is_empty() {
                self.clickhouse_user = None;
            }
        }
        if let Some(password) = &self.clickhouse_password {
            if password.trim().is_empty() {
                self.clickhouse_password = None;
            }
        }
        self.model_version = self.model_version.trim().to_string();
        self.clickhouse_url = self.clickhouse_url.trim().trim_end_matches('/').to_string();
    }

    pub fn validate(&self) -> Result<()> {
        self.bind_addr
            .parse::<std::net::SocketAddr>()
            .map_err(|err| anyhow!("invalid bind_addr: {}", err))?;
        if self.max_body_bytes == 0 {
            return Err(anyhow!("max_body_bytes must be greater than 0"));
        }
        if self.request_timeout_seconds == 0 {
            return Err(anyhow!("request_timeout_seconds must be greater than 0"));
        }
        if self.storage_backend == StorageBackend::Clickhouse {
            if self.clickhouse_url.is_empty() {
                return Err(anyhow!("clickhouse_url must not be empty"));
            }
            if self.clickhouse_database.trim().is_empty() {
                return Err(anyhow!("clickhouse_database must not be empty"));
            }
            if !is_plain_identifier(&self.clickhouse_database) {
                return Err(anyhow!(
                    "clickhouse_database '{}' must match [A-Za-z_][A-Za-z0-9_]*",
                    self.clickhouse_database
                ));
            }
        }
        validate_detection(&self.to_detection_config())
    }

    pub fn to_runtime_config(&self) -> RuntimeConfig {
        RuntimeConfig {
            bind_addr: self.bind_addr.clone(),
            max_body_bytes: self.max_body_bytes,
            request_timeout_seconds: self.request_timeout_seconds,
            detection_interval_seconds: self.detection_interval_seconds,
            detection: self.to_detection_config(),
        }
    }

    pub fn to_detection_config(&self) -> DetectionConfig {
        DetectionConfig {
            lookback_days: self.lookback_days,
            window_limit: self.window_limit,
            velocity_window_seconds: self.velocity_window_seconds,
            min_population: self.min_population,
            contamination: self.contamination,
            n_estimators: self.n_estimators,
            max_samples: self.max_samples,
            model_seed: self.model_seed,
            model_version: self.model_version.clone(),
            account_aggregate: self.account_aggregate,
            recent_weight_decay: self.recent_weight_decay,
            skip_clears_dirty: self.skip_clears_dirty,
            max_concurrent_accounts: self.max_concurrent_accounts,
            run_lease_ttl_seconds: self.run_lease_ttl_seconds,
        }
    }

    pub fn to_db_config(&self) -> DbConfig {
        DbConfig {
            storage_backend: self.storage_backend,
            clickhouse_url: self.clickhouse_url.clone(),
            clickhouse_database: self.clickhouse_database.clone(),
            clickhouse_user: self.clickhouse_user.clone(),
            clickhouse_password: self.clickhouse_password.clone(),
        }
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(value) = env::var("LIVEFLOW_BIND_ADDR") {
            self.bind_addr = value;
        }
        if let Ok(value) = env::var("LIVEFLOW_STORAGE_BACKEND") {
            self.storage_backend = parse_storage_backend(&value).unwrap_or(self.storage_backend);
        }
        if let Ok(value) = env::var("LIVEFLOW_CLICKHOUSE_URL") {
            self.clickhouse_url = value;
        }
        if let Ok(value) = env::var("LIVEFLOW_CLICKHOUSE_DATABASE") {
            self.clickhouse_database = value;
        }
        if let Ok(value) = env::var("LIVEFLOW_CLICKHOUSE_USER") {
            self.clickhouse_user = Some(value);
        }
        if let Ok(value) = env::var("LIVEFLOW_CLICKHOUSE_PASSWORD") {
            self.clickhouse_password = Some(value);
        }
        if let Ok(value) = env::var("LIVEFLOW_MAX_BODY_BYTES") {
            self.max_body_bytes = value.parse().unwrap_or(self.max_body_bytes);
        }
        if let Ok(value) = env::var("LIVEFLOW_REQUEST_TIMEOUT_SECONDS") {
            self.request_timeout_seconds = value.parse().unwrap_or(self.request_timeout_seconds);
        }
        if let Ok(value) = env::var("LIVEFLOW_DETECTION_INTERVAL_SECONDS") {
            self.detection_interval_seconds =
                value.parse().unwrap_or(self.detection_interval_seconds);
        }
        if let Ok(value) = env::var("LIVEFLOW_LOOKBACK_DAYS") {
            self.lookback_days = value.parse().unwrap_or(self.lookback_days);
        }
        if let Ok(value) = env::var("LIVEFLOW_WINDOW_LIMIT") {
            self.window_limit = value.parse().unwrap_or(self.window_limit);
        }
        if let Ok(value) = env::var("LIVEFLOW_VELOCITY_WINDOW_SECONDS") {
            self.velocity_window_seconds = value.parse().unwrap_or(self.velocity_window_seconds);
        }
        if let Ok(value) = env::var("LIVEFLOW_MIN_POPULATION") {
            self.min_population = value.parse().unwrap_or(self.min_population);
        }
        if let Ok(value) = env::var("LIVEFLOW_CONTAMINATION") {
            self.contamination = value.parse().unwrap_or(self.contamination);
        }
        if let Ok(value) = env::var("LIVEFLOW_N_ESTIMATORS") {
            self.n_estimators = value.parse().unwrap_or(self.n_estimators);
        }
        if let Ok(value) = env::var("LIVEFLOW_MAX_SAMPLES") {
            self.max_samples = value.parse().unwrap_or(self.max_samples);
        }
        if let Ok(value) = env::var("LIVEFLOW_MODEL_SEED") {
            self.model_seed = value.parse().ok();
        }
        if let Ok(value) = env::var("LIVEFLOW_MODEL_VERSION") {
            self.model_version = value;
        }
        if let Ok(value) = env::var("LIVEFLOW_ACCOUNT_AGGREGATE") {
            self.account_aggregate =
                parse_account_aggregate(&value).unwrap_or(self.account_aggregate);
        }
        if let Ok(value) = env::var("LIVEFLOW_RECENT_WEIGHT_DECAY") {
            self.recent_weight_decay = value.parse().unwrap_or(self.recent_weight_decay);
        }
        if let Ok(value) = env::var("LIVEFLOW_SKIP_CLEARS_DIRTY") {
            self.skip_clears_dirty = value.parse().unwrap_or(self.skip_clears_dirty);
        }
        if let Ok(value) = env::var("LIVEFLOW_MAX_CONCURRENT_ACCOUNTS") {
            self.max_concurrent_accounts = value.parse().unwrap_or(self.max_concurrent_accounts);
        }
        if let Ok(value) = env::var("LIVEFLOW_RUN_LEASE_TTL_SECONDS") {
            self.run_lease_ttl_seconds = value.parse().unwrap_or(self.run_lease_ttl_seconds);
        }
    }
}

fn parse_storage_backend(value: &str) -> Option<StorageBackend> {
    match value.trim().to_lowercase().as_str() {
        "memory" => Some(StorageBackend::Memory),
        "clickhouse" => Some(StorageBackend::Clickhouse),
        _ => None,
    }
}

fn parse_account_aggregate(value: &str) -> Option<AccountAggregate> {
    match value.trim().to_lowercase().as_str() {
        "max" => Some(AccountAggregate::Max),
        "recent_weighted" => Some(AccountAggregate::RecentWeighted),
        _ => None,
    }
}
