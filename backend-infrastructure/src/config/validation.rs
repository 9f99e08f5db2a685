use anyhow::{anyhow, Result};

use backend_domain::DetectionConfig;

pub fn validate_detection(config: &DetectionConfig) -> Result<()> {
    if config.lookback_days == 0 {
        return Err(anyhow!("lookback_days must be greater than 0"));
    }
    if config.velocity_window_seconds == 0 {
        return Err(anyhow!("velocity_window_seconds must be greater than 0"));
    }
    if config.min_population < 2 {
        return Err(anyhow!("min_population must be at least 2"));
    }
    if config.window_limit < config.min_population {
        return Err(anyhow!(
            "window_limit ({}) must not be below min_population ({})",
            config.window_limit,
            config.min_population
        ));
    }
    if !(config.contamination > 0.0 && config.contamination <= 0.5) {
        return Err(anyhow!("contamination must be in (0, 0.5]"));
    }
    if config.n_estimators == 0 {
        return Err(anyhow!("n_estimators must be greater than 0"));
    }
    if config.max_samples < 2 {
        return Err(anyhow!("max_samples must be at least 2"));
    }
    if !(config.recent_weight_decay > 0.0 && config.recent_weight_decay <= 1.0) {
        return Err(anyhow!("recent_weight_decay must be in (0, 1]"));
    }
    if config.max_concurrent_accounts == 0 {
        return Err(anyhow!("max_concurrent_accounts must be greater than 0"));
    }
    if config.run_lease_ttl_seconds == 0 {
        return Err(anyhow!("run_lease_ttl_seconds must be greater than 0"));
    }
    if config.model_version.is_empty() {
        return Err(anyhow!("model_version must not be empty"));
    }
    Ok(())
}

/// `[A-Za-z_][A-Za-z0-9_]*`, the identifier form safe to splice into DDL.
pub fn is_plain_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) if first.is_ascii_alphabetic() || first == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}
