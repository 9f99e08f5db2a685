// Risk level value object

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::errors::DetectionError;

/// Upper bound (inclusive) of the LOW tier.
pub const LOW_RISK_CEILING: f64 = 0.33;
/// Upper bound (inclusive) of the MEDIUM tier.
pub const MEDIUM_RISK_CEILING: f64 = 0.66;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum RiskLevel {
    #[default]
    Low,
    Medium,
    High,
}

impl RiskLevel {
    /// Maps a normalized anomaly score onto the dashboard tiers.
    ///
    /// `<= 0.33` is LOW, `<= 0.66` is MEDIUM, anything above is HIGH. A NaN
    /// score never reads as safe and lands in HIGH.
    pub fn from_score(score: f64) -> Self {
        if score <= LOW_RISK_CEILING {
            RiskLevel::Low
        } else if score <= MEDIUM_RISK_CEILING {
            RiskLevel::Medium
        } else {
            RiskLevel::High
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RiskLevel::Low => "LOW",
            RiskLevel::Medium => "MEDIUM",
            RiskLevel::High => "HIGH",
        }
    }

    pub fn is_flagged(&self) -> bool {
        !matches!(self, RiskLevel::Low)
    }
}

impl fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RiskLevel {
    type Err = DetectionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "LOW" => Ok(RiskLevel::Low),
            "MEDIUM" => Ok(RiskLevel::Medium),
            "HIGH" => Ok(RiskLevel::High),
            other => Err(DetectionError::Validation(format!(
                "unknown risk level '{}'",
                other
            ))),
        }
    }
}
