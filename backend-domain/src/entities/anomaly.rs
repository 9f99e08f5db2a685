// Anomaly entity
// Append-only audit record written for every flagged transaction of a pass

use serde::{Deserialize, Serialize};

use crate::entities::FeatureVector;
use crate::value_objects::RiskLevel;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnomalyRecord {
    pub anomaly_id: String,
    pub transaction_id: String,
    pub account_id: String,
    pub risk_score: f64,
    pub risk_level: RiskLevel,
    pub detected_at: i64,
    pub model_version: String,
    pub features: FeatureVector,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct AnomalyQuery {
    pub account_id: Option<String>,
    pub transaction_id: Option<String>,
    pub limit: Option<usize>,
}
