// Feature vector used to fit and score the outlier model

use serde::{Deserialize, Serialize};

pub const FEATURE_COUNT: usize = 5;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FeatureVector {
    pub amount: f64,
    pub hour_of_day: u32,
    pub day_of_week: u32,
    pub balance_before: f64,
    pub transaction_velocity: u32,
}

impl FeatureVector {
    /// Column order used by the model.
    pub fn to_array(&self) -> [f64; FEATURE_COUNT] {
        [
            self.amount,
            f64::from(self.hour_of_day),
            f64::from(self.day_of_week),
            self.balance_before,
            f64::from(self.transaction_velocity),
        ]
    }
}
