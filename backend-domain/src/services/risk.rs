// Account-level risk aggregation

use crate::entities::AccountAggregate;
use crate::value_objects::RiskLevel;

/// Folds a window's transaction scores (oldest first) into one account score.
///
/// `Max` takes the worst transaction. `RecentWeighted` averages with weights
/// `decay^age`, where the newest transaction has age 0.
pub fn aggregate_account_score(scores: &[f64], aggregate: AccountAggregate, decay: f64) -> f64 {
    if scores.is_empty() {
        return 0.0;
    }
    let value = match aggregate {
        AccountAggregate::Max => scores.iter().copied().fold(0.0, f64::max),
        AccountAggregate::RecentWeighted => {
            let decay = decay.clamp(f64::EPSILON, 1.0);
            let (weighted, total) = scores.iter().rev().enumerate().fold(
                (0.0, 0.0),
                |(weighted, total), (age, score)| {
                    let weight = decay.powi(age as i32);
                    (weighted + weight * score, total + weight)
                },
            );
            weighted / total
        }
    };
    value.clamp(0.0, 1.0)
}

pub fn account_risk(scores: &[f64], aggregate: AccountAggregate, decay: f64) -> (f64, RiskLevel) {
    let score = aggregate_account_score(scores, aggregate, decay);
    (score, RiskLevel::from_score(score))
}
