use tracing::error;

use backend_domain::{AnomalyQuery, AnomalyRecord};

use crate::{AppError, AppState};

pub const DEFAULT_ANOMALY_LIMIT: usize = 100;
pub const MAX_ANOMALY_LIMIT: usize = 500;

pub async fn list_anomalies(
    state: &AppState,
    mut query: AnomalyQuery,
) -> Result<Vec<AnomalyRecord>, AppError> {
    query.limit = Some(
        query
            .limit
            .unwrap_or(DEFAULT_ANOMALY_LIMIT)
            .clamp(1, MAX_ANOMALY_LIMIT),
    );
    let rows = state.store.list_anomalies(&query).await.map_err(|err| {
        error!("failed to fetch anomalies: {}", err);
        AppError::from(err)
    })?;
    Ok(rows)
}
