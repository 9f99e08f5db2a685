use axum::body::Bytes;
use axum::extract::{Query, State};
use axum::Json;
use serde_json::Value;

use backend_application::detect::{parse_detection_event, run_detection};
use backend_application::queries::{anomaly_queries, run_queries};
use backend_application::AppState;
use backend_domain::{AnomalyQuery, AnomalyRecord, RunSummary};

use crate::error::HttpError;

/// Direct invocation. Accepts a bare event, a scheduler envelope or an empty body.
pub async fn run(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<Json<RunSummary>, HttpError> {
    let payload = if body.iter().all(u8::is_ascii_whitespace) {
        Value::Null
    } else {
        serde_json::from_slice(&body)
            .map_err(|err| HttpError::BadRequest(format!("invalid event json: {}", err)))?
    };
    let event = parse_detection_event(payload)?;
    let summary = run_detection(&state, event).await?;
    Ok(Json(summary))
}

pub async fn list_anomalies(
    State(state): State<AppState>,
    Query(query): Query<AnomalyQuery>,
) -> Result<Json<Vec<AnomalyRecord>>, HttpError> {
    let rows = anomaly_queries::list_anomalies(&state, query).await?;
    Ok(Json(rows))
}

pub async fn last_run(State(state): State<AppState>) -> Json<Option<RunSummary>> {
    Json(run_queries::last_run(&state).await)
}
