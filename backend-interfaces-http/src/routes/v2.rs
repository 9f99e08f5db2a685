use axum::routing::{get, post};
use axum::Router;

use backend_application::AppState;

use crate::handlers::{detect_handlers, ledger_handlers, ops_handlers};

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/v2/ledger/accounts", post(ledger_handlers::open_account))
        .route(
            "/v2/ledger/accounts/:account_id",
            get(ledger_handlers::get_account),
        )
        .route(
            "/v2/ledger/accounts/:account_id/transactions",
            post(ledger_handlers::record_transaction),
        )
        .route("/v2/detect/run", post(detect_handlers::run))
        .route("/v2/detect/anomalies", get(detect_handlers::list_anomalies))
        .route("/v2/detect/runs/last", get(detect_handlers::last_run))
        .route("/v2/ops/health/live", get(ops_handlers::health_live))
        .route("/v2/ops/health/ready", get(ops_handlers::health_ready))
        .route(
            "/v2/ops/metrics/prometheus",
            get(ops_handlers::metrics_prometheus),
        )
        .with_state(state)
}
