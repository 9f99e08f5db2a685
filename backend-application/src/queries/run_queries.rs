use backend_domain::RunSummary;

use crate::AppState;

pub async fn last_run(state: &AppState) -> Option<RunSummary> {
    state.last_run.read().await.clone()
}
