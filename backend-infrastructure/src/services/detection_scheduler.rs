use std::time::Duration;

use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info, warn};

use backend_application::detect::run_detection;
use backend_application::{AppState, RunError};
use backend_domain::DetectionEvent;

/// Fires a stale-account run every `detection_interval_seconds`.
/// An interval of zero disables the schedule.
pub async fn schedule_detection(state: AppState) {
    let seconds = state.config.detection_interval_seconds;
    if seconds == 0 {
        info!("scheduled detection disabled");
        return;
    }

    let mut ticker = interval(Duration::from_secs(seconds));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    // first tick completes immediately
    ticker.tick().await;

    loop {
        ticker.tick().await;
        match run_detection(&state, DetectionEvent::default()).await {
            Ok(summary) => debug!(
                run_id = %summary.run_id,
                processed = summary.accounts_processed,
                "scheduled detection finished"
            ),
            Err(RunError::AlreadyRunning) => {
                debug!("scheduled detection skipped, another run holds the lease")
            }
            Err(err) => warn!("scheduled detection failed: {}", err),
        }
    }
}
