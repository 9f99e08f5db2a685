use std::sync::Arc;

use backend_domain::ports::{LedgerStore, RunLease};
use backend_domain::{RunSummary, RuntimeConfig};
use tokio::sync::{Mutex, RwLock};

use crate::Metrics;

#[derive(Clone)]
pub struct AppState {
    pub config: RuntimeConfig,
    pub store: Arc<dyn LedgerStore>,
    pub run_lease: Arc<dyn RunLease>,
    pub metrics: Arc<Metrics>,
    pub last_run: Arc<RwLock<Option<RunSummary>>>,
    /// Serializes balance updates on the write path.
    pub ledger_lock: Arc<Mutex<()>>,
}

impl AppState {
    pub fn new(
        config: RuntimeConfig,
        store: Arc<dyn LedgerStore>,
        run_lease: Arc<dyn RunLease>,
    ) -> Self {
        Self {
            config,
            store,
            run_lease,
            metrics: Arc::new(Metrics::default()),
            last_run: Arc::new(RwLock::new(None)),
            ledger_lock: Arc::new(Mutex::new(())),
        }
    }
}
