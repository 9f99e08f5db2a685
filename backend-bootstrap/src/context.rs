use std::sync::Arc;

use anyhow::Result;
use tracing::info;

use backend_application::AppState;
use backend_domain::{DbConfig, LedgerStore, StorageBackend};
use backend_infrastructure::{
    AppConfig, ClickhouseLedgerStore, InMemoryLedgerStore, InMemoryRunLease,
};

pub struct AppContext {
    pub state: AppState,
}

impl AppContext {
    pub async fn new() -> Result<Self> {
        let config = AppConfig::load().await?;
        Self::from_config(&config).await
    }

    pub async fn from_config(config: &AppConfig) -> Result<Self> {
        let store = build_store(&config.to_db_config());
        store.ensure_schema().await?;

        let state = AppState::new(
            config.to_runtime_config(),
            store,
            Arc::new(InMemoryRunLease::new()),
        );
        Ok(Self { state })
    }
}

fn build_store(db_config: &DbConfig) -> Arc<dyn LedgerStore> {
    match db_config.storage_backend {
        StorageBackend::Memory => {
            info!("using in-memory ledger store");
            Arc::new(InMemoryLedgerStore::new())
        }
        StorageBackend::Clickhouse => {
            info!(
                "using clickhouse ledger store at {} ({})",
                db_config.clickhouse_url, db_config.clickhouse_database
            );
            Arc::new(ClickhouseLedgerStore::new(db_config))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn memory_backend_builds_a_ready_state() {
        let context = AppContext::from_config(&AppConfig::default())
            .await
            .expect("context");
        context.state.store.ping().await.expect("ping");
        assert!(context.state.last_run.read().await.is_none());
    }
}
