use std::time::Duration;

use async_trait::async_trait;

/// Exclusive lease guarding a named job against overlapping runs.
#[async_trait]
pub trait RunLease: Send + Sync {
    /// Takes the lease for `holder` unless another holder has an unexpired one.
    async fn try_acquire(&self, name: &str, holder: &str, ttl: Duration) -> anyhow::Result<bool>;
    async fn release(&self, name: &str, holder: &str) -> anyhow::Result<()>;
}
