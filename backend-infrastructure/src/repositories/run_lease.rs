use std::collections::HashMap;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::sync::Mutex;

use backend_domain::RunLease;

struct Held {
    holder: String,
    expires_at: Instant,
}

/// Lease table kept in process memory. Expired leases are taken over.
#[derive(Default)]
pub struct InMemoryRunLease {
    leases: Mutex<HashMap<String, Held>>,
}

impl InMemoryRunLease {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RunLease for InMemoryRunLease {
    async fn try_acquire(&self, name: &str, holder: &str, ttl: Duration) -> anyhow::Result<bool> {
        let mut leases = self.leases.lock().await;
        let now = Instant::now();
        if let Some(current) = leases.get(name) {
            if current.holder != holder && current.expires_at > now {
                return Ok(false);
            }
        }
        leases.insert(
            name.to_string(),
            Held {
                holder: holder.to_string(),
                expires_at: now + ttl,
            },
        );
        Ok(true)
    }

    async fn release(&self, name: &str, holder: &str) -> anyhow::Result<()> {
        let mut leases = self.leases.lock().await;
        if leases.get(name).is_some_and(|held| held.holder == holder) {
            leases.remove(name);
        }
        Ok(())
    }
}
