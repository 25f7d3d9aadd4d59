use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::Mutex;

/// Windowed counter storage, keyed by (class, actor, ip). The in-memory
/// implementation is sufficient for a single node; a shared external store
/// can replace it behind this trait without touching gate logic.
#[async_trait]
pub trait CounterStore: Send + Sync {
    /// Drop timestamps that fell out of the window and return how many remain.
    async fn prune_and_count(&self, key: &str, window: Duration, now: DateTime<Utc>) -> usize;

    /// Record one hit at `now`.
    async fn record(&self, key: &str, now: DateTime<Utc>);
}

#[derive(Default)]
pub struct InMemoryCounterStore {
    windows: Mutex<HashMap<String, Vec<DateTime<Utc>>>>,
}

impl InMemoryCounterStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CounterStore for InMemoryCounterStore {
    async fn prune_and_count(&self, key: &str, window: Duration, now: DateTime<Utc>) -> usize {
        let window = chrono::Duration::from_std(window).unwrap_or(chrono::Duration::zero());
        let cutoff = now - window;

        let mut windows = self.windows.lock().await;
        match windows.get_mut(key) {
            Some(hits) => {
                hits.retain(|t| *t > cutoff);
                if hits.is_empty() {
                    windows.remove(key);
                    0
                } else {
                    hits.len()
                }
            }
            None => 0,
        }
    }

    async fn record(&self, key: &str, now: DateTime<Utc>) {
        let mut windows = self.windows.lock().await;
        windows.entry(key.to_string()).or_default().push(now);
    }
}
