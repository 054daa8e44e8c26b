//! In-memory window counter store.
//!
//! This is the fallback when Redis is not configured or has failed.
//! Note: Counts are per-process, not shared across instances.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use tokio::task::JoinHandle;

use slicer_core::domain::{ClientIdentity, CounterHit, Namespace};
use slicer_core::ports::{Clock, CounterStore, RateLimitError, SystemClock};

use super::window_end;

struct WindowEntry {
    count: u64,
    reset_at: DateTime<Utc>,
}

/// Fixed-window counters keyed by `(namespace, identity)`.
///
/// Each increment runs under the map's per-key entry lock, so concurrent
/// requests from the same identity never lose updates.
pub struct InMemoryCounterStore {
    counters: DashMap<(Namespace, String), WindowEntry>,
    clock: Arc<dyn Clock>,
}

impl InMemoryCounterStore {
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            counters: DashMap::new(),
            clock,
        }
    }

    /// Synchronous increment. Never suspends.
    pub fn hit(&self, namespace: Namespace, identity: &ClientIdentity, window: Duration) -> CounterHit {
        let now = self.clock.now();

        // A fresh entry starts already expired so the branch below opens its window.
        let mut entry = self
            .counters
            .entry((namespace, identity.as_str().to_string()))
            .or_insert_with(|| WindowEntry {
                count: 0,
                reset_at: now,
            });

        let first_in_window = now >= entry.reset_at;
        if first_in_window {
            *entry = WindowEntry {
                count: 1,
                reset_at: window_end(now, window),
            };
        } else {
            entry.count += 1;
        }

        CounterHit {
            count: entry.count,
            reset_at: entry.reset_at,
            first_in_window,
        }
    }

    /// Drop entries whose window has ended. Returns how many were removed.
    pub fn purge_expired(&self) -> usize {
        let now = self.clock.now();
        let before = self.counters.len();
        self.counters.retain(|_, entry| entry.reset_at > now);
        before.saturating_sub(self.counters.len())
    }

    pub fn len(&self) -> usize {
        self.counters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.counters.is_empty()
    }
}

impl Default for InMemoryCounterStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CounterStore for InMemoryCounterStore {
    async fn increment(
        &self,
        namespace: Namespace,
        identity: &ClientIdentity,
        window: Duration,
    ) -> Result<CounterHit, RateLimitError> {
        Ok(self.hit(namespace, identity, window))
    }

    fn backend_name(&self) -> &'static str {
        "memory"
    }
}

/// Spawn a background task that periodically drops expired counters.
pub fn spawn_sweeper(store: Arc<InMemoryCounterStore>, every: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        // The first tick completes immediately
        ticker.tick().await;

        loop {
            ticker.tick().await;
            let removed = store.purge_expired();
            if removed > 0 {
                tracing::debug!(removed, remaining = store.len(), "Swept expired rate limit counters");
            }
        }
    })
}
