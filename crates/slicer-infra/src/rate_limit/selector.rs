//! Backend selection between the remote and in-memory counter stores.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::OnceCell;

use slicer_core::domain::{ClientIdentity, CounterHit, Namespace};
use slicer_core::ports::{CounterStore, RateLimitError, RemoteConnector};

use super::InMemoryCounterStore;

/// Which counter store is serving requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendMode {
    Remote,
    Local,
}

/// Counter store that routes to the remote store while it works and to the
/// in-memory store otherwise.
///
/// The choice is made lazily on the first increment: connect and PING the
/// remote store if one is configured, else go local. A failed remote call
/// downgrades to local for the rest of the process lifetime; there is no
/// path back to remote short of a restart. The failed increment is retried
/// locally so the caller always gets a count.
pub struct BackendSelector {
    local: Arc<InMemoryCounterStore>,
    connector: Option<Arc<dyn RemoteConnector>>,
    remote: OnceCell<Option<Arc<dyn CounterStore>>>,
    degraded: AtomicBool,
    remote_timeout: Duration,
}

impl BackendSelector {
    pub fn new(
        local: Arc<InMemoryCounterStore>,
        connector: Option<Arc<dyn RemoteConnector>>,
        remote_timeout: Duration,
    ) -> Self {
        Self {
            local,
            connector,
            remote: OnceCell::new(),
            degraded: AtomicBool::new(false),
            remote_timeout,
        }
    }

    /// Selector with no remote store configured.
    pub fn local_only(local: Arc<InMemoryCounterStore>) -> Self {
        Self::new(local, None, Duration::ZERO)
    }

    /// Current mode, or `None` before the first request has been handled.
    pub fn mode(&self) -> Option<BackendMode> {
        match self.remote.get() {
            None => None,
            Some(Some(_)) if !self.degraded.load(Ordering::Acquire) => Some(BackendMode::Remote),
            Some(_) => Some(BackendMode::Local),
        }
    }

    pub fn local(&self) -> &Arc<InMemoryCounterStore> {
        &self.local
    }

    async fn select(&self) -> Option<&Arc<dyn CounterStore>> {
        self.remote
            .get_or_init(|| async {
                let Some(connector) = &self.connector else {
                    tracing::info!("No remote counter store configured, rate limiting in memory");
                    return None;
                };

                match connector.connect().await {
                    Ok(store) => {
                        tracing::info!(
                            target_store = %connector.describe(),
                            backend = store.backend_name(),
                            "Rate limiting with remote counter store"
                        );
                        Some(store)
                    }
                    Err(e) => {
                        tracing::warn!(
                            target_store = %connector.describe(),
                            error = %e,
                            "Remote counter store unreachable, rate limiting in memory"
                        );
                        None
                    }
                }
            })
            .await
            .as_ref()
    }

    fn downgrade(&self, error: &RateLimitError) {
        if !self.degraded.swap(true, Ordering::AcqRel) {
            tracing::warn!(
                error = %error,
                "Remote counter store failed, switching to in-memory counters until restart"
            );
        }
    }

    async fn increment_remote(
        &self,
        remote: &Arc<dyn CounterStore>,
        namespace: Namespace,
        identity: &ClientIdentity,
        window: Duration,
    ) -> Result<CounterHit, RateLimitError> {
        tokio::time::timeout(self.remote_timeout, remote.increment(namespace, identity, window))
            .await
            .map_err(|_| RateLimitError::Timeout(self.remote_timeout))?
    }
}

#[async_trait]
impl CounterStore for BackendSelector {
    async fn increment(
        &self,
        namespace: Namespace,
        identity: &ClientIdentity,
        window: Duration,
    ) -> Result<CounterHit, RateLimitError> {
        if let Some(remote) = self.select().await {
            if !self.degraded.load(Ordering::Acquire) {
                match self.increment_remote(remote, namespace, identity, window).await {
                    Ok(hit) => return Ok(hit),
                    Err(e) => self.downgrade(&e),
                }
            }
        }

        self.local.increment(namespace, identity, window).await
    }

    fn backend_name(&self) -> &'static str {
        match (self.mode(), self.remote.get()) {
            (Some(BackendMode::Remote), Some(Some(remote))) => remote.backend_name(),
            _ => self.local.backend_name(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    const HOUR: Duration = Duration::from_secs(3600);

    /// Remote store that fails every call after `healthy_calls` successes.
    struct FlakyStore {
        inner: InMemoryCounterStore,
        healthy_calls: usize,
        calls: AtomicUsize,
    }

    impl FlakyStore {
        fn failing() -> Self {
            Self::healthy_for(0)
        }

        fn healthy_for(healthy_calls: usize) -> Self {
            Self {
                inner: InMemoryCounterStore::new(),
                healthy_calls,
                calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl CounterStore for FlakyStore {
        async fn increment(
            &self,
            namespace: Namespace,
            identity: &ClientIdentity,
            window: Duration,
        ) -> Result<CounterHit, RateLimitError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if call >= self.healthy_calls {
                return Err(RateLimitError::Connection("connection refused".to_string()));
            }
            self.inner.increment(namespace, identity, window).await
        }

        fn backend_name(&self) -> &'static str {
            "flaky"
        }
    }

    /// Remote store whose calls never complete.
    struct HangingStore;

    #[async_trait]
    impl CounterStore for HangingStore {
        async fn increment(
            &self,
            _namespace: Namespace,
            _identity: &ClientIdentity,
            _window: Duration,
        ) -> Result<CounterHit, RateLimitError> {
            std::future::pending().await
        }

        fn backend_name(&self) -> &'static str {
            "hanging"
        }
    }

    struct FakeConnector {
        store: Option<Arc<dyn CounterStore>>,
        connects: AtomicUsize,
    }

    impl FakeConnector {
        fn returning(store: Arc<dyn CounterStore>) -> Arc<Self> {
            Arc::new(Self {
                store: Some(store),
                connects: AtomicUsize::new(0),
            })
        }

        fn unreachable() -> Arc<Self> {
            Arc::new(Self {
                store: None,
                connects: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait]
    impl RemoteConnector for FakeConnector {
        async fn connect(&self) -> Result<Arc<dyn CounterStore>, RateLimitError> {
            self.connects.fetch_add(1, Ordering::SeqCst);
            self.store
                .clone()
                .ok_or_else(|| RateLimitError::Connection("connection refused".to_string()))
        }

        fn describe(&self) -> String {
            "fake://remote".to_string()
        }
    }

    fn selector(connector: Arc<FakeConnector>) -> BackendSelector {
        BackendSelector::new(
            Arc::new(InMemoryCounterStore::new()),
            Some(connector),
            Duration::from_millis(50),
        )
    }

    #[tokio::test]
    async fn test_no_connector_selects_local_lazily() {
        let selector = BackendSelector::local_only(Arc::new(InMemoryCounterStore::new()));
        assert_eq!(selector.mode(), None);

        let identity = ClientIdentity::from("1.2.3.4");
        let hit = selector.increment(Namespace::Processing, &identity, HOUR).await.unwrap();

        assert_eq!(hit.count, 1);
        assert_eq!(selector.mode(), Some(BackendMode::Local));
        assert_eq!(selector.backend_name(), "memory");
    }

    #[tokio::test]
    async fn test_healthy_remote_serves_requests() {
        let remote = Arc::new(FlakyStore::healthy_for(usize::MAX));
        let connector = FakeConnector::returning(remote.clone());
        let selector = selector(connector.clone());
        let identity = ClientIdentity::from("1.2.3.4");

        for expected in 1..=3 {
            let hit = selector.increment(Namespace::Processing, &identity, HOUR).await.unwrap();
            assert_eq!(hit.count, expected);
        }

        assert_eq!(selector.mode(), Some(BackendMode::Remote));
        assert_eq!(selector.backend_name(), "flaky");
        assert_eq!(remote.calls.load(Ordering::SeqCst), 3);
        assert!(selector.local().is_empty());
        assert_eq!(connector.connects.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_failed_ping_selects_local() {
        let connector = FakeConnector::unreachable();
        let selector = selector(connector.clone());
        let identity = ClientIdentity::from("1.2.3.4");

        selector.increment(Namespace::Processing, &identity, HOUR).await.unwrap();
        selector.increment(Namespace::Processing, &identity, HOUR).await.unwrap();

        assert_eq!(selector.mode(), Some(BackendMode::Local));
        // Selection is cached, the PING is not repeated
        assert_eq!(connector.connects.load(Ordering::SeqCst), 1);
        assert_eq!(selector.local().len(), 1);
    }

    #[tokio::test]
    async fn test_remote_error_downgrades_and_retries_locally() {
        let remote = Arc::new(FlakyStore::failing());
        let selector = selector(FakeConnector::returning(remote.clone()));
        let identity = ClientIdentity::from("1.2.3.4");

        let hit = selector.increment(Namespace::Processing, &identity, HOUR).await.unwrap();
        assert_eq!(hit.count, 1);
        assert_eq!(selector.mode(), Some(BackendMode::Local));

        // Later calls never touch the remote store again
        for expected in 2..=5 {
            let hit = selector.increment(Namespace::Processing, &identity, HOUR).await.unwrap();
            assert_eq!(hit.count, expected);
        }
        assert_eq!(remote.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_downgrade_is_one_directional() {
        let remote = Arc::new(FlakyStore::healthy_for(2));
        let selector = selector(FakeConnector::returning(remote.clone()));
        let identity = ClientIdentity::from("1.2.3.4");

        for _ in 0..2 {
            selector.increment(Namespace::Processing, &identity, HOUR).await.unwrap();
        }
        assert_eq!(selector.mode(), Some(BackendMode::Remote));

        // Third call fails remotely and is answered by a fresh local window
        let hit = selector.increment(Namespace::Processing, &identity, HOUR).await.unwrap();
        assert_eq!(hit.count, 1);
        assert_eq!(selector.mode(), Some(BackendMode::Local));

        selector.increment(Namespace::Processing, &identity, HOUR).await.unwrap();
        assert_eq!(remote.calls.load(Ordering::SeqCst), 3);
        assert_eq!(selector.mode(), Some(BackendMode::Local));
    }

    #[tokio::test]
    async fn test_remote_timeout_counts_as_failure() {
        let selector = selector(FakeConnector::returning(Arc::new(HangingStore)));
        let identity = ClientIdentity::from("1.2.3.4");

        let hit = selector.increment(Namespace::Health, &identity, HOUR).await.unwrap();
        assert_eq!(hit.count, 1);
        assert_eq!(selector.mode(), Some(BackendMode::Local));
    }

    #[tokio::test]
    async fn test_concurrent_first_requests_connect_once() {
        let connector = FakeConnector::returning(Arc::new(FlakyStore::healthy_for(usize::MAX)));
        let selector = Arc::new(selector(connector.clone()));

        let tasks: Vec<_> = (0..16)
            .map(|i| {
                let selector = selector.clone();
                tokio::spawn(async move {
                    let identity = ClientIdentity::from(format!("10.0.0.{}", i).as_str());
                    selector.increment(Namespace::Processing, &identity, HOUR).await
                })
            })
            .collect();

        for result in futures::future::join_all(tasks).await {
            assert!(result.unwrap().is_ok());
        }

        assert_eq!(connector.connects.load(Ordering::SeqCst), 1);
        assert_eq!(selector.mode(), Some(BackendMode::Remote));
    }
}
