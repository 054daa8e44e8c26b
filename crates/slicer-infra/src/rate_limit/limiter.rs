use std::sync::Arc;

use async_trait::async_trait;

use slicer_core::domain::{ClientIdentity, Namespace, QuotaPolicy, RateDecision};
use slicer_core::ports::{Clock, CounterStore, RateLimitError, RateLimiter, SystemClock};

/// Rate limiter that counts through a [`CounterStore`] and decides with a [`QuotaPolicy`].
pub struct QuotaRateLimiter {
    store: Arc<dyn CounterStore>,
    policy: QuotaPolicy,
    clock: Arc<dyn Clock>,
}

impl QuotaRateLimiter {
    pub fn new(store: Arc<dyn CounterStore>, policy: QuotaPolicy) -> Self {
        Self::with_clock(store, policy, Arc::new(SystemClock))
    }

    pub fn with_clock(store: Arc<dyn CounterStore>, policy: QuotaPolicy, clock: Arc<dyn Clock>) -> Self {
        Self { store, policy, clock }
    }
}

#[async_trait]
impl RateLimiter for QuotaRateLimiter {
    async fn check(
        &self,
        namespace: Namespace,
        identity: &ClientIdentity,
    ) -> Result<RateDecision, RateLimitError> {
        let window = self.policy.window(namespace);
        let hit = self.store.increment(namespace, identity, window).await?;
        let decision = self.policy.evaluate(namespace, &hit, self.clock.now());

        if !decision.allowed {
            tracing::info!(
                namespace = %namespace,
                identity = %identity,
                count = hit.count,
                limit = decision.limit,
                backend = self.store.backend_name(),
                "Rate limit exceeded"
            );
        }

        Ok(decision)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::num::NonZeroU32;
    use std::time::Duration;

    use slicer_core::domain::{CounterHit, QuotaConfig};
    use slicer_core::ports::RemoteConnector;

    use crate::rate_limit::test_support::ManualClock;
    use crate::rate_limit::{BackendMode, BackendSelector, InMemoryCounterStore};

    const HOUR: Duration = Duration::from_secs(3600);

    fn policy(processing: u32, health: u32) -> QuotaPolicy {
        QuotaPolicy::new(
            QuotaConfig::new(NonZeroU32::new(processing).unwrap(), HOUR),
            QuotaConfig::new(NonZeroU32::new(health).unwrap(), HOUR),
        )
    }

    fn limiter_with_clock(policy: QuotaPolicy) -> (QuotaRateLimiter, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new());
        let store = Arc::new(InMemoryCounterStore::with_clock(clock.clone()));
        (QuotaRateLimiter::with_clock(store, policy, clock.clone()), clock)
    }

    #[tokio::test]
    async fn test_limit_then_reject() {
        let (limiter, _clock) = limiter_with_clock(policy(10, 60));
        let identity = ClientIdentity::from("1.2.3.4");

        for n in 1..=10u32 {
            let decision = limiter.check(Namespace::Processing, &identity).await.unwrap();
            assert!(decision.allowed, "request {} should be allowed", n);
            assert_eq!(decision.remaining, 10 - n);
            assert_eq!(decision.limit, 10);
        }

        let denied = limiter.check(Namespace::Processing, &identity).await.unwrap();
        assert!(!denied.allowed);
        assert_eq!(denied.remaining, 0);
        assert!(denied.retry_after_secs.unwrap() >= 1);
    }

    #[tokio::test]
    async fn test_other_identity_unaffected_by_exhausted_one() {
        let (limiter, _clock) = limiter_with_clock(policy(10, 60));
        let exhausted = ClientIdentity::from("1.2.3.4");

        for _ in 0..11 {
            limiter.check(Namespace::Processing, &exhausted).await.unwrap();
        }

        let fresh = ClientIdentity::from("5.6.7.8");
        let decision = limiter.check(Namespace::Processing, &fresh).await.unwrap();
        assert!(decision.allowed);
        assert_eq!(decision.remaining, 9);
    }

    #[tokio::test]
    async fn test_quota_restored_after_reset() {
        let (limiter, clock) = limiter_with_clock(policy(3, 60));
        let identity = ClientIdentity::from("1.2.3.4");

        for _ in 0..4 {
            limiter.check(Namespace::Processing, &identity).await.unwrap();
        }
        let denied = limiter.check(Namespace::Processing, &identity).await.unwrap();
        assert!(!denied.allowed);
        assert_eq!(denied.retry_after_secs, Some(3600));

        clock.advance(HOUR);

        for n in 1..=3u32 {
            let decision = limiter.check(Namespace::Processing, &identity).await.unwrap();
            assert!(decision.allowed);
            assert_eq!(decision.remaining, 3 - n);
        }
    }

    #[tokio::test]
    async fn test_namespaces_do_not_interfere() {
        let (limiter, _clock) = limiter_with_clock(policy(2, 3));
        let identity = ClientIdentity::from("1.2.3.4");

        // Interleave traffic across both namespaces
        let mut processing = Vec::new();
        let mut health = Vec::new();
        for _ in 0..4 {
            processing.push(limiter.check(Namespace::Processing, &identity).await.unwrap().allowed);
            health.push(limiter.check(Namespace::Health, &identity).await.unwrap().allowed);
        }

        assert_eq!(processing, vec![true, true, false, false]);
        assert_eq!(health, vec![true, true, true, false]);
    }

    struct AlwaysFailingStore;

    #[async_trait]
    impl CounterStore for AlwaysFailingStore {
        async fn increment(
            &self,
            _namespace: Namespace,
            _identity: &ClientIdentity,
            _window: Duration,
        ) -> Result<CounterHit, RateLimitError> {
            Err(RateLimitError::Connection("connection reset by peer".to_string()))
        }

        fn backend_name(&self) -> &'static str {
            "broken"
        }
    }

    struct BrokenRemote;

    #[async_trait]
    impl RemoteConnector for BrokenRemote {
        async fn connect(&self) -> Result<Arc<dyn CounterStore>, RateLimitError> {
            Ok(Arc::new(AlwaysFailingStore))
        }

        fn describe(&self) -> String {
            "broken://remote".to_string()
        }
    }

    #[tokio::test]
    async fn test_failing_remote_still_enforces_limit() {
        let selector = Arc::new(BackendSelector::new(
            Arc::new(InMemoryCounterStore::new()),
            Some(Arc::new(BrokenRemote)),
            Duration::from_millis(100),
        ));
        let limiter = QuotaRateLimiter::new(selector.clone(), policy(10, 60));
        let identity = ClientIdentity::from("1.2.3.4");

        let mut allowed = 0;
        let mut denied = 0;
        for _ in 0..15 {
            if limiter.check(Namespace::Processing, &identity).await.unwrap().allowed {
                allowed += 1;
            } else {
                denied += 1;
            }
        }

        assert_eq!(allowed, 10);
        assert_eq!(denied, 5);
        assert_eq!(selector.mode(), Some(BackendMode::Local));
    }
}
