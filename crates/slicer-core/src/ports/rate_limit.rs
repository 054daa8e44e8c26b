//! Rate limiting ports.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::domain::{ClientIdentity, CounterHit, Namespace, RateDecision};

/// Window counter store - "increment a counter for a key, with expiry".
///
/// Implementations must not lose increments under concurrent callers.
#[async_trait]
pub trait CounterStore: Send + Sync {
    /// Increment the counter for `(namespace, identity)`, opening a new window of
    /// length `window` if none is active.
    async fn increment(
        &self,
        namespace: Namespace,
        identity: &ClientIdentity,
        window: Duration,
    ) -> Result<CounterHit, RateLimitError>;

    /// Short name used in logs.
    fn backend_name(&self) -> &'static str;
}

/// Rate limiter trait - counts a request and decides whether it may proceed.
#[async_trait]
pub trait RateLimiter: Send + Sync {
    async fn check(
        &self,
        namespace: Namespace,
        identity: &ClientIdentity,
    ) -> Result<RateDecision, RateLimitError>;
}

/// Opens a connection to a remote counter store.
#[async_trait]
pub trait RemoteConnector: Send + Sync {
    /// Connect and verify liveness. Errors mean the remote store must not be used.
    async fn connect(&self) -> Result<Arc<dyn CounterStore>, RateLimitError>;

    /// Target description for logs. Must not include credentials.
    fn describe(&self) -> String;
}

/// Rate limit errors.
#[derive(Debug, thiserror::Error)]
pub enum RateLimitError {
    #[error("Connection failed: {0}")]
    Connection(String),

    #[error("Backend error: {0}")]
    Backend(String),

    #[error("Backend call timed out after {0:?}")]
    Timeout(Duration),
}
