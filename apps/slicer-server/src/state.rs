//! Application state - shared across all handlers.

use std::sync::Arc;

use slicer_core::domain::Namespace;
use slicer_core::ports::{ImageSlicer, RateLimiter, RemoteConnector, SliceError};
use slicer_infra::{BackendSelector, HttpImageSlicer, InMemoryCounterStore, QuotaRateLimiter};

#[cfg(feature = "redis")]
use slicer_infra::RedisConnector;

use crate::config::AppConfig;
use crate::middleware::{ApiKey, GateSettings};

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub limiter: Arc<dyn RateLimiter>,
    pub slicer: Arc<dyn ImageSlicer>,
    /// Local counters, also swept in the background.
    pub counters: Arc<InMemoryCounterStore>,
    pub api_key: Option<ApiKey>,
    pub gate: GateSettings,
}

impl AppState {
    /// Build the application state from configuration.
    pub fn new(config: &AppConfig) -> Result<Self, SliceError> {
        let counters = Arc::new(InMemoryCounterStore::new());
        let (connector, remote_timeout) = remote_connector(config);

        let selector = match connector {
            Some(connector) => {
                tracing::info!(
                    remote = %connector.describe(),
                    "Remote rate limit store configured, connecting on first request"
                );
                BackendSelector::new(counters.clone(), Some(connector), remote_timeout)
            }
            None => {
                tracing::info!("No remote rate limit store configured, using in-memory counters");
                BackendSelector::local_only(counters.clone())
            }
        };

        let limiter = Arc::new(QuotaRateLimiter::new(
            Arc::new(selector),
            config.rate_limit.policy.clone(),
        ));
        let slicer = Arc::new(HttpImageSlicer::new(config.slicer.clone())?);

        if config.api_key.is_none() {
            tracing::warn!("API_KEY not set, /api/v1/process will answer 503");
        }

        tracing::info!(
            processing_limit = config.rate_limit.policy.limit(Namespace::Processing),
            health_limit = config.rate_limit.policy.limit(Namespace::Health),
            fail_open = config.rate_limit.fail_open,
            "Application state initialized"
        );

        Ok(Self {
            limiter,
            slicer,
            counters,
            api_key: config.api_key.clone().map(ApiKey::new),
            gate: GateSettings::new(config.rate_limit.fail_open),
        })
    }

    /// Assemble state from already-built parts.
    #[cfg(test)]
    pub fn from_parts(
        limiter: Arc<dyn RateLimiter>,
        slicer: Arc<dyn ImageSlicer>,
        counters: Arc<InMemoryCounterStore>,
        api_key: Option<ApiKey>,
        gate: GateSettings,
    ) -> Self {
        Self {
            limiter,
            slicer,
            counters,
            api_key,
            gate,
        }
    }
}

#[cfg(feature = "redis")]
fn remote_connector(config: &AppConfig) -> (Option<Arc<dyn RemoteConnector>>, std::time::Duration) {
    match &config.redis {
        Some(redis) => {
            let connector = RedisConnector::new(redis.clone());
            let timeout = connector.command_timeout();
            (Some(Arc::new(connector)), timeout)
        }
        None => (None, std::time::Duration::ZERO),
    }
}

#[cfg(not(feature = "redis"))]
fn remote_connector(_config: &AppConfig) -> (Option<Arc<dyn RemoteConnector>>, std::time::Duration) {
    (None, std::time::Duration::ZERO)
}
