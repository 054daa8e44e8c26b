//! Application configuration loaded from environment variables.

use std::env;
use std::time::Duration;

use slicer_core::domain::{Namespace, QuotaConfig, QuotaPolicy, parse_limit, parse_window_secs};
use slicer_infra::ImageSlicerConfig;

#[cfg(feature = "redis")]
use slicer_infra::RedisRateLimitConfig;

/// Application configuration.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    /// Shared secret for the API-facing processing route.
    pub api_key: Option<String>,
    pub rate_limit: RateLimitSettings,
    pub slicer: ImageSlicerConfig,
    /// Remote counter store; `None` keeps every counter in process memory.
    #[cfg(feature = "redis")]
    pub redis: Option<RedisRateLimitConfig>,
}

/// Rate limiter settings.
#[derive(Debug, Clone)]
pub struct RateLimitSettings {
    pub policy: QuotaPolicy,
    /// Let requests through when the gate itself fails.
    pub fail_open: bool,
    /// How often expired in-memory counters are dropped.
    pub sweep_interval: Duration,
}

impl Default for RateLimitSettings {
    fn default() -> Self {
        Self {
            policy: QuotaPolicy::default(),
            fail_open: true,
            sweep_interval: Duration::from_secs(300),
        }
    }
}

impl RateLimitSettings {
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let processing = quota_from_values(
            Namespace::Processing,
            env::var("RATE_LIMIT_PROCESS_MAX").ok().as_deref(),
            env::var("RATE_LIMIT_PROCESS_WINDOW_SECS").ok().as_deref(),
        );
        let health = quota_from_values(
            Namespace::Health,
            env::var("RATE_LIMIT_HEALTH_MAX").ok().as_deref(),
            env::var("RATE_LIMIT_HEALTH_WINDOW_SECS").ok().as_deref(),
        );

        Self {
            policy: QuotaPolicy::new(processing, health),
            fail_open: env::var("RATE_LIMIT_FAIL_OPEN")
                .map(|v| parse_flag(&v))
                .unwrap_or(defaults.fail_open),
            sweep_interval: env::var("RATE_LIMIT_SWEEP_INTERVAL_SECS")
                .ok()
                .and_then(|s| s.parse().ok())
                .filter(|secs: &u64| *secs > 0)
                .map(Duration::from_secs)
                .unwrap_or(defaults.sweep_interval),
        }
    }
}

impl AppConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> Self {
        #[cfg(feature = "redis")]
        let redis = RedisRateLimitConfig::from_env();

        #[cfg(not(feature = "redis"))]
        if env::var("RATE_LIMIT_REDIS_URL").is_ok() {
            tracing::warn!("RATE_LIMIT_REDIS_URL is set but the redis feature is disabled");
        }

        if env::var("RATE_LIMIT_REDIS_TOKEN").is_ok() && env::var("RATE_LIMIT_REDIS_URL").is_err() {
            tracing::warn!("RATE_LIMIT_REDIS_TOKEN is set without RATE_LIMIT_REDIS_URL, ignoring it");
        }

        Self {
            host: env::var("HOST").unwrap_or_else(|_| "127.0.0.1".to_string()),
            port: env::var("PORT")
                .ok()
                .and_then(|p| p.parse().ok())
                .unwrap_or(8080),
            api_key: env::var("API_KEY")
                .ok()
                .map(|k| k.trim().to_string())
                .filter(|k| !k.is_empty()),
            rate_limit: RateLimitSettings::from_env(),
            slicer: ImageSlicerConfig::from_env(),
            #[cfg(feature = "redis")]
            redis,
        }
    }
}

/// Build a namespace quota from raw setting values.
///
/// Invalid values are replaced by the namespace default with a warning.
pub fn quota_from_values(
    namespace: Namespace,
    limit: Option<&str>,
    window_secs: Option<&str>,
) -> QuotaConfig {
    let defaults = QuotaConfig::default_for(namespace);

    let limit = match limit.map(parse_limit) {
        None => defaults.limit,
        Some(Ok(limit)) => limit,
        Some(Err(e)) => {
            tracing::warn!(
                namespace = %namespace,
                error = %e,
                default = defaults.limit.get(),
                "Invalid rate limit, using default"
            );
            defaults.limit
        }
    };

    let window = match window_secs.map(parse_window_secs) {
        None => defaults.window,
        Some(Ok(window)) => window,
        Some(Err(e)) => {
            tracing::warn!(
                namespace = %namespace,
                error = %e,
                default_secs = defaults.window.as_secs(),
                "Invalid rate limit window, using default"
            );
            defaults.window
        }
    };

    QuotaConfig::new(limit, window)
}

fn parse_flag(raw: &str) -> bool {
    !matches!(raw.trim().to_lowercase().as_str(), "false" | "0" | "no" | "off")
}
