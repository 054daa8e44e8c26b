//! Quota policy - turns a counter observation into an allow/deny decision.

use std::num::NonZeroU32;
use std::time::Duration;

use chrono::{DateTime, Utc};

use super::Namespace;
use crate::error::DomainError;

const DEFAULT_PROCESSING_LIMIT: NonZeroU32 = NonZeroU32::new(10).unwrap();
const DEFAULT_HEALTH_LIMIT: NonZeroU32 = NonZeroU32::new(60).unwrap();

/// Limit and window for one namespace.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QuotaConfig {
    pub limit: NonZeroU32,
    pub window: Duration,
}

impl QuotaConfig {
    pub const DEFAULT_WINDOW: Duration = Duration::from_secs(60 * 60);

    pub fn new(limit: NonZeroU32, window: Duration) -> Self {
        Self { limit, window }
    }

    /// Fixed fallback used when configuration is missing or invalid.
    pub fn default_for(namespace: Namespace) -> Self {
        let limit = match namespace {
            Namespace::Processing => DEFAULT_PROCESSING_LIMIT,
            Namespace::Health => DEFAULT_HEALTH_LIMIT,
        };
        Self::new(limit, Self::DEFAULT_WINDOW)
    }
}

/// Parse a configured request limit. Zero, negative and non-numeric values are rejected.
pub fn parse_limit(raw: &str) -> Result<NonZeroU32, DomainError> {
    let value: i64 = raw
        .trim()
        .parse()
        .map_err(|_| DomainError::Validation(format!("limit '{}' is not a number", raw)))?;

    u32::try_from(value)
        .ok()
        .and_then(NonZeroU32::new)
        .ok_or_else(|| DomainError::Validation(format!("limit {} must be positive", value)))
}

/// Parse a configured window length in whole seconds.
pub fn parse_window_secs(raw: &str) -> Result<Duration, DomainError> {
    match raw.trim().parse::<u64>() {
        Ok(0) => Err(DomainError::Validation("window must be positive".to_string())),
        Ok(secs) => Ok(Duration::from_secs(secs)),
        Err(_) => Err(DomainError::Validation(format!(
            "window '{}' is not a number of seconds",
            raw
        ))),
    }
}

/// One observation of a window counter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CounterHit {
    pub count: u64,
    pub reset_at: DateTime<Utc>,
    pub first_in_window: bool,
}

/// Outcome of evaluating a counter against its namespace limit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RateDecision {
    pub allowed: bool,
    pub limit: u32,
    pub remaining: u32,
    pub reset_at: DateTime<Utc>,
    /// Set only when the request is denied; always at least 1.
    pub retry_after_secs: Option<u64>,
}

impl RateDecision {
    /// Reset time as a Unix timestamp in seconds.
    pub fn reset_timestamp(&self) -> i64 {
        self.reset_at.timestamp()
    }
}

/// Per-namespace quotas, fixed at process start.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuotaPolicy {
    processing: QuotaConfig,
    health: QuotaConfig,
}

impl Default for QuotaPolicy {
    fn default() -> Self {
        Self {
            processing: QuotaConfig::default_for(Namespace::Processing),
            health: QuotaConfig::default_for(Namespace::Health),
        }
    }
}

impl QuotaPolicy {
    pub fn new(processing: QuotaConfig, health: QuotaConfig) -> Self {
        Self { processing, health }
    }

    pub fn quota(&self, namespace: Namespace) -> QuotaConfig {
        match namespace {
            Namespace::Processing => self.processing,
            Namespace::Health => self.health,
        }
    }

    pub fn limit(&self, namespace: Namespace) -> u32 {
        self.quota(namespace).limit.get()
    }

    pub fn window(&self, namespace: Namespace) -> Duration {
        self.quota(namespace).window
    }

    pub fn evaluate(&self, namespace: Namespace, hit: &CounterHit, now: DateTime<Utc>) -> RateDecision {
        let limit = self.limit(namespace);
        let allowed = hit.count <= u64::from(limit);
        let remaining = u64::from(limit).saturating_sub(hit.count) as u32;

        let retry_after_secs = if allowed {
            None
        } else {
            Some(retry_after(hit.reset_at, now))
        };

        RateDecision {
            allowed,
            limit,
            remaining,
            reset_at: hit.reset_at,
            retry_after_secs,
        }
    }
}

/// Whole seconds until `reset_at`, rounded up, never below one.
fn retry_after(reset_at: DateTime<Utc>, now: DateTime<Utc>) -> u64 {
    let millis = (reset_at - now).num_milliseconds();
    let secs = (millis + 999).div_euclid(1000);
    secs.max(1) as u64
}
