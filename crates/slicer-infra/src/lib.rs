//! # Slicer Infrastructure
//!
//! Concrete implementations of the ports defined in `slicer-core`.
//!
//! ## Feature Flags
//!
//! - `full` (default) - All features enabled
//! - `minimal` - No external stores, in-memory counters only
//! - `redis` - Redis-backed rate limit counters shared across instances

pub mod pipeline;
pub mod rate_limit;

// Re-exports - In-Memory
pub use rate_limit::{BackendMode, BackendSelector, InMemoryCounterStore, QuotaRateLimiter};

pub use pipeline::{HttpImageSlicer, ImageSlicerConfig};

// Re-exports - Redis
#[cfg(feature = "redis")]
pub use rate_limit::{RedisConnector, RedisCounterStore, RedisRateLimitConfig};
