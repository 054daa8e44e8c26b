//! Rate limiting implementations.
//!
//! Two interchangeable window counter stores (in-memory and Redis), the
//! selector that picks between them, and the limiter that applies the
//! quota policy on top.

mod limiter;
mod memory;
mod selector;

pub use limiter::QuotaRateLimiter;
pub use memory::{InMemoryCounterStore, spawn_sweeper};
pub use selector::{BackendMode, BackendSelector};

#[cfg(feature = "redis")]
mod redis;
#[cfg(feature = "redis")]
pub use self::redis::{RedisConnector, RedisCounterStore, RedisRateLimitConfig};

use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};

/// End of a window opened at `now`. Saturates instead of overflowing.
pub(crate) fn window_end(now: DateTime<Utc>, window: Duration) -> DateTime<Utc> {
    TimeDelta::from_std(window)
        .ok()
        .and_then(|delta| now.checked_add_signed(delta))
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}

#[cfg(test)]
pub(crate) mod test_support {
    use std::sync::Mutex;
    use std::time::Duration;

    use chrono::{DateTime, TimeDelta, Utc};
    use slicer_core::ports::Clock;

    /// Clock that only moves when told to.
    pub struct ManualClock {
        now: Mutex<DateTime<Utc>>,
    }

    impl ManualClock {
        pub fn new() -> Self {
            Self {
                now: Mutex::new(Utc::now()),
            }
        }

        pub fn advance(&self, by: Duration) {
            let mut now = self.now.lock().unwrap();
            *now += TimeDelta::from_std(by).unwrap();
        }
    }

    impl Clock for ManualClock {
        fn now(&self) -> DateTime<Utc> {
            *self.now.lock().unwrap()
        }
    }
}
