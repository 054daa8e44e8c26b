//! Ports - trait definitions for external dependencies.
//! These are the "interfaces" that infrastructure must implement.

mod clock;
mod image;
mod rate_limit;

pub use clock::{Clock, SystemClock};
pub use image::{ImageSlicer, SliceError};
pub use rate_limit::{CounterStore, RateLimitError, RateLimiter, RemoteConnector};
