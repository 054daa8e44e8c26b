//! Domain types - rate-limit namespaces, quotas, identities and slice jobs.

mod identity;
mod image;
mod namespace;
mod quota;

pub use identity::{ClientIdentity, sanitize_key_component};
pub use image::{ImageChunk, SliceRequest, SlicedImage};
pub use namespace::Namespace;
pub use quota::{CounterHit, QuotaConfig, QuotaPolicy, RateDecision, parse_limit, parse_window_secs};
