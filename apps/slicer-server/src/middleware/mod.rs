//! Middleware modules.

pub mod api_key;
pub mod error;
pub mod rate_limit;

pub use api_key::{ApiKey, ApiKeyAuth};
pub use error::AppResult;
pub use rate_limit::{GateSettings, RateLimitGate};
