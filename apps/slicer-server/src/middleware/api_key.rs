//! API key authentication for the API-facing routes.

use std::fmt;
use std::future::{Ready, ready};
use std::sync::Arc;

use actix_web::{FromRequest, HttpRequest, dev::Payload, web};
use subtle::ConstantTimeEq;

use super::error::AppError;
use crate::state::AppState;

/// Header carrying the caller's key.
pub const API_KEY_HEADER: &str = "X-API-Key";

/// Configured shared secret. Never printed.
#[derive(Clone)]
pub struct ApiKey(Arc<str>);

impl ApiKey {
    pub fn new(key: impl Into<String>) -> Self {
        Self(Arc::from(key.into()))
    }

    /// Compare a presented key in constant time.
    pub fn verify(&self, presented: &str) -> bool {
        self.0.as_bytes().ct_eq(presented.as_bytes()).into()
    }
}

impl fmt::Debug for ApiKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ApiKey(***)")
    }
}

/// Extractor that admits requests carrying the configured API key.
#[derive(Debug, Clone, Copy)]
pub struct ApiKeyAuth;

impl FromRequest for ApiKeyAuth {
    type Error = AppError;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _: &mut Payload) -> Self::Future {
        ready(authorize(req))
    }
}

fn authorize(req: &HttpRequest) -> Result<ApiKeyAuth, AppError> {
    let state = req
        .app_data::<web::Data<AppState>>()
        .ok_or_else(|| AppError::Internal("application state missing".to_string()))?;

    let Some(expected) = state.api_key.as_ref() else {
        return Err(AppError::ServiceUnavailable(
            "API access is not configured on this server".to_string(),
        ));
    };

    let presented = req
        .headers()
        .get(API_KEY_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .ok_or_else(|| AppError::Unauthorized("Missing X-API-Key header".to_string()))?;

    if expected.verify(presented) {
        Ok(ApiKeyAuth)
    } else {
        tracing::warn!("Rejected request with invalid API key");
        Err(AppError::Unauthorized("Invalid API key".to_string()))
    }
}
