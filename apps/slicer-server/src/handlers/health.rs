//! Health check endpoint.

use actix_web::{HttpResponse, web};
use slicer_shared::dto::HealthResponse;

use crate::state::AppState;

/// Health check endpoint - returns server status.
///
/// GET /api/health
pub async fn health_check(state: web::Data<AppState>) -> HttpResponse {
    tracing::debug!(gate_faults = state.gate.fault_count(), "Health check");

    let response = HealthResponse {
        status: "ok".to_string(),
        timestamp: chrono::Utc::now().to_rfc3339(),
        api_key_configured: state.api_key.is_some(),
    };

    HttpResponse::Ok().json(response)
}
