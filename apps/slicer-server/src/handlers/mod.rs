//! HTTP handlers and route configuration.

mod health;
mod process;

use actix_web::web;
use slicer_core::domain::Namespace;

use crate::middleware::RateLimitGate;
use crate::middleware::error::json_error_handler;
use crate::state::AppState;

/// Configure all application routes.
///
/// Both processing routes share one quota namespace; the health route has its own.
pub fn configure_routes(cfg: &mut web::ServiceConfig, state: &AppState) {
    let gate = |namespace| RateLimitGate::new(state.limiter.clone(), namespace, state.gate.clone());

    cfg.service(
        web::scope("/api")
            .app_data(web::JsonConfig::default().error_handler(json_error_handler))
            .service(
                web::resource("/health")
                    .wrap(gate(Namespace::Health))
                    .route(web::get().to(health::health_check)),
            )
            // UI-facing
            .service(
                web::resource("/process")
                    .wrap(gate(Namespace::Processing))
                    .route(web::post().to(process::process_image)),
            )
            // API-facing
            .service(
                web::resource("/v1/process")
                    .wrap(gate(Namespace::Processing))
                    .route(web::post().to(process::process_image_api)),
            ),
    );
}
