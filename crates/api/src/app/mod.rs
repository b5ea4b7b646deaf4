//! Router assembly.
//!
//! - `services/`: per-area services over the stores
//! - `routes/`: HTTP handlers, one file per area
//! - `dto.rs`: request and response bodies
//! - `errors.rs`: error envelope and status mapping

use std::sync::Arc;

use axum::routing::get;
use axum::{Extension, Router};

use crate::config::AppConfig;
use crate::middleware::{RequestLogState, request_logging};

pub mod dto;
pub mod errors;
pub mod routes;
pub mod services;

use services::AppServices;

/// Full HTTP router over already-built services.
pub fn router(services: Arc<AppServices>) -> Router {
    let log_state = RequestLogState::new(services.auth.validator(), services.logs());

    Router::new()
        .route("/", get(routes::system::redirect_to_health))
        .route(routes::system::HEALTH_PATH, get(routes::system::health))
        .merge(routes::router())
        .fallback(routes::system::redirect_to_health)
        .layer(axum::middleware::from_fn_with_state(log_state, request_logging))
        .layer(Extension(services))
}

/// Build services from configuration, then the router over them.
pub async fn build_app(config: &AppConfig) -> anyhow::Result<(Router, Arc<AppServices>)> {
    let services = Arc::new(services::build_services(config).await?);
    Ok((router(services.clone()), services))
}
