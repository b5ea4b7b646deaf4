use axum::Router;

use habbot_observability::Logger;

use crate::app::errors::ApiError;

pub mod auth;
pub mod employees;
pub mod system;

/// Router for the `/api` endpoints behind authentication or input handling.
pub fn router() -> Router {
    Router::new().merge(auth::router()).merge(employees::router())
}

/// Server-side failures get an extra line naming what was being done.
pub(crate) fn log_unhandled(logger: &Logger, err: &ApiError, during: &str) {
    if err.status().is_server_error() {
        logger.error(format!("Unhandled error during {during}"));
    }
}
