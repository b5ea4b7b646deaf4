use std::sync::Arc;

use axum::Json;
use axum::extract::Extension;
use axum::response::Redirect;
use serde_json::{Value, json};

use habbot_observability::time::readable_duration;

use crate::app::services::AppServices;

pub const HEALTH_PATH: &str = "/api/health";

pub async fn health(Extension(services): Extension<Arc<AppServices>>) -> Json<Value> {
    services.logger("BackendCoreRoute").info("Backend app health endpoint accessed");
    let uptime_ms = services.started_at.elapsed().as_secs_f64() * 1000.0;
    Json(json!({
        "success": true,
        "environment": services.environment,
        "uptime": readable_duration(uptime_ms),
    }))
}

/// `/` and unknown paths land on the health check.
pub async fn redirect_to_health() -> Redirect {
    Redirect::temporary(HEALTH_PATH)
}
