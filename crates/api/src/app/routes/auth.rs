use std::sync::Arc;

use axum::extract::Extension;
use axum::http::StatusCode;
use axum::routing::post;
use axum::{Json, Router};

use crate::app::dto::{
    ApiResponse, AppJson, LoginData, LoginRequest, SignupData, SignupRequest, VerifiedEmailData, VerifyEmailRequest,
};
use crate::app::errors::ApiError;
use crate::app::routes::log_unhandled;
use crate::app::services::AppServices;

const LOGGER: &str = "AuthRoute";

pub fn router() -> Router {
    Router::new()
        .route("/api/auth/login", post(login))
        .route("/api/auth/signup", post(signup))
        .route("/api/auth/verify-email", post(verify_email))
}

/// Authenticate a user and return access tokens.
pub async fn login(
    Extension(services): Extension<Arc<AppServices>>,
    AppJson(body): AppJson<LoginRequest>,
) -> Result<Json<ApiResponse<LoginData>>, ApiError> {
    let log = services.logger(LOGGER);
    log.info(format!("Login attempt started for email {}", body.email));
    let email = body.email.clone();

    let response = services
        .auth
        .login(body)
        .await
        .inspect_err(|e| log_unhandled(&log, e, &format!("login for email {email}")))?;
    Ok(Json(response))
}

/// Register a new user account.
pub async fn signup(
    Extension(services): Extension<Arc<AppServices>>,
    AppJson(body): AppJson<SignupRequest>,
) -> Result<(StatusCode, Json<ApiResponse<SignupData>>), ApiError> {
    let log = services.logger(LOGGER);
    log.info(format!("Signup attempt started for email {}", body.email));
    let email = body.email.clone();

    let response = services
        .auth
        .signup(body)
        .await
        .inspect_err(|e| log_unhandled(&log, e, &format!("signup for email {email}")))?;
    Ok((StatusCode::CREATED, Json(response)))
}

pub async fn verify_email(
    Extension(services): Extension<Arc<AppServices>>,
    AppJson(body): AppJson<VerifyEmailRequest>,
) -> Result<Json<ApiResponse<VerifiedEmailData>>, ApiError> {
    let log = services.logger(LOGGER);
    let response = services
        .auth
        .verify_email(body)
        .await
        .inspect_err(|e| log_unhandled(&log, e, "email verification"))?;
    Ok(Json(response))
}
