use std::sync::Arc;

use axum::extract::rejection::QueryRejection;
use axum::extract::{Extension, Path, Query};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};

use habbot_employees::{EmployeePatch, NewEmployee};

use crate::app::dto::{ApiResponse, AppJson, EmployeeData, EmployeeListData, ListEmployeesQuery};
use crate::app::errors::ApiError;
use crate::app::routes::log_unhandled;
use crate::app::services::AppServices;
use crate::context::CurrentUser;

const LOGGER: &str = "EmployeesRoute";

pub fn router() -> Router {
    Router::new()
        .route("/api/employees", post(create_employee).get(list_employees))
        .route(
            "/api/employees/:id",
            get(get_employee).put(update_employee).delete(delete_employee),
        )
}

pub async fn create_employee(
    Extension(services): Extension<Arc<AppServices>>,
    CurrentUser(user): CurrentUser,
    AppJson(body): AppJson<NewEmployee>,
) -> Result<(StatusCode, Json<ApiResponse<EmployeeData>>), ApiError> {
    let log = services.logger(LOGGER);
    log.info(format!("Employee creation request by : {}", user.email.as_str()));
    let email = body.email.clone();

    let response = services
        .employees
        .create(body)
        .await
        .inspect_err(|e| log_unhandled(&log, e, &format!("employee creation for email {email}")))?;
    Ok((StatusCode::CREATED, Json(response)))
}

pub async fn list_employees(
    Extension(services): Extension<Arc<AppServices>>,
    CurrentUser(user): CurrentUser,
    query: Result<Query<ListEmployeesQuery>, QueryRejection>,
) -> Result<Json<ApiResponse<EmployeeListData>>, ApiError> {
    let Query(query) = query.map_err(|rejection| ApiError::Unprocessable(rejection.body_text()))?;
    let log = services.logger(LOGGER);
    log.info(format!("Employee list request by : {}", user.email.as_str()));

    let response = services
        .employees
        .list(query)
        .await
        .inspect_err(|e| log_unhandled(&log, e, "employee list request"))?;
    Ok(Json(response))
}

pub async fn get_employee(
    Extension(services): Extension<Arc<AppServices>>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<String>,
) -> Result<Json<ApiResponse<EmployeeData>>, ApiError> {
    let log = services.logger(LOGGER);
    log.info(format!("Employee fetch request by : {}", user.email.as_str()));

    let response = services
        .employees
        .get(&id)
        .await
        .inspect_err(|e| log_unhandled(&log, e, &format!("fetching employee {id}")))?;
    Ok(Json(response))
}

pub async fn update_employee(
    Extension(services): Extension<Arc<AppServices>>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<String>,
    AppJson(patch): AppJson<EmployeePatch>,
) -> Result<Json<ApiResponse<EmployeeData>>, ApiError> {
    let log = services.logger(LOGGER);
    log.info(format!("Employee update request by : {}", user.email.as_str()));

    let response = services
        .employees
        .update(&id, patch)
        .await
        .inspect_err(|e| log_unhandled(&log, e, &format!("employee update {id}")))?;
    Ok(Json(response))
}

pub async fn delete_employee(
    Extension(services): Extension<Arc<AppServices>>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    let log = services.logger(LOGGER);
    log.info(format!("Employee delete request by : {}", user.email.as_str()));

    services
        .employees
        .delete(&id)
        .await
        .inspect_err(|e| log_unhandled(&log, e, &format!("employee deletion {id}")))?;
    Ok(StatusCode::NO_CONTENT)
}
