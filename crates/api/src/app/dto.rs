use axum::extract::rejection::JsonRejection;
use axum::extract::{FromRequest, Request};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use habbot_auth::{SupportedRole, User};
use habbot_core::Page;
use habbot_employees::{Department, Employee, EmployeeRole};
use habbot_observability::{LogValue, Loggable};

use crate::app::errors::ApiError;

// -------------------------
// Envelope
// -------------------------

/// Success envelope: `{success, message?, data?}`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
}

impl<T> ApiResponse<T> {
    pub fn ok(data: T, message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: Some(message.into()),
            data: Some(data),
        }
    }
}

impl<T: Serialize> Loggable for ApiResponse<T> {
    fn to_log_value(&self) -> LogValue {
        LogValue::record_of("ApiResponse", self)
    }
}

/// `axum::Json` whose rejection is rendered in the error envelope.
#[derive(Debug, Clone, Copy, Default)]
pub struct AppJson<T>(pub T);

#[axum::async_trait]
impl<S, T> FromRequest<S> for AppJson<T>
where
    axum::Json<T>: FromRequest<S, Rejection = JsonRejection>,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let axum::Json(value) = axum::Json::<T>::from_request(req, state)
            .await
            .map_err(|rejection| ApiError::Unprocessable(rejection.body_text()))?;
        Ok(Self(value))
    }
}

// -------------------------
// Auth
// -------------------------

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SignupRequest {
    pub name: String,
    pub email: String,
    pub password: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct VerifyEmailRequest {
    pub token: String,
}

impl Loggable for LoginRequest {
    fn to_log_value(&self) -> LogValue {
        LogValue::record_of("LoginRequest", self)
    }
}

impl Loggable for SignupRequest {
    fn to_log_value(&self) -> LogValue {
        LogValue::record_of("SignupRequest", self)
    }
}

impl Loggable for VerifyEmailRequest {
    fn to_log_value(&self) -> LogValue {
        LogValue::record_of("VerifyEmailRequest", self)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LoginData {
    pub id: String,
    pub access_token: String,
    pub refresh_token: String,
    pub token_type: &'static str,
    pub role: SupportedRole,
    pub email: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SignupData {
    pub id: String,
    pub name: String,
    pub email: String,
}

impl From<&User> for SignupData {
    fn from(user: &User) -> Self {
        Self {
            id: user.id.to_string(),
            name: user.name.clone(),
            email: user.email.as_str().to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VerifiedEmailData {
    pub id: String,
    pub email: String,
    pub is_email_verified: bool,
}

// -------------------------
// Employees
// -------------------------

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct ListEmployeesQuery {
    pub department: Option<Department>,
    pub role: Option<EmployeeRole>,
    pub page: Option<u32>,
    pub page_size: Option<u32>,
}

impl Loggable for ListEmployeesQuery {
    fn to_log_value(&self) -> LogValue {
        LogValue::record_of("ListEmployeesQuery", self)
    }
}

/// Public shape of an employee record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EmployeeData {
    pub id: String,
    pub name: String,
    pub email: String,
    pub department: Department,
    pub role: EmployeeRole,
    pub date_joined: DateTime<Utc>,
}

impl From<&Employee> for EmployeeData {
    fn from(employee: &Employee) -> Self {
        Self {
            id: employee.id.to_string(),
            name: employee.name.clone(),
            email: employee.email.as_str().to_string(),
            department: employee.department,
            role: employee.role,
            date_joined: employee.date_joined,
        }
    }
}

pub type EmployeeListData = Page<EmployeeData>;

#[cfg(test)]
mod tests {
    use super::*;
    use habbot_core::PageRequest;
    use habbot_employees::NewEmployee;
    use habbot_observability::SafeSerializer;
    use serde_json::json;

    fn employee() -> Employee {
        Employee::register(NewEmployee {
            name: "Grace".into(),
            email: "grace@example.com".into(),
            department: Department::Engineering,
            role: EmployeeRole::Manager,
        })
        .unwrap()
    }

    #[test]
    fn envelope_omits_missing_parts() {
        let body = serde_json::to_value(ApiResponse::<()> {
            success: true,
            message: None,
            data: None,
        })
        .unwrap();
        assert_eq!(body, json!({ "success": true }));
    }

    #[test]
    fn employee_data_hides_internal_fields() {
        let body = serde_json::to_value(EmployeeData::from(&employee())).unwrap();
        let keys: Vec<&str> = body.as_object().unwrap().keys().map(String::as_str).collect();
        assert_eq!(keys, ["id", "name", "email", "department", "role", "date_joined"]);
        assert_eq!(body["department"], "ENGINEERING");
    }

    #[test]
    fn list_data_uses_camel_case_totals() {
        let page = Page::from_all(vec![EmployeeData::from(&employee())], PageRequest::default());
        let body = serde_json::to_value(&page).unwrap();
        assert_eq!(body["pageSize"], 10);
        assert_eq!(body["totalPages"], 1);
    }

    #[test]
    fn tokens_are_redacted_when_logged() {
        let response = ApiResponse::ok(
            LoginData {
                id: "1".into(),
                access_token: "aaa".into(),
                refresh_token: "rrr".into(),
                token_type: "Bearer",
                role: SupportedRole::User,
                email: "a@b.io".into(),
            },
            "Successfully logged in",
        );
        let logged = SafeSerializer::default().serialize_loggable(&response);
        assert_eq!(logged["data"]["access_token"], "***redacted***");
        assert_eq!(logged["data"]["refresh_token"], "***redacted***");
        assert_eq!(logged["data"]["email"], "a@b.io");
    }
}
