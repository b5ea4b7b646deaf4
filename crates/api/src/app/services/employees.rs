use std::sync::Arc;

use habbot_core::{DomainError, EmployeeId, PageRequest};
use habbot_employees::{Employee, EmployeeFilter, EmployeePatch, NewEmployee};
use habbot_infra::{EmployeeStore, StoreError};
use habbot_observability::{Logger, LoggerFactory, LoggerOptions, call_info};

use crate::app::dto::{ApiResponse, EmployeeData, EmployeeListData, ListEmployeesQuery};
use crate::app::errors::ApiError;

const CLASS: &str = "EmployeeService";
const DUPLICATE_EMAIL: &str = "Employee with email already exists";
const NOT_FOUND: &str = "Employee not found";

pub struct EmployeeService {
    employees: Arc<dyn EmployeeStore>,
    logger: Logger,
}

/// Unparseable ids name no employee.
fn parse_id(raw: &str) -> Result<EmployeeId, ApiError> {
    raw.parse().map_err(|_| DomainError::not_found(NOT_FOUND).into())
}

fn write_error(action: &'static str) -> impl Fn(StoreError) -> ApiError {
    move |err| match err {
        StoreError::Duplicate(_) => DomainError::conflict(DUPLICATE_EMAIL).into(),
        StoreError::NotFound(_) => DomainError::not_found(NOT_FOUND).into(),
        other => ApiError::store(action, other),
    }
}

impl EmployeeService {
    pub fn new(employees: Arc<dyn EmployeeStore>, logs: &LoggerFactory) -> Self {
        Self {
            employees,
            logger: logs.get_logger(CLASS, LoggerOptions::default()),
        }
    }

    pub async fn create(&self, input: NewEmployee) -> Result<ApiResponse<EmployeeData>, ApiError> {
        let call = call_info!("create_employee").in_class(CLASS).arg("employee_data", &input);
        self.logger
            .track_async(call, async {
                let existing = self
                    .employees
                    .find_by_email(&input.email)
                    .await
                    .map_err(|e| ApiError::store("employee creation", e))?;
                if existing.is_some() {
                    return Err(DomainError::conflict(DUPLICATE_EMAIL).into());
                }

                let employee = Employee::register(input.clone())?;
                let employee = self
                    .employees
                    .insert(employee)
                    .await
                    .map_err(write_error("employee creation"))?;

                Ok(ApiResponse::ok(EmployeeData::from(&employee), "Employee created successfully"))
            })
            .await
    }

    pub async fn list(&self, query: ListEmployeesQuery) -> Result<ApiResponse<EmployeeListData>, ApiError> {
        let call = call_info!("list_employees").in_class(CLASS).arg("query", &query);
        self.logger
            .track_async(call, async {
                let page = PageRequest::new(query.page, query.page_size)?;
                let filter = EmployeeFilter {
                    department: query.department,
                    role: query.role,
                };
                let found = self
                    .employees
                    .list(filter, page)
                    .await
                    .map_err(|e| ApiError::store("employee list", e))?;

                Ok(ApiResponse::ok(
                    found.map(|employee| EmployeeData::from(&employee)),
                    "Employees list fetched successfully",
                ))
            })
            .await
    }

    pub async fn get(&self, employee_id: &str) -> Result<ApiResponse<EmployeeData>, ApiError> {
        let call = call_info!("get_employee").in_class(CLASS).arg("employee_id", employee_id);
        self.logger
            .track_async(call, async {
                let employee = self.find(employee_id, "fetching employee").await?;
                Ok(ApiResponse::ok(EmployeeData::from(&employee), "Employee fetched successfully"))
            })
            .await
    }

    pub async fn update(
        &self,
        employee_id: &str,
        patch: EmployeePatch,
    ) -> Result<ApiResponse<EmployeeData>, ApiError> {
        let call = call_info!("update_employee")
            .in_class(CLASS)
            .arg("employee_id", employee_id)
            .arg("updated_data", &patch);
        self.logger
            .track_async(call, async {
                if patch.is_empty() {
                    return Err(DomainError::validation("No fields provided for update").into());
                }
                let current = self.find(employee_id, "employee update").await?;
                let next = current.patched(&patch)?;

                if next.email != current.email {
                    let taken = self
                        .employees
                        .find_by_email(next.email.as_str())
                        .await
                        .map_err(|e| ApiError::store("employee update", e))?;
                    if taken.is_some_and(|other| other.id != current.id) {
                        return Err(DomainError::conflict(DUPLICATE_EMAIL).into());
                    }
                }

                let updated = self
                    .employees
                    .update(next)
                    .await
                    .map_err(write_error("employee update"))?;
                Ok(ApiResponse::ok(EmployeeData::from(&updated), "Employee updated successfully"))
            })
            .await
    }

    /// Soft delete; the email becomes available again.
    pub async fn delete(&self, employee_id: &str) -> Result<(), ApiError> {
        let call = call_info!("delete_employee").in_class(CLASS).arg("employee_id", employee_id);
        self.logger
            .track_async(call, async {
                let id = parse_id(employee_id)?;
                let deleted = self
                    .employees
                    .deactivate(id)
                    .await
                    .map_err(|e| ApiError::store("employee deletion", e))?;
                if !deleted {
                    return Err(DomainError::not_found(NOT_FOUND).into());
                }
                Ok(())
            })
            .await
    }

    async fn find(&self, employee_id: &str, action: &'static str) -> Result<Employee, ApiError> {
        let id = parse_id(employee_id)?;
        self.employees
            .get(id)
            .await
            .map_err(|e| ApiError::store(action, e))?
            .ok_or_else(|| DomainError::not_found(NOT_FOUND).into())
    }
}
