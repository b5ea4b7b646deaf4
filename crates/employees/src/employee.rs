use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use habbot_core::{DomainError, Email, EmployeeId, Entity, Timestamps};
use habbot_observability::{LogValue, Loggable};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Department {
    Hr,
    Sales,
    Engineering,
}

impl Department {
    pub fn as_str(&self) -> &'static str {
        match self {
            Department::Hr => "HR",
            Department::Sales => "SALES",
            Department::Engineering => "ENGINEERING",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum EmployeeRole {
    Manager,
    Developer,
    Analyst,
}

impl EmployeeRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            EmployeeRole::Manager => "MANAGER",
            EmployeeRole::Developer => "DEVELOPER",
            EmployeeRole::Analyst => "ANALYST",
        }
    }
}

/// Input for registering an employee.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewEmployee {
    pub name: String,
    pub email: String,
    pub department: Department,
    pub role: EmployeeRole,
}

/// Partial update; `None` keeps the current value.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmployeePatch {
    pub name: Option<String>,
    pub email: Option<String>,
    pub department: Option<Department>,
    pub role: Option<EmployeeRole>,
}

impl EmployeePatch {
    pub fn is_empty(&self) -> bool {
        self.name.is_none() && self.email.is_none() && self.department.is_none() && self.role.is_none()
    }
}

/// List filter; unset fields match everything.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EmployeeFilter {
    pub department: Option<Department>,
    pub role: Option<EmployeeRole>,
}

impl EmployeeFilter {
    pub fn matches(&self, employee: &Employee) -> bool {
        employee.is_active
            && self.department.is_none_or(|d| d == employee.department)
            && self.role.is_none_or(|r| r == employee.role)
    }
}

/// Employee directory record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Employee {
    pub id: EmployeeId,
    pub name: String,
    pub email: Email,
    pub department: Department,
    pub role: EmployeeRole,
    pub date_joined: DateTime<Utc>,
    pub is_active: bool,
    #[serde(flatten)]
    pub timestamps: Timestamps,
}

impl Employee {
    /// Validate input and build an active record joined now.
    pub fn register(input: NewEmployee) -> Result<Self, DomainError> {
        let name = clean_name(&input.name)?;
        let email = Email::parse(&input.email)?;
        let timestamps = Timestamps::now();

        Ok(Self {
            id: EmployeeId::new(),
            name,
            email,
            department: input.department,
            role: input.role,
            date_joined: timestamps.created_at,
            is_active: true,
            timestamps,
        })
    }

    /// Return the record with `patch` applied. `self` is left untouched on error.
    pub fn patched(&self, patch: &EmployeePatch) -> Result<Self, DomainError> {
        let mut next = self.clone();
        if let Some(name) = &patch.name {
            next.name = clean_name(name)?;
        }
        if let Some(email) = &patch.email {
            next.email = Email::parse(email)?;
        }
        if let Some(department) = patch.department {
            next.department = department;
        }
        if let Some(role) = patch.role {
            next.role = role;
        }
        next.timestamps.touch();
        Ok(next)
    }
}

fn clean_name(raw: &str) -> Result<String, DomainError> {
    let name = raw.trim();
    if name.is_empty() {
        return Err(DomainError::validation("name cannot be empty"));
    }
    Ok(name.to_string())
}

impl Entity for Employee {
    type Id = EmployeeId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn unique_email(&self) -> Option<&str> {
        self.is_active.then(|| self.email.as_str())
    }

    fn timestamps(&self) -> &Timestamps {
        &self.timestamps
    }

    fn timestamps_mut(&mut self) -> &mut Timestamps {
        &mut self.timestamps
    }
}

impl Loggable for Department {
    fn to_log_value(&self) -> LogValue {
        LogValue::Enum(self.as_str().to_string())
    }
}

impl Loggable for EmployeeRole {
    fn to_log_value(&self) -> LogValue {
        LogValue::Enum(self.as_str().to_string())
    }
}

impl Loggable for Employee {
    fn to_log_value(&self) -> LogValue {
        LogValue::entity(
            "Employee",
            [
                ("id", self.id.as_uuid().to_log_value()),
                ("name", self.name.to_log_value()),
                ("email", self.email.as_str().to_log_value()),
                ("department", self.department.to_log_value()),
                ("role", self.role.to_log_value()),
                ("date_joined", self.date_joined.to_log_value()),
                ("is_active", self.is_active.to_log_value()),
                ("created_at", self.timestamps.created_at.to_log_value()),
                ("updated_at", self.timestamps.updated_at.to_log_value()),
            ],
        )
    }
}

impl Loggable for NewEmployee {
    fn to_log_value(&self) -> LogValue {
        LogValue::record_of("NewEmployee", self)
    }
}

impl Loggable for EmployeePatch {
    fn to_log_value(&self) -> LogValue {
        LogValue::record_of("EmployeePatch", self)
    }
}
