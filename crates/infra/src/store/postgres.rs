//! Postgres-backed document stores (JSONB documents).
//!
//! Each table keeps the full document in `doc` plus the columns needed for
//! lookups and uniqueness. Live-email uniqueness is a (partial) unique
//! index, so concurrent inserts cannot both succeed.

use std::sync::Arc;

use serde::Serialize;
use serde::de::DeserializeOwned;
use sqlx::types::Json;
use sqlx::{PgPool, Row};

use habbot_auth::User;
use habbot_core::{EmployeeId, Page, PageRequest, UserId};
use habbot_employees::{Employee, EmployeeFilter};

use super::{EmployeeStore, UserStore};
use crate::error::StoreError;

const SCHEMA: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS users (
        id UUID PRIMARY KEY,
        email TEXT NOT NULL,
        doc JSONB NOT NULL,
        created_at TIMESTAMPTZ NOT NULL,
        updated_at TIMESTAMPTZ NOT NULL
    )
    "#,
    "CREATE UNIQUE INDEX IF NOT EXISTS users_email_key ON users (email)",
    r#"
    CREATE TABLE IF NOT EXISTS employees (
        id UUID PRIMARY KEY,
        email TEXT NOT NULL,
        department TEXT NOT NULL,
        role TEXT NOT NULL,
        is_active BOOLEAN NOT NULL,
        doc JSONB NOT NULL,
        created_at TIMESTAMPTZ NOT NULL,
        updated_at TIMESTAMPTZ NOT NULL
    )
    "#,
    "CREATE UNIQUE INDEX IF NOT EXISTS employees_active_email_key ON employees (email) WHERE is_active",
];

/// Create tables and indexes when missing.
pub async fn migrate(pool: &PgPool) -> Result<(), StoreError> {
    for statement in SCHEMA {
        sqlx::query(statement)
            .execute(pool)
            .await
            .map_err(|e| map_sqlx_error("migrate", e))?;
    }
    Ok(())
}

fn map_sqlx_error(operation: &str, err: sqlx::Error) -> StoreError {
    match err {
        sqlx::Error::Database(db_err) if db_err.code().as_deref() == Some("23505") => {
            StoreError::Duplicate(format!("{operation}: {}", db_err.message()))
        }
        other => {
            tracing::warn!(operation, error = %other, "postgres store error");
            StoreError::backend(format!("database error in {operation}: {other}"))
        }
    }
}

fn decode<T: DeserializeOwned>(row: &sqlx::postgres::PgRow) -> Result<T, StoreError> {
    row.try_get::<Json<T>, _>("doc")
        .map(|Json(doc)| doc)
        .map_err(|e| StoreError::backend(format!("failed to decode document: {e}")))
}

fn json<T: Serialize>(doc: &T) -> Result<serde_json::Value, StoreError> {
    serde_json::to_value(doc).map_err(|e| StoreError::backend(format!("failed to encode document: {e}")))
}

#[derive(Debug, Clone)]
pub struct PostgresUserStore {
    pool: Arc<PgPool>,
}

impl PostgresUserStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool: Arc::new(pool) }
    }
}

#[async_trait::async_trait]
impl UserStore for PostgresUserStore {
    async fn insert(&self, user: User) -> Result<User, StoreError> {
        sqlx::query(
            r#"
            INSERT INTO users (id, email, doc, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(user.id.as_uuid())
        .bind(user.email.as_str())
        .bind(json(&user)?)
        .bind(user.timestamps.created_at)
        .bind(user.timestamps.updated_at)
        .execute(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("insert_user", e))?;
        Ok(user)
    }

    async fn get(&self, id: UserId) -> Result<Option<User>, StoreError> {
        let row = sqlx::query("SELECT doc FROM users WHERE id = $1")
            .bind(id.as_uuid())
            .fetch_optional(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("get_user", e))?;
        row.as_ref().map(decode).transpose()
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<User>, StoreError> {
        let row = sqlx::query("SELECT doc FROM users WHERE email = $1")
            .bind(email.trim().to_lowercase())
            .fetch_optional(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("find_user_by_email", e))?;
        row.as_ref().map(decode).transpose()
    }

    async fn update(&self, mut user: User) -> Result<User, StoreError> {
        user.timestamps.touch();
        let result = sqlx::query("UPDATE users SET email = $2, doc = $3, updated_at = $4 WHERE id = $1")
            .bind(user.id.as_uuid())
            .bind(user.email.as_str())
            .bind(json(&user)?)
            .bind(user.timestamps.updated_at)
            .execute(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("update_user", e))?;
        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound(user.id.to_string()));
        }
        Ok(user)
    }
}

#[derive(Debug, Clone)]
pub struct PostgresEmployeeStore {
    pool: Arc<PgPool>,
}

impl PostgresEmployeeStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool: Arc::new(pool) }
    }

    async fn write(&self, operation: &str, sql: &str, employee: &Employee) -> Result<u64, StoreError> {
        let result = sqlx::query(sql)
            .bind(employee.id.as_uuid())
            .bind(employee.email.as_str())
            .bind(employee.department.as_str())
            .bind(employee.role.as_str())
            .bind(employee.is_active)
            .bind(json(employee)?)
            .bind(employee.timestamps.updated_at)
            .execute(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error(operation, e))?;
        Ok(result.rows_affected())
    }
}

// Both statements bind: id, email, department, role, is_active, doc, updated_at.
const INSERT_EMPLOYEE: &str = r#"
    INSERT INTO employees (id, email, department, role, is_active, doc, created_at, updated_at)
    VALUES ($1, $2, $3, $4, $5, $6, $7, $7)
"#;

const UPDATE_EMPLOYEE: &str = r#"
    UPDATE employees
    SET email = $2, department = $3, role = $4, is_active = $5, doc = $6, updated_at = $7
    WHERE id = $1 AND is_active
"#;

const DEACTIVATE_EMPLOYEE: &str = r#"
    UPDATE employees
    SET is_active = FALSE,
        updated_at = now(),
        doc = doc || jsonb_build_object('is_active', FALSE, 'updated_at', now())
    WHERE id = $1 AND is_active
"#;

#[async_trait::async_trait]
impl EmployeeStore for PostgresEmployeeStore {
    async fn insert(&self, employee: Employee) -> Result<Employee, StoreError> {
        self.write("insert_employee", INSERT_EMPLOYEE, &employee).await?;
        Ok(employee)
    }

    async fn get(&self, id: EmployeeId) -> Result<Option<Employee>, StoreError> {
        let row = sqlx::query("SELECT doc FROM employees WHERE id = $1 AND is_active")
            .bind(id.as_uuid())
            .fetch_optional(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("get_employee", e))?;
        row.as_ref().map(decode).transpose()
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<Employee>, StoreError> {
        let row = sqlx::query("SELECT doc FROM employees WHERE email = $1 AND is_active")
            .bind(email.trim().to_lowercase())
            .fetch_optional(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("find_employee_by_email", e))?;
        row.as_ref().map(decode).transpose()
    }

    async fn list(&self, filter: EmployeeFilter, page: PageRequest) -> Result<Page<Employee>, StoreError> {
        let department = filter.department.map(|d| d.as_str());
        let role = filter.role.map(|r| r.as_str());
        const WHERE: &str = "is_active AND ($1::text IS NULL OR department = $1) AND ($2::text IS NULL OR role = $2)";

        let total: i64 = sqlx::query(&format!("SELECT COUNT(*) AS total FROM employees WHERE {WHERE}"))
            .bind(department)
            .bind(role)
            .fetch_one(&*self.pool)
            .await
            .and_then(|row| row.try_get("total"))
            .map_err(|e| map_sqlx_error("count_employees", e))?;

        let rows = sqlx::query(&format!(
            "SELECT doc FROM employees WHERE {WHERE} ORDER BY created_at ASC, id ASC LIMIT $3 OFFSET $4"
        ))
        .bind(department)
        .bind(role)
        .bind(page.limit() as i64)
        .bind(page.offset() as i64)
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("list_employees", e))?;

        let items = rows.iter().map(decode).collect::<Result<Vec<Employee>, _>>()?;
        Ok(Page::new(items, total.max(0) as u64, page))
    }

    async fn update(&self, mut employee: Employee) -> Result<Employee, StoreError> {
        employee.timestamps.touch();
        if self.write("update_employee", UPDATE_EMPLOYEE, &employee).await? == 0 {
            return Err(StoreError::NotFound(employee.id.to_string()));
        }
        Ok(employee)
    }

    async fn deactivate(&self, id: EmployeeId) -> Result<bool, StoreError> {
        let result = sqlx::query(DEACTIVATE_EMPLOYEE)
            .bind(id.as_uuid())
            .execute(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("deactivate_employee", e))?;
        Ok(result.rows_affected() > 0)
    }
}
