//! Store contracts used by the service layer.
//!
//! Email uniqueness is the store's job: inserts and updates fail with
//! [`StoreError::Duplicate`] when another live document holds the email,
//! whatever the caller checked beforehand.

mod memory;
#[cfg(feature = "postgres")]
pub mod postgres;

pub use memory::{InMemoryDocuments, InMemoryEmployeeStore, InMemoryUserStore};

use std::sync::Arc;

use habbot_auth::User;
use habbot_core::{EmployeeId, Page, PageRequest, UserId};
use habbot_employees::{Employee, EmployeeFilter};

use crate::error::StoreError;

#[async_trait::async_trait]
pub trait UserStore: Send + Sync {
    async fn insert(&self, user: User) -> Result<User, StoreError>;

    async fn get(&self, id: UserId) -> Result<Option<User>, StoreError>;

    /// `email` is compared in its normalized (lowercase) form.
    async fn find_by_email(&self, email: &str) -> Result<Option<User>, StoreError>;

    /// Replace an existing user. `NotFound` if it was never inserted.
    async fn update(&self, user: User) -> Result<User, StoreError>;
}

#[async_trait::async_trait]
pub trait EmployeeStore: Send + Sync {
    async fn insert(&self, employee: Employee) -> Result<Employee, StoreError>;

    /// Active employees only.
    async fn get(&self, id: EmployeeId) -> Result<Option<Employee>, StoreError>;

    /// Active employees only.
    async fn find_by_email(&self, email: &str) -> Result<Option<Employee>, StoreError>;

    /// Active employees matching `filter`, oldest first.
    async fn list(&self, filter: EmployeeFilter, page: PageRequest) -> Result<Page<Employee>, StoreError>;

    async fn update(&self, employee: Employee) -> Result<Employee, StoreError>;

    /// Soft delete. `false` when there was no active employee to delete.
    async fn deactivate(&self, id: EmployeeId) -> Result<bool, StoreError>;
}

#[async_trait::async_trait]
impl<S: UserStore + ?Sized> UserStore for Arc<S> {
    async fn insert(&self, user: User) -> Result<User, StoreError> {
        (**self).insert(user).await
    }

    async fn get(&self, id: UserId) -> Result<Option<User>, StoreError> {
        (**self).get(id).await
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<User>, StoreError> {
        (**self).find_by_email(email).await
    }

    async fn update(&self, user: User) -> Result<User, StoreError> {
        (**self).update(user).await
    }
}

#[async_trait::async_trait]
impl<S: EmployeeStore + ?Sized> EmployeeStore for Arc<S> {
    async fn insert(&self, employee: Employee) -> Result<Employee, StoreError> {
        (**self).insert(employee).await
    }

    async fn get(&self, id: EmployeeId) -> Result<Option<Employee>, StoreError> {
        (**self).get(id).await
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<Employee>, StoreError> {
        (**self).find_by_email(email).await
    }

    async fn list(&self, filter: EmployeeFilter, page: PageRequest) -> Result<Page<Employee>, StoreError> {
        (**self).list(filter, page).await
    }

    async fn update(&self, employee: Employee) -> Result<Employee, StoreError> {
        (**self).update(employee).await
    }

    async fn deactivate(&self, id: EmployeeId) -> Result<bool, StoreError> {
        (**self).deactivate(id).await
    }
}
