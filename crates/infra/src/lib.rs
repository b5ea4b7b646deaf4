//! Infrastructure layer: document stores for users and employees.

pub mod error;
pub mod store;

pub use error::StoreError;
pub use store::{EmployeeStore, InMemoryEmployeeStore, InMemoryUserStore, UserStore};

#[cfg(feature = "postgres")]
pub use store::postgres::{PostgresEmployeeStore, PostgresUserStore, migrate};
