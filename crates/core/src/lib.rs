//! `habbot-core`: domain building blocks shared by every crate.
//!
//! Pure types only: identifiers, the domain error model, pagination and the
//! entity contract used by the document stores.

pub mod email;
pub mod entity;
pub mod error;
pub mod id;
pub mod page;

pub use email::Email;
pub use entity::{Entity, Timestamps};
pub use error::{DomainError, DomainResult};
pub use id::{EmployeeId, UserId};
pub use page::{Page, PageRequest};
