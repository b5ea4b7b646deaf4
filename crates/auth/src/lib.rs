//! `habbot-auth`: token, password and access-policy primitives.
//!
//! Decoupled from HTTP and storage: the API layer feeds it raw tokens and
//! loaded user records and maps the typed errors to responses.

pub mod claims;
pub mod guard;
pub mod jwt;
pub mod password;
pub mod roles;
pub mod user;

pub use claims::{AccessClaims, TokenPurpose};
pub use guard::{GuardError, GuardSubject, UserGuard};
pub use jwt::{Hs256Jwt, IssuedToken, JwtValidator, TokenError};
pub use password::{PasswordError, hash_password, validate_password_strength, verify_password};
pub use roles::SupportedRole;
pub use user::User;
