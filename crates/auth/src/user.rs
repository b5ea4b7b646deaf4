//! User account document.

use serde::{Deserialize, Serialize};

use habbot_core::{DomainError, Email, Entity, Timestamps, UserId};
use habbot_observability::{LogValue, Loggable};

use crate::guard::GuardSubject;
use crate::password::{PasswordError, hash_password, validate_password_strength};
use crate::roles::SupportedRole;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    pub name: String,
    pub email: Email,
    /// Argon2 PHC string.
    pub hashed_password: String,
    pub role: SupportedRole,
    pub is_active: bool,
    pub is_email_verified: bool,
    #[serde(flatten)]
    pub timestamps: Timestamps,
}

impl User {
    /// A new active, unverified `USER` account with a freshly hashed password.
    pub fn register(name: &str, email: &str, password: &str) -> Result<Self, DomainError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(DomainError::validation("name cannot be empty"));
        }
        let email = Email::parse(email)?;
        validate_password_strength(password).map_err(|e| DomainError::validation(e.to_string()))?;
        let hashed_password = hash_password(password).map_err(|e| match e {
            PasswordError::Hash(reason) => DomainError::validation(format!("failed to hash password: {reason}")),
            other => DomainError::validation(other.to_string()),
        })?;

        Ok(Self {
            id: UserId::new(),
            name: name.to_string(),
            email,
            hashed_password,
            role: SupportedRole::User,
            is_active: true,
            is_email_verified: false,
            timestamps: Timestamps::now(),
        })
    }

    pub fn guard_subject(&self) -> GuardSubject {
        GuardSubject {
            role: self.role,
            is_active: self.is_active,
            is_email_verified: self.is_email_verified,
        }
    }

    pub fn mark_email_verified(&mut self) {
        self.is_email_verified = true;
        self.timestamps.touch();
    }
}

impl Entity for User {
    type Id = UserId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn unique_email(&self) -> Option<&str> {
        Some(self.email.as_str())
    }

    fn timestamps(&self) -> &Timestamps {
        &self.timestamps
    }

    fn timestamps_mut(&mut self) -> &mut Timestamps {
        &mut self.timestamps
    }
}

impl Loggable for SupportedRole {
    fn to_log_value(&self) -> LogValue {
        LogValue::Enum(self.as_str().to_string())
    }
}

impl Loggable for User {
    fn to_log_value(&self) -> LogValue {
        LogValue::entity(
            "User",
            [
                ("id", self.id.as_uuid().to_log_value()),
                ("name", self.name.to_log_value()),
                ("email", self.email.as_str().to_log_value()),
                ("hashed_password", self.hashed_password.to_log_value()),
                ("role", self.role.to_log_value()),
                ("is_active", self.is_active.to_log_value()),
                ("created_at", self.timestamps.created_at.to_log_value()),
                ("updated_at", self.timestamps.updated_at.to_log_value()),
            ],
        )
    }
}
