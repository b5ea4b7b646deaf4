//! Access policy for authenticated routes.
//!
//! The check runs in two steps so the caller can do the store lookup in
//! between: [`UserGuard::subject`] turns a decode result into a user id, and
//! [`UserGuard::admit`] applies the account rules to the loaded record.

use thiserror::Error;

use habbot_core::UserId;

use crate::{AccessClaims, SupportedRole, TokenError, TokenPurpose};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum GuardError {
    #[error("Not authenticated")]
    NotAuthenticated,

    #[error("Token expired")]
    TokenExpired,

    #[error("Invalid token")]
    InvalidToken,

    #[error("Missing token subject")]
    MissingSubject,

    #[error("User not found")]
    UserNotFound,

    #[error("Inactive account")]
    Inactive,

    #[error("Email not verified")]
    EmailNotVerified,

    #[error("Insufficient permissions")]
    InsufficientPermissions,
}

impl GuardError {
    /// HTTP status the failure maps to.
    pub fn status_code(&self) -> u16 {
        match self {
            GuardError::TokenExpired
            | GuardError::InvalidToken
            | GuardError::MissingSubject
            | GuardError::UserNotFound => 401,
            GuardError::NotAuthenticated
            | GuardError::Inactive
            | GuardError::EmailNotVerified
            | GuardError::InsufficientPermissions => 403,
        }
    }
}

/// The account facts the policy looks at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GuardSubject {
    pub role: SupportedRole,
    pub is_active: bool,
    pub is_email_verified: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserGuard {
    allowed_roles: Vec<SupportedRole>,
    enforce_active: bool,
    enforce_verified: bool,
}

impl Default for UserGuard {
    fn default() -> Self {
        Self {
            allowed_roles: SupportedRole::ALL.to_vec(),
            enforce_active: true,
            enforce_verified: true,
        }
    }
}

impl UserGuard {
    /// Restrict to the given roles. An empty list allows every role.
    pub fn roles(roles: impl IntoIterator<Item = SupportedRole>) -> Self {
        Self {
            allowed_roles: roles.into_iter().collect(),
            ..Self::default()
        }
    }

    pub fn allow_inactive(mut self) -> Self {
        self.enforce_active = false;
        self
    }

    pub fn allow_unverified(mut self) -> Self {
        self.enforce_verified = false;
        self
    }

    /// Resolve the token subject. `None` means no bearer credentials were sent.
    pub fn subject(
        &self,
        decoded: Option<Result<AccessClaims, TokenError>>,
    ) -> Result<UserId, GuardError> {
        let claims = match decoded {
            None => return Err(GuardError::NotAuthenticated),
            Some(Err(TokenError::Expired)) => return Err(GuardError::TokenExpired),
            Some(Err(_)) => return Err(GuardError::InvalidToken),
            Some(Ok(claims)) => claims,
        };
        if claims.effective_purpose() != TokenPurpose::Access {
            return Err(GuardError::InvalidToken);
        }
        claims.user_id.ok_or(GuardError::MissingSubject)
    }

    /// Apply the account rules to the loaded user (`None` if the lookup missed).
    pub fn admit(&self, subject: Option<GuardSubject>) -> Result<GuardSubject, GuardError> {
        let subject = subject.ok_or(GuardError::UserNotFound)?;

        if self.enforce_active && !subject.is_active {
            return Err(GuardError::Inactive);
        }
        if self.enforce_verified && !subject.is_email_verified && subject.role != SupportedRole::Admin {
            return Err(GuardError::EmailNotVerified);
        }
        if !self.allowed_roles.is_empty() && !self.allowed_roles.contains(&subject.role) {
            return Err(GuardError::InsufficientPermissions);
        }
        Ok(subject)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn subject(role: SupportedRole, active: bool, verified: bool) -> GuardSubject {
        GuardSubject {
            role,
            is_active: active,
            is_email_verified: verified,
        }
    }

    fn access_claims(user_id: Option<UserId>) -> AccessClaims {
        AccessClaims {
            user_id,
            email: None,
            role: None,
            is_email_verified: false,
            purpose: None,
            iat: 0,
            exp: 0,
        }
    }

    #[test]
    fn maps_token_failures() {
        let guard = UserGuard::default();
        assert_eq!(guard.subject(None), Err(GuardError::NotAuthenticated));
        assert_eq!(guard.subject(Some(Err(TokenError::Expired))), Err(GuardError::TokenExpired));
        assert_eq!(
            guard.subject(Some(Err(TokenError::Invalid("bad".into())))),
            Err(GuardError::InvalidToken)
        );
        assert_eq!(guard.subject(Some(Ok(access_claims(None)))), Err(GuardError::MissingSubject));
    }

    #[test]
    fn single_purpose_tokens_cannot_authenticate() {
        let mut claims = access_claims(Some(UserId::new()));
        claims.purpose = Some(TokenPurpose::EmailVerification);
        assert_eq!(UserGuard::default().subject(Some(Ok(claims))), Err(GuardError::InvalidToken));
    }

    #[test]
    fn account_rules_apply_in_order() {
        let guard = UserGuard::default();
        assert_eq!(guard.admit(None), Err(GuardError::UserNotFound));
        assert_eq!(
            guard.admit(Some(subject(SupportedRole::User, false, false))),
            Err(GuardError::Inactive)
        );
        assert_eq!(
            guard.admit(Some(subject(SupportedRole::User, true, false))),
            Err(GuardError::EmailNotVerified)
        );
        assert!(guard.admit(Some(subject(SupportedRole::User, true, true))).is_ok());
    }

    #[test]
    fn admins_skip_the_verification_rule() {
        let guard = UserGuard::default();
        assert!(guard.admit(Some(subject(SupportedRole::Admin, true, false))).is_ok());
    }

    #[test]
    fn role_restriction_and_relaxations() {
        let admin_only = UserGuard::roles([SupportedRole::Admin]);
        assert_eq!(
            admin_only.admit(Some(subject(SupportedRole::User, true, true))),
            Err(GuardError::InsufficientPermissions)
        );

        let relaxed = UserGuard::default().allow_inactive().allow_unverified();
        assert!(relaxed.admit(Some(subject(SupportedRole::User, false, false))).is_ok());
        assert_eq!(GuardError::Inactive.status_code(), 403);
        assert_eq!(GuardError::UserNotFound.status_code(), 401);
    }
}
