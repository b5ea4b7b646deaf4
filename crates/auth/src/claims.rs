use serde::{Deserialize, Serialize};

use habbot_core::UserId;

use crate::SupportedRole;

/// What a token may be used for.
///
/// Access and refresh tokens authenticate requests; the remaining purposes
/// are single-use links delivered out of band.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenPurpose {
    Access,
    Refresh,
    EmailVerification,
    ForgetPassword,
}

/// JWT claims model.
///
/// `iat`/`exp` are unix seconds so `jsonwebtoken` can enforce expiry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessClaims {
    /// Subject. Optional on decode so a token without one is reported as
    /// "missing subject" rather than "invalid".
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<UserId>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<SupportedRole>,

    #[serde(default)]
    pub is_email_verified: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub purpose: Option<TokenPurpose>,

    pub iat: i64,
    pub exp: i64,
}

impl AccessClaims {
    /// Claims for a user, without timestamps (the issuer stamps them).
    pub fn for_user(
        user_id: UserId,
        email: impl Into<String>,
        role: SupportedRole,
        is_email_verified: bool,
        purpose: TokenPurpose,
    ) -> Self {
        Self {
            user_id: Some(user_id),
            email: Some(email.into()),
            role: Some(role),
            is_email_verified,
            purpose: Some(purpose),
            iat: 0,
            exp: 0,
        }
    }

    /// Tokens minted before purposes existed count as access tokens.
    pub fn effective_purpose(&self) -> TokenPurpose {
        self.purpose.unwrap_or(TokenPurpose::Access)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_purpose_defaults_to_access() {
        let claims: AccessClaims =
            serde_json::from_value(serde_json::json!({ "iat": 1, "exp": 2 })).unwrap();
        assert_eq!(claims.effective_purpose(), TokenPurpose::Access);
        assert!(claims.user_id.is_none());
    }

    #[test]
    fn purpose_uses_snake_case_on_the_wire() {
        let v = serde_json::to_value(TokenPurpose::EmailVerification).unwrap();
        assert_eq!(v, "email_verification");
    }
}
