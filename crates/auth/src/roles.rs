use serde::{Deserialize, Serialize};

/// Account role stored on the user record and embedded in tokens.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "UPPERCASE")]
pub enum SupportedRole {
    Admin,
    #[default]
    User,
}

impl SupportedRole {
    pub const ALL: [SupportedRole; 2] = [SupportedRole::Admin, SupportedRole::User];

    pub fn as_str(&self) -> &'static str {
        match self {
            SupportedRole::Admin => "ADMIN",
            SupportedRole::User => "USER",
        }
    }
}

impl core::fmt::Display for SupportedRole {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}
