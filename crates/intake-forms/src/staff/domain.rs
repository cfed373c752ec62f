use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Identity asserted by the external provider after a credential checks out.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExternalIdentity {
    /// Provider-scoped subject identifier (Google `sub`).
    pub subject: String,
    pub email: String,
    pub email_verified: bool,
    pub name: Option<String>,
}

/// Staff account as kept in the user directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StaffUser {
    #[serde(rename = "googleId")]
    pub external_id: String,
    pub email: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl StaffUser {
    pub fn from_identity(identity: &ExternalIdentity, created_at: DateTime<Utc>) -> Self {
        Self {
            external_id: identity.subject.clone(),
            email: identity.email.clone(),
            name: identity.name.clone(),
            created_at,
        }
    }
}

/// Outcome of a successful sign-in.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SignIn {
    pub user: StaffUser,
    /// True when this sign-in created the directory entry.
    pub created: bool,
}
