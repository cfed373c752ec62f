use async_trait::async_trait;
use serde::Deserialize;
use tracing::debug;

use super::domain::ExternalIdentity;

pub const GOOGLE_TOKENINFO_ENDPOINT: &str = "https://oauth2.googleapis.com/tokeninfo";

/// Checks a credential issued by the identity provider.
#[async_trait]
pub trait IdentityVerifier: Send + Sync {
    async fn verify(&self, credential: &str) -> Result<ExternalIdentity, IdentityError>;
}

#[derive(Debug, thiserror::Error)]
pub enum IdentityError {
    #[error("credential rejected: {0}")]
    Rejected(String),
    #[error("identity provider unreachable: {0}")]
    Transport(String),
}

/// Verifies Google ID tokens against the tokeninfo endpoint.
#[derive(Debug, Clone)]
pub struct GoogleIdentityVerifier {
    http: reqwest::Client,
    client_id: String,
    endpoint: String,
}

impl GoogleIdentityVerifier {
    pub fn new(client_id: impl Into<String>) -> Self {
        Self::with_endpoint(client_id, GOOGLE_TOKENINFO_ENDPOINT)
    }

    pub fn with_endpoint(client_id: impl Into<String>, endpoint: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            client_id: client_id.into(),
            endpoint: endpoint.into(),
        }
    }
}

/// Subset of the tokeninfo payload. Google encodes booleans as strings here.
#[derive(Debug, Deserialize)]
pub(crate) struct TokenInfo {
    aud: String,
    sub: String,
    #[serde(default)]
    email: Option<String>,
    #[serde(default)]
    email_verified: Option<FlexibleBool>,
    #[serde(default)]
    name: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum FlexibleBool {
    Bool(bool),
    Text(String),
}

impl FlexibleBool {
    fn value(&self) -> bool {
        match self {
            Self::Bool(value) => *value,
            Self::Text(text) => text.eq_ignore_ascii_case("true"),
        }
    }
}

impl TokenInfo {
    pub(crate) fn into_identity(self, client_id: &str) -> Result<ExternalIdentity, IdentityError> {
        if self.aud != client_id {
            return Err(IdentityError::Rejected(
                "token was issued for a different client".to_string(),
            ));
        }
        let email = self
            .email
            .ok_or_else(|| IdentityError::Rejected("token carries no email".to_string()))?;

        Ok(ExternalIdentity {
            subject: self.sub,
            email,
            email_verified: self.email_verified.as_ref().is_some_and(FlexibleBool::value),
            name: self.name,
        })
    }
}

#[async_trait]
impl IdentityVerifier for GoogleIdentityVerifier {
    async fn verify(&self, credential: &str) -> Result<ExternalIdentity, IdentityError> {
        let response = self
            .http
            .get(&self.endpoint)
            .query(&[("id_token", credential)])
            .send()
            .await
            .map_err(|err| IdentityError::Transport(err.to_string()))?;

        let status = response.status();
        if status.is_client_error() {
            debug!(%status, "tokeninfo refused credential");
            return Err(IdentityError::Rejected(format!(
                "identity provider answered {status}"
            )));
        }
        if !status.is_success() {
            return Err(IdentityError::Transport(format!(
                "identity provider answered {status}"
            )));
        }

        let info: TokenInfo = response
            .json()
            .await
            .map_err(|err| IdentityError::Transport(err.to_string()))?;
        info.into_identity(&self.client_id)
    }
}
