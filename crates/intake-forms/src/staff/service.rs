use std::collections::BTreeSet;
use std::sync::Arc;

use chrono::Utc;
use tracing::{info, warn};

use super::directory::{DirectoryError, UserDirectory};
use super::domain::{SignIn, StaffUser};
use super::google::{IdentityError, IdentityVerifier};

#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("staff authenticator built without a {0}")]
    MissingDependency(&'static str),
    #[error(transparent)]
    Identity(#[from] IdentityError),
    #[error("email address '{0}' is not verified")]
    UnverifiedEmail(String),
    #[error("'{0}' is not on the staff allow-list")]
    NotAllowed(String),
    #[error(transparent)]
    Directory(#[from] DirectoryError),
}

/// Signs staff in: verify the provider credential, enforce the allow-list, then find or
/// create the matching directory entry.
pub struct StaffAuthenticator<V, U> {
    verifier: Arc<V>,
    directory: Arc<U>,
    allowed_emails: BTreeSet<String>,
}

impl<V, U> StaffAuthenticator<V, U>
where
    V: IdentityVerifier + 'static,
    U: UserDirectory + 'static,
{
    pub fn builder() -> StaffAuthenticatorBuilder<V, U> {
        StaffAuthenticatorBuilder {
            verifier: None,
            directory: None,
            allowed_emails: BTreeSet::new(),
        }
    }

    pub fn is_allowed(&self, email: &str) -> bool {
        self.allowed_emails.contains(&email.trim().to_ascii_lowercase())
    }

    pub async fn sign_in(&self, credential: &str) -> Result<SignIn, AuthError> {
        let identity = self.verifier.verify(credential).await?;

        if !identity.email_verified {
            return Err(AuthError::UnverifiedEmail(identity.email));
        }
        if !self.is_allowed(&identity.email) {
            warn!(email = %identity.email, "staff sign-in refused");
            return Err(AuthError::NotAllowed(identity.email));
        }

        if let Some(user) = self.directory.find_by_external_id(&identity.subject).await? {
            info!(email = %user.email, "staff signed in");
            return Ok(SignIn {
                user,
                created: false,
            });
        }

        let user = self
            .directory
            .create(StaffUser::from_identity(&identity, Utc::now()))
            .await?;
        info!(email = %user.email, "staff account created");
        Ok(SignIn {
            user,
            created: true,
        })
    }
}

/// Collects the authenticator's dependencies; `build` fails if one is absent.
pub struct StaffAuthenticatorBuilder<V, U> {
    verifier: Option<Arc<V>>,
    directory: Option<Arc<U>>,
    allowed_emails: BTreeSet<String>,
}

impl<V, U> StaffAuthenticatorBuilder<V, U>
where
    V: IdentityVerifier + 'static,
    U: UserDirectory + 'static,
{
    pub fn verifier(mut self, verifier: Arc<V>) -> Self {
        self.verifier = Some(verifier);
        self
    }

    pub fn directory(mut self, directory: Arc<U>) -> Self {
        self.directory = Some(directory);
        self
    }

    pub fn allow<I, E>(mut self, emails: I) -> Self
    where
        I: IntoIterator<Item = E>,
        E: AsRef<str>,
    {
        self.allowed_emails.extend(
            emails
                .into_iter()
                .map(|email| email.as_ref().trim().to_ascii_lowercase()),
        );
        self
    }

    pub fn build(self) -> Result<StaffAuthenticator<V, U>, AuthError> {
        let verifier = self
            .verifier
            .ok_or(AuthError::MissingDependency("identity verifier"))?;
        let directory = self
            .directory
            .ok_or(AuthError::MissingDependency("user directory"))?;

        Ok(StaffAuthenticator {
            verifier,
            directory,
            allowed_emails: self.allowed_emails,
        })
    }
}
