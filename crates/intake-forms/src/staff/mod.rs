//! Staff sign-in through Google identity with an allow-list and a pluggable user directory.

pub mod directory;
pub mod domain;
pub mod google;
pub mod router;
pub mod service;

#[cfg(test)]
mod tests;

pub use directory::{DirectoryError, MongoUserDirectory, UserDirectory};
pub use domain::{ExternalIdentity, SignIn, StaffUser};
pub use google::{GoogleIdentityVerifier, IdentityError, IdentityVerifier};
pub use router::{staff_auth_unavailable_router, staff_router, GoogleSignInRequest};
pub use service::{AuthError, StaffAuthenticator, StaffAuthenticatorBuilder};
