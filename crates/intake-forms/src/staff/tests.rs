use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use chrono::{TimeZone, Utc};
use serde_json::Value;
use tower::ServiceExt;

use super::directory::{DirectoryError, UserDirectory};
use super::domain::{ExternalIdentity, StaffUser};
use super::google::{IdentityError, IdentityVerifier};
use super::router::{staff_auth_unavailable_router, staff_router};
use super::service::{AuthError, StaffAuthenticator};

/// Maps credential strings to identities; anything else is rejected.
#[derive(Default)]
struct FakeVerifier {
    identities: HashMap<String, ExternalIdentity>,
}

impl FakeVerifier {
    fn with(credential: &str, email: &str, verified: bool) -> Self {
        let mut identities = HashMap::new();
        identities.insert(
            credential.to_string(),
            ExternalIdentity {
                subject: format!("sub-{credential}"),
                email: email.to_string(),
                email_verified: verified,
                name: Some("Pat Nurse".to_string()),
            },
        );
        Self { identities }
    }
}

#[async_trait]
impl IdentityVerifier for FakeVerifier {
    async fn verify(&self, credential: &str) -> Result<ExternalIdentity, IdentityError> {
        self.identities
            .get(credential)
            .cloned()
            .ok_or_else(|| IdentityError::Rejected("invalid token".to_string()))
    }
}

#[derive(Default)]
struct MemoryDirectory {
    users: Mutex<Vec<StaffUser>>,
}

impl MemoryDirectory {
    fn users(&self) -> Vec<StaffUser> {
        self.users.lock().expect("directory mutex poisoned").clone()
    }
}

#[async_trait]
impl UserDirectory for MemoryDirectory {
    async fn find_by_external_id(
        &self,
        external_id: &str,
    ) -> Result<Option<StaffUser>, DirectoryError> {
        Ok(self
            .users
            .lock()
            .expect("directory mutex poisoned")
            .iter()
            .find(|user| user.external_id == external_id)
            .cloned())
    }

    async fn create(&self, user: StaffUser) -> Result<StaffUser, DirectoryError> {
        self.users
            .lock()
            .expect("directory mutex poisoned")
            .push(user.clone());
        Ok(user)
    }
}

struct OfflineDirectory;

#[async_trait]
impl UserDirectory for OfflineDirectory {
    async fn find_by_external_id(
        &self,
        _external_id: &str,
    ) -> Result<Option<StaffUser>, DirectoryError> {
        Err(DirectoryError::Unavailable("connection refused".to_string()))
    }

    async fn create(&self, _user: StaffUser) -> Result<StaffUser, DirectoryError> {
        Err(DirectoryError::Unavailable("connection refused".to_string()))
    }
}

fn authenticator<U: UserDirectory + 'static>(
    verifier: FakeVerifier,
    directory: Arc<U>,
) -> StaffAuthenticator<FakeVerifier, U> {
    StaffAuthenticator::builder()
        .verifier(Arc::new(verifier))
        .directory(directory)
        .allow(["Nurse@Clinic.org"])
        .build()
        .expect("authenticator builds")
}

fn sign_in_request(credential: &str) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/auth/google")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(
            serde_json::json!({ "credential": credential }).to_string(),
        ))
        .expect("request builds")
}

async fn read_json_body(response: axum::response::Response) -> Value {
    let body = axum::body::to_bytes(response.into_body(), 16 * 1024)
        .await
        .expect("read body");
    serde_json::from_slice(&body).expect("json payload")
}

#[test]
fn build_fails_without_user_directory() {
    let result = StaffAuthenticator::<FakeVerifier, MemoryDirectory>::builder()
        .verifier(Arc::new(FakeVerifier::default()))
        .build();
    match result {
        Err(AuthError::MissingDependency(name)) => assert_eq!(name, "user directory"),
        Err(other) => panic!("expected missing dependency, got {other:?}"),
        Ok(_) => panic!("authenticator must not build without a directory"),
    }
}

#[tokio::test]
async fn first_sign_in_creates_user_then_reuses_it() {
    let directory = Arc::new(MemoryDirectory::default());
    let auth = authenticator(
        FakeVerifier::with("good", "nurse@clinic.org", true),
        directory.clone(),
    );

    let first = auth.sign_in("good").await.expect("first sign-in");
    assert!(first.created);
    assert_eq!(first.user.external_id, "sub-good");

    let second = auth.sign_in("good").await.expect("second sign-in");
    assert!(!second.created);
    assert_eq!(directory.users().len(), 1);
}

#[tokio::test]
async fn unlisted_email_is_refused() {
    let directory = Arc::new(MemoryDirectory::default());
    let auth = authenticator(
        FakeVerifier::with("good", "visitor@example.com", true),
        directory.clone(),
    );

    match auth.sign_in("good").await {
        Err(AuthError::NotAllowed(email)) => assert_eq!(email, "visitor@example.com"),
        other => panic!("expected allow-list refusal, got {other:?}"),
    }
    assert!(directory.users().is_empty());
}

#[tokio::test]
async fn unverified_email_is_refused() {
    let auth = authenticator(
        FakeVerifier::with("good", "nurse@clinic.org", false),
        Arc::new(MemoryDirectory::default()),
    );
    assert!(matches!(
        auth.sign_in("good").await,
        Err(AuthError::UnverifiedEmail(_))
    ));
}

#[tokio::test]
async fn router_maps_outcomes_to_statuses() {
    let directory = Arc::new(MemoryDirectory::default());
    let app = staff_router(Arc::new(authenticator(
        FakeVerifier::with("good", "nurse@clinic.org", true),
        directory,
    )));

    let response = app
        .clone()
        .oneshot(sign_in_request("good"))
        .await
        .expect("router responds");
    assert_eq!(response.status(), StatusCode::OK);
    let payload = read_json_body(response).await;
    assert_eq!(payload["message"], "Authenticated");
    assert_eq!(payload["user"]["googleId"], "sub-good");
    assert_eq!(payload["user"]["email"], "nurse@clinic.org");

    let response = app
        .oneshot(sign_in_request("forged"))
        .await
        .expect("router responds");
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn directory_outage_is_an_internal_error() {
    let app = staff_router(Arc::new(authenticator(
        FakeVerifier::with("good", "nurse@clinic.org", true),
        Arc::new(OfflineDirectory),
    )));

    let response = app
        .oneshot(sign_in_request("good"))
        .await
        .expect("router responds");
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let payload = read_json_body(response).await;
    assert_eq!(
        payload["error"],
        "user directory unavailable: connection refused"
    );
}

#[tokio::test]
async fn malformed_sign_in_body_gets_the_error_envelope() {
    let app = staff_router(Arc::new(authenticator(
        FakeVerifier::with("good", "nurse@clinic.org", true),
        Arc::new(MemoryDirectory::default()),
    )));

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/auth/google")
                .body(Body::from("credential=good"))
                .expect("request builds"),
        )
        .await
        .expect("router responds");
    assert_eq!(response.status(), StatusCode::UNSUPPORTED_MEDIA_TYPE);
    let payload = read_json_body(response).await;
    assert_eq!(payload["message"], "Unsupported Media Type");

    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/auth/google")
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(r#"{"token":"good"}"#))
                .expect("request builds"),
        )
        .await
        .expect("router responds");
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    let payload = read_json_body(response).await;
    assert!(payload["error"].as_str().is_some_and(|error| error.contains("credential")));
}

#[tokio::test]
async fn unconfigured_auth_answers_service_unavailable() {
    let response = staff_auth_unavailable_router()
        .oneshot(sign_in_request("anything"))
        .await
        .expect("router responds");
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
}

#[test]
fn staff_user_serializes_with_google_id_key() {
    let user = StaffUser {
        external_id: "42".to_string(),
        email: "nurse@clinic.org".to_string(),
        name: None,
        created_at: Utc
            .with_ymd_and_hms(2025, 3, 1, 9, 30, 0)
            .single()
            .expect("valid timestamp"),
    };
    let value = serde_json::to_value(&user).expect("user serializes");
    assert_eq!(value["googleId"], "42");
    assert_eq!(value["createdAt"], "2025-03-01T09:30:00Z");
    assert!(value.get("name").is_none());
}
