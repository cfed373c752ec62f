use std::sync::Arc;

use axum::{
    extract::{rejection::JsonRejection, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::post,
    Json, Router,
};
use serde::Deserialize;
use serde_json::json;
use tracing::error;

use super::directory::UserDirectory;
use super::google::{IdentityError, IdentityVerifier};
use super::service::{AuthError, StaffAuthenticator};

/// Body posted by the sign-in button: the Google ID token.
#[derive(Debug, Deserialize)]
pub struct GoogleSignInRequest {
    pub credential: String,
}

pub fn staff_router<V, U>(authenticator: Arc<StaffAuthenticator<V, U>>) -> Router
where
    V: IdentityVerifier + 'static,
    U: UserDirectory + 'static,
{
    Router::new()
        .route("/auth/google", post(sign_in_handler::<V, U>))
        .with_state(authenticator)
}

/// Mounted instead of [`staff_router`] when no Google client is configured.
pub fn staff_auth_unavailable_router() -> Router {
    Router::new().route("/auth/google", post(unavailable_handler))
}

pub(crate) async fn sign_in_handler<V, U>(
    State(authenticator): State<Arc<StaffAuthenticator<V, U>>>,
    request: Result<Json<GoogleSignInRequest>, JsonRejection>,
) -> Response
where
    V: IdentityVerifier + 'static,
    U: UserDirectory + 'static,
{
    let request = match request {
        Ok(Json(request)) => request,
        Err(rejection) => {
            let status = rejection.status();
            let payload = json!({
                "message": status.canonical_reason().unwrap_or("Bad Request"),
                "error": rejection.body_text(),
            });
            return (status, Json(payload)).into_response();
        }
    };

    match authenticator.sign_in(&request.credential).await {
        Ok(sign_in) => {
            let payload = json!({
                "message": "Authenticated",
                "user": sign_in.user,
                "created": sign_in.created,
            });
            (StatusCode::OK, Json(payload)).into_response()
        }
        Err(err) => {
            let (status, message) = match &err {
                AuthError::Identity(IdentityError::Rejected(_)) => {
                    (StatusCode::UNAUTHORIZED, "Unauthorized")
                }
                AuthError::UnverifiedEmail(_) | AuthError::NotAllowed(_) => {
                    (StatusCode::FORBIDDEN, "Forbidden")
                }
                AuthError::Identity(IdentityError::Transport(_))
                | AuthError::Directory(_)
                | AuthError::MissingDependency(_) => {
                    error!(error = %err, "staff sign-in failed");
                    (StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error")
                }
            };
            let payload = json!({
                "message": message,
                "error": err.to_string(),
            });
            (status, Json(payload)).into_response()
        }
    }
}

async fn unavailable_handler() -> Response {
    let payload = json!({
        "message": "Service Unavailable",
        "error": "staff authentication is not configured",
    });
    (StatusCode::SERVICE_UNAVAILABLE, Json(payload)).into_response()
}
