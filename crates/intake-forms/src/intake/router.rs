use std::fmt::Display;
use std::sync::Arc;

use axum::{
    extract::{multipart::MultipartRejection, Multipart, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde_json::json;
use tracing::error;

use super::multipart::MultipartSpool;
use super::repository::FormRepository;
use super::service::SubmissionService;
use super::storage::ObjectStore;

pub const SUBMITTED_MESSAGE: &str = "Form successfully submitted";
const REDACTED_ERROR: &str = "the request could not be completed";

/// Handler state shared by the intake routes.
pub struct IntakeState<S, R> {
    pub service: Arc<SubmissionService<S, R>>,
    pub spool: MultipartSpool,
    /// Include upstream error messages in 5xx bodies.
    pub disclose_errors: bool,
}

impl<S, R> Clone for IntakeState<S, R> {
    fn clone(&self) -> Self {
        Self {
            service: self.service.clone(),
            spool: self.spool.clone(),
            disclose_errors: self.disclose_errors,
        }
    }
}

/// Router builder exposing form submission (`POST /`) and listing (`GET /data`).
pub fn intake_router<S, R>(state: IntakeState<S, R>) -> Router
where
    S: ObjectStore + 'static,
    R: FormRepository + 'static,
{
    Router::new()
        .route("/", post(submit_handler::<S, R>))
        .route("/data", get(list_handler::<S, R>))
        .with_state(state)
}

pub(crate) async fn submit_handler<S, R>(
    State(state): State<IntakeState<S, R>>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Response
where
    S: ObjectStore + 'static,
    R: FormRepository + 'static,
{
    let multipart = match multipart {
        Ok(multipart) => multipart,
        Err(rejection) => {
            return error_response(rejection.status(), &rejection, state.disclose_errors);
        }
    };

    let submission = match state.spool.stage(multipart).await {
        Ok(submission) => submission,
        Err(err) => return error_response(err.status(), &err, state.disclose_errors),
    };

    match state.service.submit(submission).await {
        Ok(result) => {
            let payload = json!({
                "message": SUBMITTED_MESSAGE,
                "result": result,
            });
            (StatusCode::OK, Json(payload)).into_response()
        }
        Err(err) => error_response(err.status(), &err, state.disclose_errors),
    }
}

pub(crate) async fn list_handler<S, R>(State(state): State<IntakeState<S, R>>) -> Response
where
    S: ObjectStore + 'static,
    R: FormRepository + 'static,
{
    match state.service.list().await {
        Ok(forms) => (StatusCode::OK, Json(forms)).into_response(),
        Err(err) => error_response(err.status(), &err, state.disclose_errors),
    }
}

/// `{message, error}` envelope. Client errors echo the cause; anything else becomes a 500
/// whose detail is only shown when `disclose` is set.
pub fn error_response(status: StatusCode, err: &dyn Display, disclose: bool) -> Response {
    if status.is_client_error() {
        let payload = json!({
            "message": status.canonical_reason().unwrap_or("Bad Request"),
            "error": err.to_string(),
        });
        return (status, Json(payload)).into_response();
    }

    error!(error = %err, "request failed");
    let detail = if disclose {
        err.to_string()
    } else {
        REDACTED_ERROR.to_string()
    };
    let payload = json!({
        "message": "Internal Server Error",
        "error": detail,
    });
    (StatusCode::INTERNAL_SERVER_ERROR, Json(payload)).into_response()
}
