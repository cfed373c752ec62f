use std::collections::BTreeMap;
use std::path::Path;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{header, Request};
use axum::response::Response;
use serde_json::Value;

use crate::intake::domain::{FormSubmission, InsertConfirmation, IntakeForm, StagedFile, StoredForm};
use crate::intake::multipart::MultipartSpool;
use crate::intake::repository::{FormRepository, RepositoryError};
use crate::intake::router::{intake_router, IntakeState};
use crate::intake::service::{SubmissionService, SubmissionSettings};
use crate::intake::storage::{public_object_url, ObjectStore, StorageError};

pub(super) const BOUNDARY: &str = "intake-test-boundary";

/// Bucket double that records every write attempt.
#[derive(Default)]
pub(super) struct MemoryStore {
    objects: Mutex<BTreeMap<String, Vec<u8>>>,
    attempts: Mutex<Vec<String>>,
    fail_on_key: Option<String>,
}

impl MemoryStore {
    pub(super) fn failing_on(key: &str) -> Self {
        Self {
            fail_on_key: Some(key.to_string()),
            ..Self::default()
        }
    }

    pub(super) fn keys(&self) -> Vec<String> {
        self.objects
            .lock()
            .expect("store mutex poisoned")
            .keys()
            .cloned()
            .collect()
    }

    pub(super) fn write_attempts(&self) -> Vec<String> {
        self.attempts.lock().expect("store mutex poisoned").clone()
    }
}

#[async_trait]
impl ObjectStore for MemoryStore {
    async fn put_public(
        &self,
        key: &str,
        body: Vec<u8>,
        _content_type: &str,
    ) -> Result<(), StorageError> {
        self.attempts
            .lock()
            .expect("store mutex poisoned")
            .push(key.to_string());
        if self.fail_on_key.as_deref() == Some(key) {
            return Err(StorageError::Write {
                key: key.to_string(),
                message: "access denied".to_string(),
            });
        }
        self.objects
            .lock()
            .expect("store mutex poisoned")
            .insert(key.to_string(), body);
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), StorageError> {
        self.objects
            .lock()
            .expect("store mutex poisoned")
            .remove(key);
        Ok(())
    }

    fn public_url(&self, key: &str) -> String {
        public_object_url("intake-test", "nyc3", "digitaloceanspaces.com", key)
    }
}

#[derive(Default)]
pub(super) struct MemoryFormRepository {
    forms: Mutex<Vec<IntakeForm>>,
}

impl MemoryFormRepository {
    pub(super) fn forms(&self) -> Vec<IntakeForm> {
        self.forms.lock().expect("repository mutex poisoned").clone()
    }
}

#[async_trait]
impl FormRepository for MemoryFormRepository {
    async fn insert(&self, form: IntakeForm) -> Result<InsertConfirmation, RepositoryError> {
        let mut guard = self.forms.lock().expect("repository mutex poisoned");
        guard.push(form);
        Ok(InsertConfirmation {
            acknowledged: true,
            inserted_id: format!("form-{:03}", guard.len()),
        })
    }

    async fn list_all(&self) -> Result<Vec<StoredForm>, RepositoryError> {
        let guard = self.forms.lock().expect("repository mutex poisoned");
        Ok(guard
            .iter()
            .enumerate()
            .map(|(index, form)| {
                let mut map = match serde_json::to_value(form).expect("form serializes") {
                    Value::Object(map) => map,
                    other => panic!("form serialized to {other}"),
                };
                map.insert("_id".to_string(), Value::String(format!("form-{:03}", index + 1)));
                StoredForm(map)
            })
            .collect())
    }
}

pub(super) struct UnavailableRepository;

#[async_trait]
impl FormRepository for UnavailableRepository {
    async fn insert(&self, _form: IntakeForm) -> Result<InsertConfirmation, RepositoryError> {
        Err(RepositoryError::Connection("database offline".to_string()))
    }

    async fn list_all(&self) -> Result<Vec<StoredForm>, RepositoryError> {
        Err(RepositoryError::Connection("database offline".to_string()))
    }
}

pub(super) fn build_service<R>(
    store: Arc<MemoryStore>,
    repository: Arc<R>,
    settings: SubmissionSettings,
) -> SubmissionService<MemoryStore, R>
where
    R: FormRepository + 'static,
{
    SubmissionService::new(store, repository, settings)
}

pub(super) fn stage_file(dir: &Path, key: &str, bytes: &[u8]) -> StagedFile {
    let local_path = dir.join(format!("staged-{key}"));
    std::fs::write(&local_path, bytes).expect("stage file");
    StagedFile {
        local_path,
        original_name: key.to_string(),
        size: bytes.len() as u64,
    }
}

pub(super) fn jane_doe_fields() -> BTreeMap<String, String> {
    let mut fields = BTreeMap::new();
    fields.insert("name".to_string(), "Jane Doe".to_string());
    fields.insert("dob".to_string(), "1990-01-01".to_string());
    fields
}

pub(super) fn complete_submission(dir: &Path) -> FormSubmission {
    FormSubmission {
        fields: jane_doe_fields(),
        photo_id: Some(stage_file(dir, "license.png", b"photo id bytes")),
        meds_list: Some(stage_file(dir, "meds.png", b"meds list bytes")),
    }
}

pub(super) fn router_with<R>(
    store: Arc<MemoryStore>,
    repository: Arc<R>,
    spool_dir: &Path,
    disclose_errors: bool,
) -> axum::Router
where
    R: FormRepository + 'static,
{
    let service = build_service(store, repository, SubmissionSettings::default());
    intake_router(IntakeState {
        service: Arc::new(service),
        spool: MultipartSpool::new(spool_dir),
        disclose_errors,
    })
}

pub(super) enum Part<'a> {
    Text(&'a str, &'a str),
    File(&'a str, &'a str, &'a [u8]),
}

pub(super) fn multipart_request(parts: &[Part<'_>]) -> Request<Body> {
    let mut body = Vec::new();
    for part in parts {
        body.extend_from_slice(format!("--{BOUNDARY}\r\n").as_bytes());
        match part {
            Part::Text(name, value) => {
                body.extend_from_slice(
                    format!("Content-Disposition: form-data; name=\"{name}\"\r\n\r\n{value}\r\n")
                        .as_bytes(),
                );
            }
            Part::File(name, file_name, bytes) => {
                body.extend_from_slice(
                    format!(
                        "Content-Disposition: form-data; name=\"{name}\"; filename=\"{file_name}\"\r\nContent-Type: application/octet-stream\r\n\r\n"
                    )
                    .as_bytes(),
                );
                body.extend_from_slice(bytes);
                body.extend_from_slice(b"\r\n");
            }
        }
    }
    body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());

    Request::builder()
        .method("POST")
        .uri("/")
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={BOUNDARY}"),
        )
        .body(Body::from(body))
        .expect("request builds")
}

pub(super) async fn read_json_body(response: Response) -> Value {
    let body = axum::body::to_bytes(response.into_body(), 64 * 1024)
        .await
        .expect("read body");
    serde_json::from_slice(&body).expect("json payload")
}
