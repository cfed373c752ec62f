use axum::Router;
use intake_forms::config::AppConfig;
use intake_forms::error::AppError;
use intake_forms::intake::{
    FormRepository, IntakeState, MongoFormRepository, MultipartSpool, S3ObjectStore,
    SubmissionService, SubmissionSettings,
};
use intake_forms::staff::{
    staff_auth_unavailable_router, staff_router, GoogleIdentityVerifier, MongoUserDirectory,
    StaffAuthenticator,
};
use metrics_exporter_prometheus::PrometheusHandle;
use serde_json::Value;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use tracing::{info, warn};

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) readiness: Arc<AtomicBool>,
    pub(crate) metrics: Arc<PrometheusHandle>,
}

pub(crate) type LiveIntakeState = IntakeState<S3ObjectStore, MongoFormRepository>;

pub(crate) fn submission_settings(config: &AppConfig) -> SubmissionSettings {
    SubmissionSettings {
        dob_policy: config.intake.dob_policy,
        orphan_policy: config.intake.orphan_policy,
    }
}

/// Wires the bucket and the forms collection behind the submission service.
pub(crate) fn intake_state(config: &AppConfig) -> Result<LiveIntakeState, AppError> {
    let store = S3ObjectStore::from_config(&config.storage)?;
    let repository = MongoFormRepository::from_config(&config.database)?;
    info!(
        bucket = store.bucket(),
        spool = %config.intake.upload_dir.display(),
        "intake storage configured"
    );

    let service = SubmissionService::new(
        Arc::new(store),
        Arc::new(repository),
        submission_settings(config),
    );
    Ok(IntakeState {
        service: Arc::new(service),
        spool: MultipartSpool::new(config.intake.upload_dir.clone()),
        disclose_errors: config.environment.discloses_errors(),
    })
}

pub(crate) fn staff_routes(config: &AppConfig) -> Result<Router, AppError> {
    let Some(auth) = config.staff_auth.as_ref() else {
        warn!("GOOGLE_CLIENT_ID not set; staff sign-in disabled");
        return Ok(staff_auth_unavailable_router());
    };
    if auth.allowed_emails.is_empty() {
        warn!("STAFF_ALLOWED_EMAILS is empty; every staff sign-in will be refused");
    }

    let authenticator = StaffAuthenticator::builder()
        .verifier(Arc::new(GoogleIdentityVerifier::new(auth.client_id.clone())))
        .directory(Arc::new(MongoUserDirectory::from_config(&config.database)?))
        .allow(&auth.allowed_emails)
        .build()?;
    Ok(staff_router(Arc::new(authenticator)))
}

/// Every stored form rendered as a compact JSON line.
pub(crate) async fn list_stored_forms() -> Result<Vec<String>, AppError> {
    let config = AppConfig::load()?;
    let repository = MongoFormRepository::from_config(&config.database)?;
    render_forms(&repository).await
}

pub(crate) async fn render_forms<R: FormRepository>(repository: &R) -> Result<Vec<String>, AppError> {
    let forms = repository.list_all().await?;
    Ok(forms
        .into_iter()
        .map(|form| Value::Object(form.0).to_string())
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use intake_forms::intake::{InsertConfirmation, IntakeForm, RepositoryError, StoredForm};
    use serde_json::{json, Map};

    struct FixedRepository(Vec<StoredForm>);

    #[async_trait::async_trait]
    impl FormRepository for FixedRepository {
        async fn insert(&self, _form: IntakeForm) -> Result<InsertConfirmation, RepositoryError> {
            Err(RepositoryError::InsertFailed("read only".to_string()))
        }

        async fn list_all(&self) -> Result<Vec<StoredForm>, RepositoryError> {
            Ok(self.0.clone())
        }
    }

    fn stored(name: &str) -> StoredForm {
        let mut map = Map::new();
        map.insert("_id".to_string(), json!("65f0"));
        map.insert("name".to_string(), json!(name));
        StoredForm(map)
    }

    #[tokio::test]
    async fn render_forms_emits_one_line_per_document() {
        let repository = FixedRepository(vec![stored("Jane Doe"), stored("John Roe")]);
        let lines = render_forms(&repository).await.expect("forms render");
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0], r#"{"_id":"65f0","name":"Jane Doe"}"#);
        assert!(lines.iter().all(|line| !line.contains('\n')));
    }
}
