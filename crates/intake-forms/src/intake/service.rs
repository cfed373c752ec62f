use std::path::PathBuf;
use std::sync::Arc;

use axum::http::StatusCode;
use tracing::{debug, error, info, warn};

use crate::config::{DobPolicy, OrphanPolicy};

use super::builder::{FormDocumentBuilder, InvalidDateOfBirth};
use super::domain::{AttachmentSlot, FormSubmission, InsertConfirmation, StoredForm};
use super::repository::{FormRepository, RepositoryError};
use super::storage::ObjectStore;
use super::uploader::{AssetUploader, UploadError, UploadedAsset};

/// Progress of a single submission through the write path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmissionStage {
    Received,
    UploadingPhotoId,
    UploadingMedsList,
    Building,
    Inserting,
    Done,
    Failed,
}

impl SubmissionStage {
    const fn uploading(slot: AttachmentSlot) -> Self {
        match slot {
            AttachmentSlot::PhotoId => Self::UploadingPhotoId,
            AttachmentSlot::MedsList => Self::UploadingMedsList,
        }
    }

    pub const fn label(self) -> &'static str {
        match self {
            Self::Received => "received",
            Self::UploadingPhotoId => "uploading_photo_id",
            Self::UploadingMedsList => "uploading_meds_list",
            Self::Building => "building",
            Self::Inserting => "inserting",
            Self::Done => "done",
            Self::Failed => "failed",
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SubmissionSettings {
    pub dob_policy: DobPolicy,
    pub orphan_policy: OrphanPolicy,
}

/// Error raised by the submission service.
#[derive(Debug, thiserror::Error)]
pub enum SubmissionError {
    #[error("missing required file '{field}'")]
    MissingAttachment { field: &'static str },
    #[error(transparent)]
    InvalidDateOfBirth(#[from] InvalidDateOfBirth),
    #[error("failed to upload '{field}': {source}")]
    Upload {
        field: &'static str,
        source: UploadError,
        orphaned: Vec<String>,
    },
    #[error("{source}")]
    Insert {
        source: RepositoryError,
        orphaned: Vec<String>,
    },
    #[error(transparent)]
    Listing(RepositoryError),
}

impl SubmissionError {
    /// Errors caused by the request itself rather than an upstream dependency.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            Self::MissingAttachment { .. } | Self::InvalidDateOfBirth(_)
        )
    }

    pub fn status(&self) -> StatusCode {
        if self.is_client_error() {
            StatusCode::BAD_REQUEST
        } else {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }

    /// Object keys written to the bucket that no stored document references.
    pub fn orphaned_keys(&self) -> &[String] {
        match self {
            Self::Upload { orphaned, .. } | Self::Insert { orphaned, .. } => orphaned,
            _ => &[],
        }
    }
}

/// Side effects performed so far for one submission.
struct SubmissionSaga {
    stage: SubmissionStage,
    uploaded: Vec<(AttachmentSlot, UploadedAsset)>,
}

impl SubmissionSaga {
    fn new() -> Self {
        Self {
            stage: SubmissionStage::Received,
            uploaded: Vec::new(),
        }
    }

    fn advance(&mut self, stage: SubmissionStage) {
        debug!(from = self.stage.label(), to = stage.label(), "submission stage");
        self.stage = stage;
    }

    fn uploaded_url(&self, slot: AttachmentSlot) -> &str {
        self.uploaded
            .iter()
            .find(|(uploaded, _)| *uploaded == slot)
            .map(|(_, asset)| asset.url.as_str())
            .unwrap_or_default()
    }
}

/// Drives the write path: upload both attachments in order, build the document, insert it.
pub struct SubmissionService<S, R> {
    store: Arc<S>,
    uploader: AssetUploader<S>,
    builder: FormDocumentBuilder,
    repository: Arc<R>,
    orphan_policy: OrphanPolicy,
}

impl<S, R> SubmissionService<S, R>
where
    S: ObjectStore + 'static,
    R: FormRepository + 'static,
{
    pub fn new(store: Arc<S>, repository: Arc<R>, settings: SubmissionSettings) -> Self {
        Self {
            uploader: AssetUploader::new(store.clone()),
            store,
            builder: FormDocumentBuilder::new(settings.dob_policy),
            repository,
            orphan_policy: settings.orphan_policy,
        }
    }

    /// Run one submission to completion. The first failing step ends it; nothing is retried.
    pub async fn submit(
        &self,
        submission: FormSubmission,
    ) -> Result<InsertConfirmation, SubmissionError> {
        let FormSubmission {
            fields,
            photo_id,
            meds_list,
        } = submission;

        let (photo_id, meds_list) = match (photo_id, meds_list) {
            (Some(photo_id), Some(meds_list)) => (photo_id, meds_list),
            (photo_id, meds_list) => {
                let field = if photo_id.is_none() {
                    AttachmentSlot::PhotoId.field_name()
                } else {
                    AttachmentSlot::MedsList.field_name()
                };
                let paths = photo_id
                    .into_iter()
                    .chain(meds_list)
                    .map(|file| file.local_path)
                    .collect();
                discard_staged(paths).await;
                return Err(SubmissionError::MissingAttachment { field });
            }
        };

        if let Err(err) = self.builder.validate(&fields) {
            discard_staged(vec![photo_id.local_path, meds_list.local_path]).await;
            return Err(err.into());
        }

        let mut saga = SubmissionSaga::new();
        let mut pending = vec![
            (AttachmentSlot::PhotoId, photo_id),
            (AttachmentSlot::MedsList, meds_list),
        ]
        .into_iter();
        while let Some((slot, staged)) = pending.next() {
            saga.advance(SubmissionStage::uploading(slot));
            match self
                .uploader
                .upload(&staged.local_path, &staged.original_name)
                .await
            {
                Ok(asset) => saga.uploaded.push((slot, asset)),
                Err(source) => {
                    // The failed file keeps its spool copy; files never handed over are dropped.
                    discard_staged(pending.map(|(_, file)| file.local_path).collect()).await;
                    let orphaned = self.fail(&mut saga).await;
                    return Err(SubmissionError::Upload {
                        field: slot.field_name(),
                        source,
                        orphaned,
                    });
                }
            }
        }

        saga.advance(SubmissionStage::Building);
        let form = self.builder.build(
            &fields,
            saga.uploaded_url(AttachmentSlot::PhotoId),
            saga.uploaded_url(AttachmentSlot::MedsList),
        );

        saga.advance(SubmissionStage::Inserting);
        match self.repository.insert(form).await {
            Ok(confirmation) => {
                saga.advance(SubmissionStage::Done);
                info!(inserted_id = %confirmation.inserted_id, "intake form stored");
                Ok(confirmation)
            }
            Err(source) => {
                let orphaned = self.fail(&mut saga).await;
                Err(SubmissionError::Insert { source, orphaned })
            }
        }
    }

    pub async fn list(&self) -> Result<Vec<StoredForm>, SubmissionError> {
        self.repository
            .list_all()
            .await
            .map_err(SubmissionError::Listing)
    }

    /// Logs every object the failed submission leaves behind and, under the cleanup policy,
    /// deletes them. Returns the keys still present in the bucket.
    async fn fail(&self, saga: &mut SubmissionSaga) -> Vec<String> {
        let failed_at = saga.stage;
        saga.advance(SubmissionStage::Failed);

        let mut orphaned = Vec::new();
        for (_, asset) in saga.uploaded.drain(..) {
            warn!(
                orphaned_key = %asset.key,
                url = %asset.url,
                stage = failed_at.label(),
                "submission failed after upload; object has no referencing document"
            );

            if self.orphan_policy == OrphanPolicy::Cleanup {
                match self.store.delete(&asset.key).await {
                    Ok(()) => {
                        info!(key = %asset.key, "orphaned object removed");
                        continue;
                    }
                    Err(err) => error!(key = %asset.key, error = %err, "orphan cleanup failed"),
                }
            }
            orphaned.push(asset.key);
        }
        orphaned
    }
}

/// Best-effort removal of spooled files for a submission that never reached the uploader.
pub(crate) async fn discard_staged(paths: Vec<PathBuf>) {
    for path in paths {
        if let Err(err) = tokio::fs::remove_file(&path).await {
            debug!(path = %path.display(), error = %err, "staged file not removed");
        }
    }
}
