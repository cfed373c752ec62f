use std::path::{Path, PathBuf};

use axum::extract::multipart::{Field, Multipart, MultipartError as BodyError};
use axum::http::StatusCode;
use tokio::io::AsyncWriteExt;
use tracing::debug;
use uuid::Uuid;

use super::domain::{AttachmentSlot, FormSubmission, StagedFile};
use super::service::discard_staged;

#[derive(Debug, thiserror::Error)]
pub enum MultipartError {
    #[error("malformed multipart body: {0}")]
    Malformed(String),
    #[error("upload exceeds the request size limit: {0}")]
    TooLarge(String),
    #[error("'{field}' accepts a single file")]
    DuplicateAttachment { field: &'static str },
    #[error("unable to stage upload: {0}")]
    Io(#[from] std::io::Error),
}

impl MultipartError {
    pub fn is_client_error(&self) -> bool {
        !matches!(self, Self::Io(_))
    }

    pub fn status(&self) -> StatusCode {
        match self {
            Self::Malformed(_) | Self::DuplicateAttachment { .. } => StatusCode::BAD_REQUEST,
            Self::TooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
            Self::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<BodyError> for MultipartError {
    fn from(err: BodyError) -> Self {
        if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
            Self::TooLarge(err.body_text())
        } else {
            Self::Malformed(err.body_text())
        }
    }
}

/// Spools file parts to a local directory and collects text parts as raw fields.
#[derive(Debug, Clone)]
pub struct MultipartSpool {
    dir: PathBuf,
}

impl MultipartSpool {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Staged files are removed again if the body turns out to be unusable.
    pub async fn stage(&self, mut multipart: Multipart) -> Result<FormSubmission, MultipartError> {
        tokio::fs::create_dir_all(&self.dir).await?;

        let mut submission = FormSubmission::default();
        if let Err(err) = self.collect(&mut multipart, &mut submission).await {
            discard_staged(submission.staged_paths()).await;
            return Err(err);
        }
        Ok(submission)
    }

    async fn collect(
        &self,
        multipart: &mut Multipart,
        submission: &mut FormSubmission,
    ) -> Result<(), MultipartError> {
        while let Some(mut field) = multipart.next_field().await? {
            let name = field.name().unwrap_or_default().to_string();

            let Some(file_name) = field.file_name().map(str::to_string) else {
                let value = field.text().await?;
                submission.fields.insert(name, value);
                continue;
            };

            let Some(slot) = AttachmentSlot::from_field_name(&name) else {
                debug!(field = %name, "ignoring unexpected file part");
                continue;
            };
            if submission.attachment(slot).is_some() {
                return Err(MultipartError::DuplicateAttachment {
                    field: slot.field_name(),
                });
            }

            let staged = self.spool(&mut field, slot, &file_name).await?;
            debug!(
                field = slot.field_name(),
                key = %staged.original_name,
                size = staged.size,
                "file part staged"
            );
            submission.set_attachment(slot, staged);
        }
        Ok(())
    }

    async fn spool(
        &self,
        field: &mut Field<'_>,
        slot: AttachmentSlot,
        file_name: &str,
    ) -> Result<StagedFile, MultipartError> {
        let local_path = self
            .dir
            .join(format!("{}-{}", Uuid::new_v4(), slot.field_name()));

        match write_field(field, &local_path).await {
            Ok(size) => Ok(StagedFile {
                local_path,
                original_name: object_key(file_name, slot),
                size,
            }),
            Err(err) => {
                let _ = tokio::fs::remove_file(&local_path).await;
                Err(err)
            }
        }
    }
}

async fn write_field(field: &mut Field<'_>, path: &Path) -> Result<u64, MultipartError> {
    let mut file = tokio::fs::File::create(path).await?;
    let mut size = 0u64;
    while let Some(chunk) = field.chunk().await? {
        size += chunk.len() as u64;
        file.write_all(&chunk).await?;
    }
    file.flush().await?;
    Ok(size)
}

/// The client filename without any directory components. Nameless parts get a generated key.
fn object_key(file_name: &str, slot: AttachmentSlot) -> String {
    let base = file_name
        .rsplit(|c: char| c == '/' || c == '\\')
        .next()
        .unwrap_or_default()
        .trim();
    if base.is_empty() {
        format!("{}-{}", slot.field_name(), Uuid::new_v4())
    } else {
        base.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn object_key_strips_client_directories() {
        assert_eq!(
            object_key("C:\\Users\\jane\\license.png", AttachmentSlot::PhotoId),
            "license.png"
        );
        assert_eq!(
            object_key("scans/meds.jpg", AttachmentSlot::MedsList),
            "meds.jpg"
        );
    }

    #[test]
    fn blank_file_name_gets_generated_key() {
        let key = object_key("  ", AttachmentSlot::MedsList);
        assert!(key.starts_with("medsList-"));
    }

    #[test]
    fn only_io_failures_are_server_errors() {
        assert!(MultipartError::Malformed("eof".to_string()).is_client_error());
        assert!(MultipartError::DuplicateAttachment { field: "photoId" }.is_client_error());
        assert!(!MultipartError::Io(std::io::Error::other("disk full")).is_client_error());
    }

    #[test]
    fn oversized_body_maps_to_payload_too_large() {
        let err = MultipartError::TooLarge("length limit exceeded".to_string());
        assert!(err.is_client_error());
        assert_eq!(err.status(), StatusCode::PAYLOAD_TOO_LARGE);
        assert_eq!(
            MultipartError::Malformed("eof".to_string()).status(),
            StatusCode::BAD_REQUEST
        );
    }
}
