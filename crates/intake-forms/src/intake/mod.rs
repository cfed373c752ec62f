//! Intake form write path: multipart staging, asset upload, document build, and persistence.

pub mod builder;
pub mod domain;
pub mod multipart;
pub mod repository;
pub mod router;
pub mod service;
pub mod storage;
pub mod uploader;

#[cfg(test)]
mod tests;

pub use builder::{FormDocumentBuilder, InvalidDateOfBirth};
pub use domain::{
    AttachmentSlot, DateOfBirth, FormSubmission, InsertConfirmation, IntakeForm, StagedFile,
    StoredForm,
};
pub use multipart::{MultipartError, MultipartSpool};
pub use repository::{FormRepository, MongoFormRepository, RepositoryError};
pub use router::{error_response, intake_router, IntakeState, SUBMITTED_MESSAGE};
pub use service::{SubmissionError, SubmissionService, SubmissionSettings, SubmissionStage};
pub use storage::{public_object_url, ObjectStore, S3ObjectStore, StorageError};
pub use uploader::{AssetUploader, UploadError, UploadedAsset};
