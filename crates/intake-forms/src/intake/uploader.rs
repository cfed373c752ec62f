use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{debug, warn};

use super::storage::{ObjectStore, StorageError};

/// Remote copy of a local file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadedAsset {
    pub key: String,
    pub url: String,
}

#[derive(Debug, thiserror::Error)]
pub enum UploadError {
    #[error("unable to read '{}': {source}", path.display())]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// Pushes local files into the bucket and hands back their public URLs.
pub struct AssetUploader<S> {
    store: Arc<S>,
}

impl<S> AssetUploader<S>
where
    S: ObjectStore + 'static,
{
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    /// Reads `local_path` into memory, writes it under `logical_name`, then removes the local
    /// file. The local file survives a failed remote write so the caller can retry with it.
    pub async fn upload(
        &self,
        local_path: &Path,
        logical_name: &str,
    ) -> Result<UploadedAsset, UploadError> {
        let body = tokio::fs::read(local_path)
            .await
            .map_err(|source| UploadError::Read {
                path: local_path.to_path_buf(),
                source,
            })?;

        let content_type =
            mime_guess::from_path(logical_name).first_or(mime::APPLICATION_OCTET_STREAM);
        let size = body.len();
        self.store
            .put_public(logical_name, body, content_type.essence_str())
            .await?;

        let url = self.store.public_url(logical_name);
        debug!(key = logical_name, size, %url, "asset uploaded");

        if let Err(err) = tokio::fs::remove_file(local_path).await {
            warn!(
                path = %local_path.display(),
                error = %err,
                "uploaded asset left on local disk"
            );
        }

        Ok(UploadedAsset {
            key: logical_name.to_string(),
            url,
        })
    }
}
