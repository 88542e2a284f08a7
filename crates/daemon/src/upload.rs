//! Upload staging.
//!
//! Streams an uploaded multipart field to its own file under the upload
//! directory. The staged file belongs to nobody until a job claims it.

use crate::id::new_job_id;
use axum::extract::multipart::{Field, MultipartError};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::io::AsyncWriteExt;

/// Error type for upload staging
#[derive(Debug, Error)]
pub enum UploadError {
    /// Reading the multipart body failed
    #[error("Malformed upload: {0}")]
    Multipart(#[from] MultipartError),

    /// Writing the staged file failed
    #[error("Failed to stage upload: {0}")]
    Io(#[from] std::io::Error),
}

/// An uploaded file written to disk and not yet owned by a job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StagedUpload {
    /// Location of the staged bytes
    pub path: PathBuf,
    /// Number of bytes written
    pub bytes: u64,
}

impl StagedUpload {
    /// Delete a staged file that will not become a job. Failures are ignored.
    pub async fn discard(self) {
        if let Err(e) = tokio::fs::remove_file(&self.path).await {
            tracing::debug!(path = %self.path.display(), error = %e, "Could not discard staged upload");
        }
    }
}

/// Write a multipart field to a fresh file in `upload_dir`.
///
/// The partial file is removed if the stream or the write fails.
pub async fn stage_upload(
    upload_dir: &Path,
    field: &mut Field<'_>,
) -> Result<StagedUpload, UploadError> {
    let path = upload_dir.join(format!("{}.upload", new_job_id()));
    let mut file = tokio::fs::OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(&path)
        .await?;

    let written = async {
        let mut bytes = 0u64;
        while let Some(chunk) = field.chunk().await? {
            file.write_all(&chunk).await?;
            bytes += chunk.len() as u64;
        }
        file.flush().await?;
        Ok::<u64, UploadError>(bytes)
    }
    .await;
    drop(file);

    match written {
        Ok(bytes) => {
            tracing::debug!(path = %path.display(), bytes, "Staged upload");
            Ok(StagedUpload { path, bytes })
        }
        Err(e) => {
            let _ = tokio::fs::remove_file(&path).await;
            Err(e)
        }
    }
}
