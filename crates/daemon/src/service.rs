//! Job lifecycle operations: submit, status and download.

use crate::config::Config;
use crate::encode::{ConversionOptions, EncodeError, ProresEncodeParams};
use crate::id::new_job_id;
use crate::jobs::{Job, JobStatus, JobStore, JobStoreError};
use crate::supervisor::JobSupervisor;
use crate::upload::{StagedUpload, UploadError};
use serde::Serialize;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Error type for lifecycle operations
#[derive(Debug, Error)]
pub enum ServiceError {
    /// Submit was called without a (non-empty) file
    #[error("No file uploaded")]
    NoFileUploaded,

    /// The upload could not be read or staged
    #[error(transparent)]
    Upload(#[from] UploadError),

    /// No job with this id
    #[error("Job not found: {0}")]
    NotFound(String),

    /// The job exists but has no finished output
    #[error("Job not ready: {0}")]
    NotReady(String),

    /// The job could not be registered
    #[error("Failed to register job: {0}")]
    Store(#[from] JobStoreError),

    /// The converter could not be started
    #[error("Failed to start converter: {0}")]
    Spawn(#[source] EncodeError),

    /// Filesystem error serving a job's files
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl ServiceError {
    /// HTTP status code equivalent of this error
    pub fn http_status(&self) -> u16 {
        match self {
            ServiceError::NoFileUploaded => 400,
            ServiceError::Upload(UploadError::Multipart(e)) => e.status().as_u16(),
            ServiceError::Upload(UploadError::Io(_)) => 500,
            ServiceError::NotFound(_) => 404,
            ServiceError::NotReady(_) => 400,
            ServiceError::Store(_) | ServiceError::Spawn(_) | ServiceError::Io(_) => 500,
        }
    }
}

/// Client-facing view of a job.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JobStatusView {
    pub status: JobStatus,
    pub progress: u8,
    pub error: Option<String>,
}

impl From<&Job> for JobStatusView {
    fn from(job: &Job) -> Self {
        Self {
            status: job.status,
            progress: job.progress,
            error: job.error.clone(),
        }
    }
}

/// An opened, finished output ready to be streamed.
#[derive(Debug)]
pub struct Download {
    pub file: tokio::fs::File,
    /// Suggested filename, `<prefix>-<job id>.mov`
    pub file_name: String,
    /// Size of the output in bytes
    pub len: u64,
}

/// Entry point for the three job lifecycle operations.
#[derive(Debug, Clone)]
pub struct ConversionService {
    store: JobStore,
    supervisor: JobSupervisor,
    upload_dir: PathBuf,
    output_dir: PathBuf,
    download_prefix: String,
}

impl ConversionService {
    pub fn new(
        store: JobStore,
        supervisor: JobSupervisor,
        upload_dir: PathBuf,
        output_dir: PathBuf,
        download_prefix: String,
    ) -> Self {
        Self {
            store,
            supervisor,
            upload_dir,
            output_dir,
            download_prefix,
        }
    }

    /// Build a service from configuration, launching the configured converter
    pub fn from_config(config: &Config, store: JobStore) -> Self {
        let supervisor = JobSupervisor::new(store.clone(), config.converter.program.clone());
        Self::new(
            store,
            supervisor,
            config.storage.upload_dir.clone(),
            config.storage.output_dir.clone(),
            config.converter.download_prefix.clone(),
        )
    }

    pub fn store(&self) -> &JobStore {
        &self.store
    }

    /// Directory uploads are staged in before submission
    pub fn upload_dir(&self) -> &Path {
        &self.upload_dir
    }

    /// Create a job for a staged upload and start converting it.
    ///
    /// Returns the job id as soon as the converter is running; the outcome of
    /// the conversion is only visible through [`ConversionService::status`].
    /// On error no job is left behind and the upload is deleted.
    pub async fn submit(
        &self,
        upload: StagedUpload,
        options: ConversionOptions,
    ) -> Result<String, ServiceError> {
        if upload.bytes == 0 {
            upload.discard().await;
            return Err(ServiceError::NoFileUploaded);
        }

        let job_id = new_job_id();
        let output_path = self.output_dir.join(format!("{}.mov", job_id));
        let job = Job::new(job_id.clone(), upload.path.clone(), output_path.clone());

        if let Err(e) = self.store.create(job) {
            upload.discard().await;
            return Err(e.into());
        }

        let params = ProresEncodeParams::new(upload.path.clone(), output_path, options);
        if let Err(e) = self.supervisor.spawn(&job_id, params) {
            tracing::error!(job_id = %job_id, error = %e, "Could not start converter");
            self.store.remove(&job_id);
            upload.discard().await;
            return Err(ServiceError::Spawn(e));
        }

        tracing::info!(
            job_id = %job_id,
            bytes = upload.bytes,
            keep_audio = options.keep_audio,
            copy_metadata = options.copy_metadata,
            "Job submitted"
        );
        Ok(job_id)
    }

    /// Current status of a job.
    pub fn status(&self, job_id: &str) -> Result<JobStatusView, ServiceError> {
        self.store
            .get(job_id)
            .map(|job| JobStatusView::from(&job))
            .ok_or_else(|| ServiceError::NotFound(job_id.to_string()))
    }

    /// Open the finished output of a job.
    pub async fn open_download(&self, job_id: &str) -> Result<Download, ServiceError> {
        let job = self
            .store
            .get(job_id)
            .ok_or_else(|| ServiceError::NotFound(job_id.to_string()))?;

        if job.status != JobStatus::Done {
            return Err(ServiceError::NotReady(job_id.to_string()));
        }

        let file = tokio::fs::File::open(&job.output_path).await?;
        let len = file.metadata().await?.len();

        Ok(Download {
            file,
            file_name: format!("{}-{}.mov", self.download_prefix, job.id),
            len,
        })
    }
}
