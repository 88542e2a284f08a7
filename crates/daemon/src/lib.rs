//! ProRes conversion daemon
//!
//! HTTP service that accepts video uploads, converts each one to ProRes 4444 XQ
//! with an ffmpeg child process, and serves the result once finished.

pub mod daemon;
pub mod encode;
pub mod id;
pub mod jobs;
pub mod server;
pub mod service;
pub mod startup;
pub mod supervisor;
pub mod upload;

#[cfg(all(test, unix))]
mod test_support;

pub use prores_daemon_config as config;
pub use prores_daemon_config::Config;
pub use daemon::{Daemon, DaemonError};
pub use encode::{
    build_ffmpeg_command, build_prores_args, ConversionOptions, EncodeError, ProresEncodeParams,
};
pub use id::new_job_id;
pub use jobs::{Job, JobStatus, JobStore, JobStoreError};
pub use server::{create_router, run_server, ServerError, SharedService};
pub use service::{ConversionService, Download, JobStatusView, ServiceError};
pub use startup::{
    check_ffmpeg_available, check_prores_encoder, encoder_listed, parse_ffmpeg_version,
    run_startup_checks, StartupError,
};
pub use supervisor::JobSupervisor;
pub use upload::{stage_upload, StagedUpload, UploadError};
