//! Process supervisor
//!
//! Runs one converter process per job on its own tokio task and folds the
//! process's lifetime into the job store: stderr activity drives progress,
//! the exit status decides the terminal state.

use crate::encode::{build_ffmpeg_command, EncodeError, ProresEncodeParams};
use crate::jobs::JobStore;
use std::path::PathBuf;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Child;
use tokio::task::JoinHandle;

/// Size of each read from the converter's stderr.
const STDERR_CHUNK_BYTES: usize = 8192;

/// Spawns converter processes and supervises them until exit.
///
/// There is no timeout and no cancellation: a converter that never exits
/// keeps its task, its files and its `Processing` job forever.
#[derive(Debug, Clone)]
pub struct JobSupervisor {
    /// Store updated with progress and terminal state
    store: JobStore,
    /// Converter executable
    program: PathBuf,
}

impl JobSupervisor {
    /// Create a supervisor that launches `program` and reports into `store`
    pub fn new(store: JobStore, program: PathBuf) -> Self {
        Self { store, program }
    }

    /// Launch the converter for `job_id` and supervise it in the background.
    ///
    /// The job must already be in the store. Only a failure to start the
    /// process is returned here; everything after that is recorded on the job.
    /// The returned handle resolves once the job's final state is written.
    pub fn spawn(
        &self,
        job_id: &str,
        params: ProresEncodeParams,
    ) -> Result<JoinHandle<()>, EncodeError> {
        let mut cmd = build_ffmpeg_command(&self.program, &params);
        let child = cmd.spawn()?;

        tracing::info!(
            job_id = %job_id,
            pid = child.id(),
            input = %params.input_path.display(),
            output = %params.output_path.display(),
            "Converter started"
        );

        let store = self.store.clone();
        let job_id = job_id.to_string();
        Ok(tokio::spawn(async move {
            supervise(store, job_id, child, params).await;
        }))
    }
}

async fn supervise(store: JobStore, job_id: String, mut child: Child, params: ProresEncodeParams) {
    if let Some(stderr) = child.stderr.take() {
        watch_activity(&store, &job_id, stderr).await;
    }

    let outcome = match child.wait().await {
        Ok(status) => EncodeError::check_status(status),
        Err(e) => Err(EncodeError::Io(e)),
    };

    finalize(&store, &job_id, &params, outcome).await;
}

/// Count stderr chunks as heartbeats until the stream closes.
///
/// Each chunk bumps the job's progress by one. ffmpeg prints a status line
/// roughly twice a second, so progress tracks elapsed activity rather than
/// the fraction of the file encoded.
async fn watch_activity<R>(store: &JobStore, job_id: &str, mut reader: R)
where
    R: AsyncRead + Unpin,
{
    let mut chunk = vec![0u8; STDERR_CHUNK_BYTES];
    loop {
        match reader.read(&mut chunk).await {
            Ok(0) => break,
            Ok(n) => {
                store.update(job_id, |job| {
                    if job.record_activity() {
                        tracing::trace!(job_id = %job.id, bytes = n, progress = job.progress, "Converter heartbeat");
                    }
                });
            }
            Err(e) => {
                tracing::debug!(job_id = %job_id, error = %e, "Stopped reading converter stderr");
                break;
            }
        }
    }
}

/// Apply the single terminal update for a job whose converter has exited.
async fn finalize(
    store: &JobStore,
    job_id: &str,
    params: &ProresEncodeParams,
    outcome: Result<(), EncodeError>,
) {
    // The upload is consumed whatever the outcome.
    if let Err(e) = tokio::fs::remove_file(&params.input_path).await {
        tracing::debug!(job_id = %job_id, error = %e, "Could not remove converter input");
    }

    match outcome {
        Ok(()) => {
            let tracked = store.update(job_id, |job| {
                job.complete();
            });
            if tracked {
                tracing::info!(job_id = %job_id, "Conversion finished");
            }
        }
        Err(err) => {
            let reason = match &err {
                EncodeError::Io(e) => format!("failed to wait for ffmpeg: {}", e),
                other => other.to_string(),
            };
            let tracked = store.update(job_id, |job| {
                job.fail(&reason);
            });
            if !tracked {
                return;
            }

            tracing::warn!(job_id = %job_id, error = %reason, "Conversion failed");
            if let Err(e) = tokio::fs::remove_file(&params.output_path).await {
                tracing::debug!(job_id = %job_id, error = %e, "No partial output to remove");
            }
        }
    }
}
