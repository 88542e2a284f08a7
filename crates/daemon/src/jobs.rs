//! Job model and in-memory job store.
//!
//! Jobs live for the lifetime of the process. Nothing evicts them, so a
//! long-running daemon grows its store (and its output directory) without
//! bound; restarting the daemon is the only reclamation.

use dashmap::DashMap;
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;

/// Progress assigned to a freshly submitted job.
pub const INITIAL_PROGRESS: u8 = 1;

/// Highest progress the activity heuristic may report before the converter exits.
pub const MAX_ACTIVE_PROGRESS: u8 = 99;

/// Status of a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    /// Converter is running.
    Processing,
    /// Output is complete and ready for download.
    Done,
    /// Conversion failed; see the job's error.
    Error,
}

impl Default for JobStatus {
    fn default() -> Self {
        Self::Processing
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            JobStatus::Processing => write!(f, "processing"),
            JobStatus::Done => write!(f, "done"),
            JobStatus::Error => write!(f, "error"),
        }
    }
}

/// A tracked conversion request.
#[derive(Debug, Clone, PartialEq)]
pub struct Job {
    /// Unique job identifier.
    pub id: String,
    /// Current status of the job.
    pub status: JobStatus,
    /// Coarse progress, 0-100.
    pub progress: u8,
    /// Failure description, set only when status is `Error`.
    pub error: Option<String>,
    /// Staged upload consumed by the converter.
    pub input_path: PathBuf,
    /// Converter output, complete only when status is `Done`.
    pub output_path: PathBuf,
}

impl Job {
    /// Create a job in the `Processing` state.
    pub fn new(id: String, input_path: PathBuf, output_path: PathBuf) -> Self {
        Self {
            id,
            status: JobStatus::Processing,
            progress: INITIAL_PROGRESS,
            error: None,
            input_path,
            output_path,
        }
    }

    /// Record one unit of converter activity.
    ///
    /// Bumps progress by one, never past [`MAX_ACTIVE_PROGRESS`]. This counts
    /// heartbeats from the converter; it says nothing about how much of the
    /// file has actually been encoded. Returns false on a terminal job.
    pub fn record_activity(&mut self) -> bool {
        if self.is_terminal() {
            return false;
        }
        self.progress = self.progress.saturating_add(1).min(MAX_ACTIVE_PROGRESS);
        true
    }

    /// Mark the job as done. Returns false if it was already terminal.
    pub fn complete(&mut self) -> bool {
        if self.is_terminal() {
            return false;
        }
        self.status = JobStatus::Done;
        self.progress = 100;
        true
    }

    /// Mark the job as failed with a reason. Returns false if it was already terminal.
    pub fn fail(&mut self, reason: &str) -> bool {
        if self.is_terminal() {
            return false;
        }
        self.status = JobStatus::Error;
        self.error = Some(reason.to_string());
        true
    }

    /// Check if the job is in a terminal state (done or error).
    pub fn is_terminal(&self) -> bool {
        matches!(self.status, JobStatus::Done | JobStatus::Error)
    }
}

/// Error type for job store operations
#[derive(Debug, Error)]
pub enum JobStoreError {
    /// A job with this id is already registered
    #[error("Job already exists: {0}")]
    AlreadyExists(String),
}

/// Concurrent registry of jobs keyed by id.
///
/// Cloning the store yields another handle to the same map. Mutations of one
/// job are serialized by the map's shard lock; unrelated jobs do not contend.
#[derive(Debug, Clone, Default)]
pub struct JobStore {
    jobs: Arc<DashMap<String, Job>>,
}

impl JobStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new job.
    pub fn create(&self, job: Job) -> Result<(), JobStoreError> {
        use dashmap::mapref::entry::Entry;

        match self.jobs.entry(job.id.clone()) {
            Entry::Occupied(_) => Err(JobStoreError::AlreadyExists(job.id)),
            Entry::Vacant(slot) => {
                slot.insert(job);
                Ok(())
            }
        }
    }

    /// Snapshot of a job, or `None` if the id is unknown.
    pub fn get(&self, id: &str) -> Option<Job> {
        self.jobs.get(id).map(|job| job.value().clone())
    }

    /// Apply `mutator` to a job while holding its entry lock.
    ///
    /// Returns false when the job does not exist; the mutator is not called.
    pub fn update<F>(&self, id: &str, mutator: F) -> bool
    where
        F: FnOnce(&mut Job),
    {
        match self.jobs.get_mut(id) {
            Some(mut job) => {
                mutator(job.value_mut());
                true
            }
            None => false,
        }
    }

    /// Remove a job, returning it if it existed.
    pub fn remove(&self, id: &str) -> Option<Job> {
        self.jobs.remove(id).map(|(_, job)| job)
    }

    /// Number of tracked jobs.
    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    /// Whether the store tracks no jobs.
    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn create_test_job(id: &str) -> Job {
        Job::new(
            id.to_string(),
            PathBuf::from("/tmp/uploads/input.upload"),
            PathBuf::from(format!("/tmp/outputs/{}.mov", id)),
        )
    }

    #[test]
    fn test_job_status_display() {
        assert_eq!(JobStatus::Processing.to_string(), "processing");
        assert_eq!(JobStatus::Done.to_string(), "done");
        assert_eq!(JobStatus::Error.to_string(), "error");
    }

    #[test]
    fn test_job_status_serializes_lowercase() {
        let json = serde_json::to_string(&JobStatus::Processing).unwrap();
        assert_eq!(json, "\"processing\"");
        assert_eq!(JobStatus::default(), JobStatus::Processing);
    }

    #[test]
    fn test_new_job_is_processing() {
        let job = create_test_job("abc");

        assert_eq!(job.status, JobStatus::Processing);
        assert_eq!(job.progress, INITIAL_PROGRESS);
        assert_eq!(job.error, None);
        assert!(!job.is_terminal());
    }

    #[test]
    fn test_activity_is_capped_below_100() {
        let mut job = create_test_job("abc");
        for _ in 0..500 {
            job.record_activity();
        }
        assert_eq!(job.progress, MAX_ACTIVE_PROGRESS);
        assert_eq!(job.status, JobStatus::Processing);
    }

    #[test]
    fn test_complete_pins_progress() {
        let mut job = create_test_job("abc");
        assert!(job.complete());
        assert_eq!(job.status, JobStatus::Done);
        assert_eq!(job.progress, 100);
        assert_eq!(job.error, None);
    }

    #[test]
    fn test_fail_records_reason() {
        let mut job = create_test_job("abc");
        job.record_activity();
        assert!(job.fail("ffmpeg exited with code 1"));
        assert_eq!(job.status, JobStatus::Error);
        assert_eq!(job.error.as_deref(), Some("ffmpeg exited with code 1"));
        assert_eq!(job.progress, 2);
    }

    #[test]
    fn test_terminal_job_does_not_transition() {
        let mut done = create_test_job("done");
        done.complete();
        let snapshot = done.clone();
        assert!(!done.fail("late failure"));
        assert!(!done.record_activity());
        assert!(!done.complete());
        assert_eq!(done, snapshot);

        let mut failed = create_test_job("failed");
        failed.fail("boom");
        let snapshot = failed.clone();
        assert!(!failed.complete());
        assert!(!failed.record_activity());
        assert_eq!(failed, snapshot);
    }

    #[test]
    fn test_store_create_and_get() {
        let store = JobStore::new();
        assert!(store.is_empty());

        store.create(create_test_job("job-1")).unwrap();

        let job = store.get("job-1").expect("job should exist");
        assert_eq!(job.id, "job-1");
        assert_eq!(store.len(), 1);
        assert!(store.get("job-2").is_none());
    }

    #[test]
    fn test_store_rejects_duplicate_id() {
        let store = JobStore::new();
        store.create(create_test_job("dup")).unwrap();

        let mut second = create_test_job("dup");
        second.progress = 50;
        let result = store.create(second);

        assert!(matches!(result, Err(JobStoreError::AlreadyExists(id)) if id == "dup"));
        assert_eq!(store.get("dup").unwrap().progress, INITIAL_PROGRESS);
    }

    #[test]
    fn test_store_update_missing_job_is_ignored() {
        let store = JobStore::new();
        let mut called = false;
        let updated = store.update("missing", |_| called = true);
        assert!(!updated);
        assert!(!called);
    }

    #[test]
    fn test_store_remove() {
        let store = JobStore::new();
        store.create(create_test_job("gone")).unwrap();

        let removed = store.remove("gone").expect("job should be removed");
        assert_eq!(removed.id, "gone");
        assert!(store.get("gone").is_none());
        assert!(!store.update("gone", |job| {
            job.complete();
        }));
    }

    #[test]
    fn test_store_clones_share_state() {
        let store = JobStore::new();
        let handle = store.clone();
        store.create(create_test_job("shared")).unwrap();

        handle.update("shared", |job| {
            job.complete();
        });

        assert_eq!(store.get("shared").unwrap().status, JobStatus::Done);
    }

    #[tokio::test]
    async fn test_concurrent_updates_are_not_lost() {
        let store = JobStore::new();
        store.create(create_test_job("busy")).unwrap();
        store.create(create_test_job("other")).unwrap();

        let mut handles = Vec::new();
        for i in 0..40 {
            let store = store.clone();
            let id = if i % 2 == 0 { "busy" } else { "other" };
            handles.push(tokio::spawn(async move {
                store.update(id, |job| {
                    job.record_activity();
                });
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        assert_eq!(store.get("busy").unwrap().progress, INITIAL_PROGRESS + 20);
        assert_eq!(store.get("other").unwrap().progress, INITIAL_PROGRESS + 20);
    }

    #[derive(Debug, Clone)]
    enum Event {
        Activity,
        Complete,
        Fail,
    }

    fn event_strategy() -> impl Strategy<Value = Event> {
        prop_oneof![
            8 => Just(Event::Activity),
            1 => Just(Event::Complete),
            1 => Just(Event::Fail),
        ]
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        // Progress never decreases while processing, and the first terminal
        // transition is the only one that sticks.
        #[test]
        fn prop_job_transitions_are_monotonic(events in prop::collection::vec(event_strategy(), 0..300)) {
            let mut job = create_test_job("prop");
            let mut first_terminal: Option<JobStatus> = None;

            for event in events {
                let before = job.clone();
                match event {
                    Event::Activity => { job.record_activity(); }
                    Event::Complete => { job.complete(); }
                    Event::Fail => { job.fail("exit 1"); }
                }

                if before.is_terminal() {
                    prop_assert_eq!(&job, &before);
                } else {
                    prop_assert!(job.progress >= before.progress);
                }
                if job.status == JobStatus::Processing {
                    prop_assert!(job.progress <= MAX_ACTIVE_PROGRESS);
                }
                if first_terminal.is_none() && job.is_terminal() {
                    first_terminal = Some(job.status);
                }
            }

            if let Some(status) = first_terminal {
                prop_assert_eq!(job.status, status);
                if status == JobStatus::Done {
                    prop_assert_eq!(job.progress, 100);
                }
            }
        }
    }
}
