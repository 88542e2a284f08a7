//! Shared helpers for tests that drive a real child process.

use crate::jobs::{Job, JobStore};
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Echoes its arguments into the output path (the last argument) and exits 0.
pub const SUCCESS_CONVERTER: &str = r#"#!/bin/sh
for last; do :; done
echo "frame=    1 fps=0.0 q=-0.0 size=       0kB" >&2
printf '%s\n' "$@" > "$last"
echo "frame=   25 fps=0.0 q=-0.0 Lsize=     512kB" >&2
"#;

/// Writes a partial output, complains on stderr and exits 69.
pub const FAILING_CONVERTER: &str = r#"#!/bin/sh
for last; do :; done
printf 'partial' > "$last"
echo "Invalid data found when processing input" >&2
exit 69
"#;

/// Install `script` as an executable named `ffmpeg` inside `dir`.
pub fn fake_converter(dir: &Path, script: &str) -> PathBuf {
    std::fs::create_dir_all(dir).unwrap();
    let path = dir.join("ffmpeg");
    std::fs::write(&path, script).unwrap();
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
    path
}

/// Poll the store until the job leaves `Processing`, panicking after 10s.
pub async fn wait_for_terminal(store: &JobStore, id: &str) -> Job {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(10);
    loop {
        if let Some(job) = store.get(id) {
            if job.is_terminal() {
                return job;
            }
        }
        assert!(
            tokio::time::Instant::now() < deadline,
            "job {} did not finish in time",
            id
        );
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
}
