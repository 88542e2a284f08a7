//! Job identifier generation.

use rand::Rng;

/// Number of random bytes behind each identifier.
pub const JOB_ID_BYTES: usize = 10;

/// Generate a random job identifier.
///
/// Draws [`JOB_ID_BYTES`] bytes from the thread-local CSPRNG and renders them
/// as lowercase hex, so every identifier is `2 * JOB_ID_BYTES` characters long.
pub fn new_job_id() -> String {
    let bytes: [u8; JOB_ID_BYTES] = rand::thread_rng().gen();
    hex::encode(bytes)
}
