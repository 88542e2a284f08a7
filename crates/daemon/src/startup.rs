//! Startup checks module
//!
//! Preflight checks run before the daemon accepts uploads:
//! - the configured ffmpeg binary runs (`ffmpeg -version`)
//! - it ships the `prores_ks` encoder (`ffmpeg -hide_banner -encoders`)

use crate::config::Config;
use std::path::Path;
use std::process::Command;
use thiserror::Error;

/// Encoder every conversion depends on
pub const PRORES_ENCODER: &str = "prores_ks";

/// Error types for startup checks
#[derive(Debug, Error)]
pub enum StartupError {
    #[error("ffmpeg not available: {0}")]
    FfmpegUnavailable(String),

    #[error("ffmpeg at {0} does not provide the prores_ks encoder")]
    ProresEncoderMissing(String),
}

/// Parse FFmpeg version string and extract major version number
///
/// Handles various FFmpeg version formats:
/// - Standard: "ffmpeg version 8.0 ..."
/// - N-prefixed: "ffmpeg version n8.0-... ..."
///
/// Git snapshots ("ffmpeg version N-112233-g...") carry no release number
/// and yield `None`.
pub fn parse_ffmpeg_version(version_output: &str) -> Option<u32> {
    // Look for "ffmpeg version" followed by the version string
    let version_line = version_output
        .lines()
        .find(|line| line.to_lowercase().contains("ffmpeg version"))?;

    // Extract the version part after "ffmpeg version"
    let version_part = version_line
        .to_lowercase()
        .split("ffmpeg version")
        .nth(1)?
        .trim()
        .split_whitespace()
        .next()?
        .to_string();

    // Handle n-prefixed versions (e.g., "n8.0-...")
    let version_str = version_part.trim_start_matches('n');

    // Extract major version (before first '.' or '-')
    let major_str = version_str.split(|c| c == '.' || c == '-').next()?;

    major_str.parse().ok()
}

/// Check whether an `ffmpeg -encoders` listing contains `encoder`
///
/// Listing rows look like ` V....D prores_ks    Apple ProRes (iCodec Pro)`;
/// the encoder name is the second column.
pub fn encoder_listed(encoders_output: &str, encoder: &str) -> bool {
    encoders_output
        .lines()
        .filter_map(|line| line.split_whitespace().nth(1))
        .any(|name| name == encoder)
}

/// Check that ffmpeg runs, returning its major version when recognizable
pub fn check_ffmpeg_available(program: &Path) -> Result<Option<u32>, StartupError> {
    let output = Command::new(program)
        .arg("-version")
        .output()
        .map_err(|e| {
            StartupError::FfmpegUnavailable(format!(
                "{} -version failed; is ffmpeg installed and in PATH? Error: {}",
                program.display(),
                e
            ))
        })?;

    if !output.status.success() {
        return Err(StartupError::FfmpegUnavailable(format!(
            "{} -version exited with {}",
            program.display(),
            output.status
        )));
    }

    let version_output = String::from_utf8_lossy(&output.stdout);
    Ok(parse_ffmpeg_version(&version_output))
}

/// Check that ffmpeg was built with the ProRes encoder
pub fn check_prores_encoder(program: &Path) -> Result<(), StartupError> {
    let output = Command::new(program)
        .args(["-hide_banner", "-encoders"])
        .output()
        .map_err(|e| {
            StartupError::FfmpegUnavailable(format!(
                "{} -encoders failed: {}",
                program.display(),
                e
            ))
        })?;

    let listing = String::from_utf8_lossy(&output.stdout);
    if !output.status.success() || !encoder_listed(&listing, PRORES_ENCODER) {
        return Err(StartupError::ProresEncoderMissing(
            program.display().to_string(),
        ));
    }

    Ok(())
}

/// Run all startup checks in order
///
/// Checks are run in the following order:
/// 1. ffmpeg availability
/// 2. ProRes encoder presence
pub fn run_startup_checks(cfg: &Config) -> Result<(), StartupError> {
    let program = cfg.converter.program.as_path();

    match check_ffmpeg_available(program)? {
        Some(major) => tracing::info!(program = %program.display(), major, "Found ffmpeg"),
        None => tracing::info!(program = %program.display(), "Found ffmpeg (unrecognized version)"),
    }
    check_prores_encoder(program)?;

    Ok(())
}
