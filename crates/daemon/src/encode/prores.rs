//! ProRes encoder module
//!
//! Builds the ffmpeg invocation that rewraps any input as ProRes 4444 XQ in a
//! QuickTime container, keeping the source resolution and frame rate.

use std::ffi::{OsStr, OsString};
use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use thiserror::Error;
use tokio::process::Command;

/// Fixed video encoder parameters, in argument order.
/// No `-r`, fps or scale filter is ever added: frames pass through untouched.
const PRORES_VIDEO_ARGS: &[&str] = &[
    "-c:v",
    "prores_ks",
    "-profile:v",
    "4444xq",
    "-pix_fmt",
    "yuv444p12le",
    "-vendor",
    "apl0",
];

/// Uncompressed audio codec used when audio is kept.
const PCM_AUDIO_CODEC: &str = "pcm_s24le";

/// Error type for encoding operations
#[derive(Debug, Error)]
pub enum EncodeError {
    /// ffmpeg process exited with non-zero status
    #[error("ffmpeg exited with code {0}")]
    FfmpegFailed(i32),

    /// ffmpeg process was terminated by signal
    #[error("ffmpeg was terminated by a signal")]
    FfmpegTerminated,

    /// IO error spawning or waiting on ffmpeg
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl EncodeError {
    /// Map a finished process status to `Ok(())` or the matching failure.
    pub fn check_status(status: ExitStatus) -> Result<(), EncodeError> {
        if status.success() {
            return Ok(());
        }
        match status.code() {
            Some(code) => Err(EncodeError::FfmpegFailed(code)),
            None => Err(EncodeError::FfmpegTerminated),
        }
    }
}

/// Per-job conversion switches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConversionOptions {
    /// Keep the first audio stream (as PCM) instead of dropping audio.
    pub keep_audio: bool,
    /// Copy container metadata from the input.
    pub copy_metadata: bool,
}

impl Default for ConversionOptions {
    fn default() -> Self {
        Self {
            keep_audio: true,
            copy_metadata: true,
        }
    }
}

/// Parameters for a ProRes conversion job
#[derive(Debug, Clone)]
pub struct ProresEncodeParams {
    /// Path to the input video file
    pub input_path: PathBuf,
    /// Path for the encoded output file
    pub output_path: PathBuf,
    /// Audio and metadata switches
    pub options: ConversionOptions,
}

impl ProresEncodeParams {
    /// Create new encoding parameters
    pub fn new(input_path: PathBuf, output_path: PathBuf, options: ConversionOptions) -> Self {
        Self {
            input_path,
            output_path,
            options,
        }
    }
}

/// Build the ffmpeg argument vector for a ProRes conversion
///
/// ffmpeg is order-sensitive, so the layout is fixed:
/// 1. `-y -i <input>`
/// 2. ProRes 4444 XQ codec, profile, pixel format and vendor tag
/// 3. `-map_metadata 0` when metadata is copied
/// 4. `-map 0:v:0`
/// 5. `-map 0:a? -c:a pcm_s24le` when audio is kept, `-an` otherwise
/// 6. the output path
pub fn build_prores_args(params: &ProresEncodeParams) -> Vec<OsString> {
    let mut args: Vec<OsString> = Vec::with_capacity(20);
    let mut push = |arg: &OsStr| args.push(arg.to_os_string());

    push(OsStr::new("-y"));
    push(OsStr::new("-i"));
    push(params.input_path.as_os_str());

    for arg in PRORES_VIDEO_ARGS {
        push(OsStr::new(arg));
    }

    if params.options.copy_metadata {
        push(OsStr::new("-map_metadata"));
        push(OsStr::new("0"));
    }

    push(OsStr::new("-map"));
    push(OsStr::new("0:v:0"));

    if params.options.keep_audio {
        // `?` makes the audio map optional, so silent inputs still convert.
        push(OsStr::new("-map"));
        push(OsStr::new("0:a?"));
        push(OsStr::new("-c:a"));
        push(OsStr::new(PCM_AUDIO_CODEC));
    } else {
        push(OsStr::new("-an"));
    }

    push(params.output_path.as_os_str());

    args
}

/// Build the ffmpeg command for a conversion
///
/// stdin and stdout are closed; stderr is piped so the supervisor can watch
/// the converter's diagnostics.
pub fn build_ffmpeg_command(program: &Path, params: &ProresEncodeParams) -> Command {
    let mut cmd = Command::new(program);
    cmd.args(build_prores_args(params));
    cmd.stdin(Stdio::null());
    cmd.stdout(Stdio::null());
    cmd.stderr(Stdio::piped());
    cmd
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    /// Helper to convert args to a Vec of strings for easier testing
    fn args_as_strings(params: &ProresEncodeParams) -> Vec<String> {
        build_prores_args(params)
            .into_iter()
            .map(|arg| arg.to_string_lossy().into_owned())
            .collect()
    }

    /// Helper to check if args contain a flag with a specific value
    fn has_flag_with_value(args: &[String], flag: &str, value: &str) -> bool {
        args.windows(2).any(|pair| pair[0] == flag && pair[1] == value)
    }

    fn position(args: &[String], flag: &str, value: &str) -> Option<usize> {
        args.windows(2)
            .position(|pair| pair[0] == flag && pair[1] == value)
    }

    // Strategy for generating valid path-like strings
    fn path_strategy() -> impl Strategy<Value = String> {
        prop::string::string_regex("/[a-zA-Z0-9_.-]{1,20}(/[a-zA-Z0-9_.-]{1,20}){0,3}")
            .unwrap()
    }

    fn params(input: &str, output: &str, keep_audio: bool, copy_metadata: bool) -> ProresEncodeParams {
        ProresEncodeParams::new(
            PathBuf::from(input),
            PathBuf::from(output),
            ConversionOptions {
                keep_audio,
                copy_metadata,
            },
        )
    }

    #[test]
    fn test_default_options_keep_everything() {
        let options = ConversionOptions::default();
        assert!(options.keep_audio);
        assert!(options.copy_metadata);
    }

    #[test]
    fn test_exact_args_with_audio_and_metadata() {
        let args = args_as_strings(&params("/up/in.mp4", "/out/abc.mov", true, true));
        assert_eq!(
            args,
            vec![
                "-y", "-i", "/up/in.mp4",
                "-c:v", "prores_ks", "-profile:v", "4444xq", "-pix_fmt", "yuv444p12le", "-vendor", "apl0",
                "-map_metadata", "0",
                "-map", "0:v:0",
                "-map", "0:a?", "-c:a", "pcm_s24le",
                "/out/abc.mov",
            ]
        );
    }

    #[test]
    fn test_exact_args_without_audio_or_metadata() {
        let args = args_as_strings(&params("/up/in.mp4", "/out/abc.mov", false, false));
        assert_eq!(
            args,
            vec![
                "-y", "-i", "/up/in.mp4",
                "-c:v", "prores_ks", "-profile:v", "4444xq", "-pix_fmt", "yuv444p12le", "-vendor", "apl0",
                "-map", "0:v:0",
                "-an",
                "/out/abc.mov",
            ]
        );
    }

    #[test]
    fn test_command_runs_program_with_built_args() {
        let cmd = build_ffmpeg_command(
            Path::new("/usr/bin/ffmpeg"),
            &params("/up/in.mp4", "/out/abc.mov", true, true),
        );
        let std_cmd = cmd.as_std();
        assert_eq!(std_cmd.get_program(), OsStr::new("/usr/bin/ffmpeg"));
        assert_eq!(std_cmd.get_args().count(), 20);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_command_pipes_only_stderr() {
        let dir = tempfile::TempDir::new().unwrap();
        let program = crate::test_support::fake_converter(
            dir.path(),
            crate::test_support::SUCCESS_CONVERTER,
        );
        let output = dir.path().join("out.mov");
        let params = ProresEncodeParams::new(
            dir.path().join("in.mp4"),
            output.clone(),
            ConversionOptions::default(),
        );

        let mut child = build_ffmpeg_command(&program, &params).spawn().unwrap();

        assert!(child.stdin.is_none());
        assert!(child.stdout.is_none());
        assert!(child.stderr.is_some());
        assert!(child.wait().await.unwrap().success());
        assert!(output.exists());
    }

    #[test]
    fn test_error_messages_name_exit_code() {
        assert_eq!(EncodeError::FfmpegFailed(1).to_string(), "ffmpeg exited with code 1");
        assert_eq!(EncodeError::FfmpegFailed(183).to_string(), "ffmpeg exited with code 183");
        assert_eq!(
            EncodeError::FfmpegTerminated.to_string(),
            "ffmpeg was terminated by a signal"
        );
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        #[test]
        fn prop_prores_args_are_complete_and_ordered(
            input_path in path_strategy(),
            output_path in path_strategy(),
            keep_audio in proptest::bool::ANY,
            copy_metadata in proptest::bool::ANY,
        ) {
            let p = params(&input_path, &output_path, keep_audio, copy_metadata);
            let args = args_as_strings(&p);

            // Deterministic for fixed inputs
            prop_assert_eq!(&args, &args_as_strings(&p));

            prop_assert_eq!(args[0].as_str(), "-y");
            prop_assert!(has_flag_with_value(&args, "-i", &input_path));
            prop_assert_eq!(args.last().map(String::as_str), Some(output_path.as_str()));

            prop_assert!(has_flag_with_value(&args, "-c:v", "prores_ks"));
            prop_assert!(has_flag_with_value(&args, "-profile:v", "4444xq"));
            prop_assert!(has_flag_with_value(&args, "-pix_fmt", "yuv444p12le"));
            prop_assert!(has_flag_with_value(&args, "-vendor", "apl0"));
            prop_assert!(!args.iter().any(|a| a == "-r" || a == "-vf" || a == "-filter:v" || a == "-s"));

            let video_map = position(&args, "-map", "0:v:0");
            prop_assert!(video_map.is_some(), "video map missing: {:?}", args);
            let video_map = video_map.unwrap();

            let metadata = position(&args, "-map_metadata", "0");
            prop_assert_eq!(metadata.is_some(), copy_metadata);
            if let Some(metadata) = metadata {
                prop_assert!(metadata < video_map, "metadata must precede stream maps: {:?}", args);
            }

            let audio_map = position(&args, "-map", "0:a?");
            let pcm = has_flag_with_value(&args, "-c:a", "pcm_s24le");
            let no_audio = args.iter().any(|a| a == "-an");
            prop_assert_eq!(audio_map.is_some(), keep_audio);
            prop_assert_eq!(pcm, keep_audio);
            prop_assert_eq!(no_audio, !keep_audio);
            if let Some(audio_map) = audio_map {
                prop_assert!(audio_map > video_map);
            }
        }
    }
}
