//! CLI entry point for the ProRes conversion daemon
//!
//! Parses command line arguments, sets up logging and starts the daemon.

use clap::Parser;
use prores_daemon::{Config, Daemon, DaemonError};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

/// ProRes Daemon - converts uploaded video to ProRes 4444 XQ QuickTime files
#[derive(Parser, Debug)]
#[command(name = "prores-daemon")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the configuration file (defaults and environment only when omitted)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Address to listen on, overriding the configuration
    #[arg(long)]
    host: Option<String>,

    /// Port to listen on, overriding the configuration
    #[arg(short, long)]
    port: Option<u16>,

    /// Skip startup checks (ffmpeg, ProRes encoder). For testing only.
    #[arg(long, default_value = "false")]
    skip_checks: bool,

    /// Log at debug level
    #[arg(short, long)]
    verbose: bool,
}

fn init_tracing(verbose: bool) {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        if verbose {
            EnvFilter::new("prores_daemon=debug,tower_http=debug")
        } else {
            EnvFilter::new("prores_daemon=info,tower_http=info")
        }
    });

    tracing_subscriber::fmt().with_env_filter(env_filter).init();
}

fn build_daemon(args: &Args) -> Result<Daemon, DaemonError> {
    let mut config = Config::load_or_default(args.config.as_deref())?;
    if let Some(host) = &args.host {
        config.server.host = host.clone();
    }
    if let Some(port) = args.port {
        config.server.port = port;
    }

    if args.skip_checks {
        tracing::warn!("Skipping startup checks (--skip-checks enabled)");
        Daemon::new_without_checks(config)
    } else {
        Daemon::with_config(config)
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();
    init_tracing(args.verbose);

    tracing::info!("ProRes daemon starting");
    if let Some(path) = &args.config {
        tracing::info!(config = %path.display(), "Using config file");
    }

    let daemon = match build_daemon(&args) {
        Ok(daemon) => daemon,
        Err(e) => {
            tracing::error!(error = %e, "Failed to initialize daemon");
            return ExitCode::FAILURE;
        }
    };

    tracing::info!(
        converter = %daemon.config.converter.program.display(),
        uploads = %daemon.config.storage.upload_dir.display(),
        outputs = %daemon.config.storage.output_dir.display(),
        "Daemon initialized"
    );

    if let Err(e) = daemon.run().await {
        tracing::error!(error = %e, "Daemon error");
        return ExitCode::FAILURE;
    }

    ExitCode::SUCCESS
}
