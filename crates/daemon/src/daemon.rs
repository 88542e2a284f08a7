//! Daemon startup and serving
//!
//! Provides the daemon entry point: configuration, preflight checks, storage
//! preparation and the HTTP server lifetime.

use crate::config::{Config, ConfigError};
use crate::jobs::JobStore;
use crate::server::{create_router, run_server, ServerError, SharedService};
use crate::service::ConversionService;
use crate::startup::{run_startup_checks, StartupError};
use axum::Router;
use std::future::Future;
use std::path::Path;
use std::sync::Arc;
use thiserror::Error;

/// Error type for daemon operations
#[derive(Debug, Error)]
pub enum DaemonError {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Startup check failed
    #[error("Startup check failed: {0}")]
    Startup(#[from] StartupError),

    /// Upload or output directory could not be created
    #[error("Failed to prepare {path}: {source}")]
    Storage {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// Server error
    #[error("Server error: {0}")]
    Server(#[from] ServerError),
}

/// Daemon state containing all runtime components
pub struct Daemon {
    /// Configuration loaded from file and environment
    pub config: Config,
    /// Job registry shared by handlers and supervisors
    pub store: JobStore,
    /// Lifecycle service behind the HTTP routes
    pub service: SharedService,
}

impl Daemon {
    /// Initialize the daemon with configuration from file
    ///
    /// This performs the full startup sequence:
    /// 1. Load config from file (defaults when no path is given)
    /// 2. Apply environment overrides
    /// 3. Run startup checks (ffmpeg, ProRes encoder)
    /// 4. Create the upload and output directories
    pub fn new<P: AsRef<Path>>(config_path: Option<P>) -> Result<Self, DaemonError> {
        let config = Config::load_or_default(config_path)?;
        Self::with_config(config)
    }

    /// Initialize the daemon with an existing configuration
    pub fn with_config(config: Config) -> Result<Self, DaemonError> {
        run_startup_checks(&config)?;
        Self::new_without_checks(config)
    }

    /// Initialize the daemon without running startup checks
    ///
    /// Useful for testing when ffmpeg is not available.
    pub fn new_without_checks(config: Config) -> Result<Self, DaemonError> {
        prepare_storage(&config)?;

        let store = JobStore::new();
        let service = Arc::new(ConversionService::from_config(&config, store.clone()));

        Ok(Self {
            config,
            store,
            service,
        })
    }

    /// Build the HTTP router for this daemon
    pub fn router(&self) -> Router {
        create_router(self.service.clone(), self.config.server.max_upload_bytes)
    }

    /// Serve until Ctrl-C
    pub async fn run(&self) -> Result<(), DaemonError> {
        self.run_until(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %e, "Could not listen for shutdown signal");
                std::future::pending::<()>().await;
            }
            tracing::info!("Shutdown requested");
        })
        .await
    }

    /// Serve until `shutdown` resolves
    ///
    /// Converters still running at shutdown are not waited for.
    pub async fn run_until<F>(&self, shutdown: F) -> Result<(), DaemonError>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        run_server(
            self.router(),
            &self.config.server.host,
            self.config.server.port,
            shutdown,
        )
        .await?;
        Ok(())
    }
}

/// Create the upload and output directories if missing
fn prepare_storage(config: &Config) -> Result<(), DaemonError> {
    for dir in [&config.storage.upload_dir, &config.storage.output_dir] {
        std::fs::create_dir_all(dir).map_err(|source| DaemonError::Storage {
            path: dir.display().to_string(),
            source,
        })?;
    }
    Ok(())
}
