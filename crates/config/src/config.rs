//! Core configuration structures and loading logic

use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

/// Error type for configuration operations
#[derive(Debug)]
pub enum ConfigError {
    /// IO error reading config file
    Io(std::io::Error),
    /// TOML parsing error
    Parse(toml::de::Error),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Io(e) => write!(f, "Failed to read config file: {}", e),
            ConfigError::Parse(e) => write!(f, "Failed to parse config: {}", e),
        }
    }
}

impl std::error::Error for ConfigError {}

impl From<std::io::Error> for ConfigError {
    fn from(e: std::io::Error) -> Self {
        ConfigError::Io(e)
    }
}

impl From<toml::de::Error> for ConfigError {
    fn from(e: toml::de::Error) -> Self {
        ConfigError::Parse(e)
    }
}

/// HTTP listener configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ServerConfig {
    /// Address to bind (default 0.0.0.0)
    #[serde(default = "default_host")]
    pub host: String,
    /// Port to bind (default 3000)
    #[serde(default = "default_port")]
    pub port: u16,
    /// Largest accepted request body in bytes (default 2 GiB)
    #[serde(default = "default_max_upload_bytes")]
    pub max_upload_bytes: u64,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    3000
}

fn default_max_upload_bytes() -> u64 {
    2 * 1024 * 1024 * 1024
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            max_upload_bytes: default_max_upload_bytes(),
        }
    }
}

/// Where uploads are staged and conversion outputs are written
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StorageConfig {
    /// Directory for staged uploads (default `<tmp>/uploads`)
    #[serde(default = "default_upload_dir")]
    pub upload_dir: PathBuf,
    /// Directory for converted files (default `<tmp>/outputs`)
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,
}

fn default_upload_dir() -> PathBuf {
    env::temp_dir().join("uploads")
}

fn default_output_dir() -> PathBuf {
    env::temp_dir().join("outputs")
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            upload_dir: default_upload_dir(),
            output_dir: default_output_dir(),
        }
    }
}

/// External converter configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ConverterConfig {
    /// Converter executable, resolved through PATH when not absolute
    #[serde(default = "default_program")]
    pub program: PathBuf,
    /// Prefix of the suggested download filename (`<prefix>-<job id>.mov`)
    #[serde(default = "default_download_prefix")]
    pub download_prefix: String,
}

fn default_program() -> PathBuf {
    PathBuf::from("ffmpeg")
}

fn default_download_prefix() -> String {
    "prores4444xq".to_string()
}

impl Default for ConverterConfig {
    fn default() -> Self {
        Self {
            program: default_program(),
            download_prefix: default_download_prefix(),
        }
    }
}

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub converter: ConverterConfig,
}

impl Config {
    /// Load configuration from a TOML file
    ///
    /// Parses the config.toml file and handles missing optional fields with defaults.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path)?;
        Self::parse_toml(&content)
    }

    /// Parse configuration from a TOML string
    pub fn parse_toml(content: &str) -> Result<Self, ConfigError> {
        let config: Config = toml::from_str(content)?;
        Ok(config)
    }

    /// Apply environment variable overrides to the configuration
    ///
    /// Overrides the following values if environment variables are set:
    /// - HOST -> server.host
    /// - PORT -> server.port
    /// - MAX_UPLOAD_BYTES -> server.max_upload_bytes
    /// - UPLOAD_DIR -> storage.upload_dir
    /// - OUTPUT_DIR -> storage.output_dir
    /// - FFMPEG_PATH -> converter.program
    /// - DOWNLOAD_PREFIX -> converter.download_prefix
    ///
    /// Values that fail to parse are ignored.
    pub fn apply_env_overrides(&mut self) {
        if let Ok(val) = env::var("HOST") {
            if !val.is_empty() {
                self.server.host = val;
            }
        }

        if let Ok(val) = env::var("PORT") {
            if let Ok(port) = val.parse::<u16>() {
                self.server.port = port;
            }
        }

        if let Ok(val) = env::var("MAX_UPLOAD_BYTES") {
            if let Ok(bytes) = val.parse::<u64>() {
                self.server.max_upload_bytes = bytes;
            }
        }

        if let Some(dir) = env_path("UPLOAD_DIR") {
            self.storage.upload_dir = dir;
        }

        if let Some(dir) = env_path("OUTPUT_DIR") {
            self.storage.output_dir = dir;
        }

        if let Some(program) = env_path("FFMPEG_PATH") {
            self.converter.program = program;
        }

        if let Ok(val) = env::var("DOWNLOAD_PREFIX") {
            if !val.is_empty() {
                self.converter.download_prefix = val;
            }
        }
    }

    /// Load configuration from file and apply environment overrides
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let mut config = Self::load_from_file(path)?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Load configuration from an optional file, falling back to defaults
    ///
    /// Environment overrides are applied in both cases.
    pub fn load_or_default<P: AsRef<Path>>(path: Option<P>) -> Result<Self, ConfigError> {
        match path {
            Some(path) => Self::load(path),
            None => {
                let mut config = Self::default();
                config.apply_env_overrides();
                Ok(config)
            }
        }
    }
}

fn env_path(key: &str) -> Option<PathBuf> {
    env::var_os(key)
        .filter(|val| !val.is_empty())
        .map(PathBuf::from)
}
