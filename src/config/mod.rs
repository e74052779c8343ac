// chunkpipe configuration
//
// Supports configuration from multiple sources, lowest priority first:
// 1. Built-in defaults
// 2. Config file: --config path, CHUNKPIPE_CONFIG, CHUNKPIPE_CONFIG_CONTENT,
//    or ./chunkpipe.toml
// 3. Environment variables (CHUNKPIPE_* prefix)
// 4. Command-line flags, applied by the binary

use anyhow::Result;
use serde::{Deserialize, Serialize};

use crate::pipe::{DEFAULT_CHUNK_SIZE, DEFAULT_HIGH_WATER_MARK};
use crate::writer::DEFAULT_MAX_PART_BYTES;

mod env_overrides;
mod sources;
mod validation;

pub use env_overrides::{EnvSource, StdEnvSource, ENV_PREFIX};

/// Main runtime configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RuntimeConfig {
    #[serde(default)]
    pub source: SourceConfig,

    #[serde(default)]
    pub pipe: PipeConfig,

    #[serde(default)]
    pub storage: StorageConfig,

    #[serde(default)]
    pub log: LogConfig,

    #[serde(default)]
    pub destinations: Vec<DestinationConfig>,
}

/// Input files, read in order into the same destinations
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceConfig {
    /// Paths to read; `-` reads standard input
    #[serde(default)]
    pub paths: Vec<String>,
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
}

fn default_chunk_size() -> usize {
    DEFAULT_CHUNK_SIZE
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            paths: Vec::new(),
            chunk_size: DEFAULT_CHUNK_SIZE,
        }
    }
}

/// Fan-out tuning
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipeConfig {
    /// Queued bytes per destination before the source is paused
    #[serde(default = "default_high_water_mark")]
    pub high_water_mark: usize,
}

fn default_high_water_mark() -> usize {
    DEFAULT_HIGH_WATER_MARK
}

impl Default for PipeConfig {
    fn default() -> Self {
        Self {
            high_water_mark: DEFAULT_HIGH_WATER_MARK,
        }
    }
}

/// Storage backend configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    #[serde(default = "default_backend")]
    pub backend: StorageBackend,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fs: Option<FsConfig>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub s3: Option<S3Config>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub r2: Option<R2Config>,

    /// Multipart upload buffer for object stores
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub write_chunk_bytes: Option<usize>,
}

fn default_backend() -> StorageBackend {
    StorageBackend::Fs
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: StorageBackend::Fs,
            fs: Some(FsConfig::default()),
            s3: None,
            r2: None,
            write_chunk_bytes: None,
        }
    }
}

impl StorageConfig {
    /// Key prefix of the active backend, if any.
    pub fn prefix(&self) -> Option<String> {
        match self.backend {
            StorageBackend::Fs => None,
            StorageBackend::S3 => self.s3.as_ref().and_then(|s3| s3.prefix.clone()),
            StorageBackend::R2 => self.r2.as_ref().and_then(|r2| r2.prefix.clone()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    Fs,
    S3,
    R2,
}

impl std::fmt::Display for StorageBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StorageBackend::Fs => write!(f, "fs"),
            StorageBackend::S3 => write!(f, "s3"),
            StorageBackend::R2 => write!(f, "r2"),
        }
    }
}

impl std::str::FromStr for StorageBackend {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "fs" | "filesystem" => Ok(StorageBackend::Fs),
            "s3" | "aws" => Ok(StorageBackend::S3),
            "r2" => Ok(StorageBackend::R2),
            _ => anyhow::bail!("Unsupported storage backend: {}. Supported: fs, s3, r2", s),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FsConfig {
    pub path: String,
}

impl Default for FsConfig {
    fn default() -> Self {
        Self {
            path: "./output".to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct S3Config {
    pub bucket: String,
    pub region: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,
    /// Optional key prefix for every part (e.g., "exports/2024-05/")
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prefix: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct R2Config {
    pub bucket: String,
    pub account_id: String,
    pub access_key_id: String,
    pub secret_access_key: String,
    pub endpoint: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prefix: Option<String>,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default = "default_log_format")]
    pub format: LogFormat,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> LogFormat {
    LogFormat::Text
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Text,
    Json,
}

/// One output channel: a chunked writer with its own naming and transform
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DestinationConfig {
    pub name: String,

    /// Directory or key prefix, relative to the storage root
    #[serde(default = "default_path")]
    pub path: String,

    /// Base filename; defaults to the destination name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filename: Option<String>,

    #[serde(default = "default_extension")]
    pub extension: String,

    #[serde(default = "default_max_part_bytes")]
    pub max_part_bytes: u64,

    /// Part name template, see [`crate::template`]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filename_template: Option<String>,

    /// Header template written at the top of every part
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub header: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transform: Option<TransformConfig>,
}

fn default_path() -> String {
    ".".to_string()
}

fn default_extension() -> String {
    "txt".to_string()
}

fn default_max_part_bytes() -> u64 {
    DEFAULT_MAX_PART_BYTES
}

impl DestinationConfig {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            path: default_path(),
            filename: None,
            extension: default_extension(),
            max_part_bytes: DEFAULT_MAX_PART_BYTES,
            filename_template: None,
            header: None,
            transform: None,
        }
    }

    pub fn filename(&self) -> &str {
        self.filename.as_deref().unwrap_or(&self.name)
    }
}

/// Delimited-record mapping applied to every line of a destination
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransformConfig {
    #[serde(default = "default_input_delimiter")]
    pub input_delimiter: String,
    #[serde(default = "default_output_delimiter")]
    pub output_delimiter: String,
    /// Zero-based columns to keep, in output order
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub columns: Option<Vec<usize>>,
    /// Value used for columns missing from a record
    #[serde(default)]
    pub missing_value: String,
    #[serde(default)]
    pub skip_first_line: bool,
    #[serde(default)]
    pub drop_empty: bool,
}

fn default_input_delimiter() -> String {
    "|".to_string()
}

fn default_output_delimiter() -> String {
    ",".to_string()
}

impl Default for TransformConfig {
    fn default() -> Self {
        Self {
            input_delimiter: default_input_delimiter(),
            output_delimiter: default_output_delimiter(),
            columns: None,
            missing_value: String::new(),
            skip_first_line: false,
            drop_empty: false,
        }
    }
}

impl RuntimeConfig {
    /// Load configuration from the default locations and the environment.
    pub fn load() -> Result<Self> {
        sources::load_config()
    }

    /// Load configuration from a specific file path (for CLI usage).
    pub fn load_from_path(path: impl AsRef<std::path::Path>) -> Result<Self> {
        sources::load_from_file_path(path)
    }

    /// Load configuration with graceful fallback to defaults.
    /// Does not fail if no config file is found.
    pub fn load_or_default() -> Result<Self> {
        sources::load_or_default()
    }

    /// Parse inline TOML on top of the defaults, then apply overrides from
    /// `env`. Validation is left to the caller.
    pub fn from_toml_with_env<E: EnvSource>(content: &str, env: &E) -> Result<Self> {
        let mut config = sources::parse_toml(content, "inline config")?;
        config.apply_env_overrides_from(env)?;
        Ok(config)
    }

    /// Apply environment overrides from a custom source.
    pub fn apply_env_overrides_from<E: EnvSource>(&mut self, env: &E) -> Result<()> {
        env_overrides::apply_env_overrides(self, env)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        validation::validate_config(self)
    }
}
