// Initialization utilities
//
// Logging/tracing setup and storage logging for the CLI

use crate::config::{LogConfig, LogFormat, StorageBackend, StorageConfig};
use tracing::info;

/// Log where parts are going to be written.
pub fn log_storage(config: &StorageConfig) {
    match config.backend {
        StorageBackend::Fs => {
            if let Some(fs) = config.fs.as_ref() {
                info!("Using filesystem storage at: {}", fs.path);
            } else {
                info!("Using filesystem storage");
            }
        }
        StorageBackend::S3 => {
            if let Some(s3) = config.s3.as_ref() {
                info!(
                    "Using S3 storage: bucket={}, region={}, prefix={}",
                    s3.bucket,
                    s3.region,
                    s3.prefix.as_deref().unwrap_or("")
                );
            } else {
                info!("Using S3 storage");
            }
        }
        StorageBackend::R2 => {
            if let Some(r2) = config.r2.as_ref() {
                info!(
                    "Using R2 storage: account={}, bucket={}",
                    r2.account_id, r2.bucket
                );
            } else {
                info!("Using R2 storage");
            }
        }
    }
}

/// Initialize tracing/logging from the log configuration
pub fn init_tracing(config: &LogConfig) {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    // Parse log level from config
    let env_filter =
        EnvFilter::try_new(&config.level).unwrap_or_else(|_| EnvFilter::new("info"));

    // Logs go to stderr so stdin/stdout stay usable for data
    let registry = tracing_subscriber::registry().with(env_filter);

    // Try to set the global subscriber; ignore error if already set (idempotent)
    let _ = match config.format {
        LogFormat::Json => tracing::subscriber::set_global_default(
            registry.with(fmt::layer().json().with_writer(std::io::stderr)),
        ),
        LogFormat::Text => tracing::subscriber::set_global_default(
            registry.with(fmt::layer().with_writer(std::io::stderr)),
        ),
    };
}
