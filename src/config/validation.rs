// Configuration validation
//
// Validates that required fields are present and values are sensible

use super::*;
use anyhow::{bail, Result};
use std::collections::HashSet;
use tracing::warn;

use crate::transform::delimiter_byte;

pub fn validate_config(config: &RuntimeConfig) -> Result<()> {
    validate_source_config(&config.source)?;
    validate_pipe_config(&config.pipe)?;
    validate_storage_config(&config.storage)?;
    validate_destinations(&config.destinations)?;
    Ok(())
}

fn validate_source_config(config: &SourceConfig) -> Result<()> {
    if config.chunk_size == 0 {
        bail!("source.chunk_size must be greater than 0");
    }

    if config.paths.iter().filter(|p| p.as_str() == "-").count() > 1 {
        bail!("source.paths may name standard input ('-') only once");
    }

    if config.chunk_size > 64 * 1024 * 1024 {
        warn!(
            chunk_size = config.chunk_size,
            "source.chunk_size is very large; may cause memory issues"
        );
    }

    Ok(())
}

fn validate_pipe_config(config: &PipeConfig) -> Result<()> {
    if config.high_water_mark == 0 {
        bail!("pipe.high_water_mark must be greater than 0");
    }

    if config.high_water_mark > 256 * 1024 * 1024 {
        warn!(
            high_water_mark = config.high_water_mark,
            "pipe.high_water_mark is very large; each destination may buffer this much"
        );
    }

    Ok(())
}

fn validate_storage_config(config: &StorageConfig) -> Result<()> {
    if config.write_chunk_bytes == Some(0) {
        bail!("storage.write_chunk_bytes must be greater than 0");
    }

    match config.backend {
        StorageBackend::Fs => {
            let fs = config
                .fs
                .as_ref()
                .ok_or_else(|| anyhow::anyhow!("fs storage backend requires 'fs' configuration"))?;

            if fs.path.is_empty() {
                bail!(
                    "Filesystem path is required\n\n\
                    How to fix:\n\
                      • Environment: export {}STORAGE_PATH=./output\n\
                      • CLI: --output ./output\n\
                      • TOML: [storage.fs]\n              path = \"./output\"\n",
                    ENV_PREFIX
                );
            }
        }
        StorageBackend::S3 => {
            let s3 = config
                .s3
                .as_ref()
                .ok_or_else(|| anyhow::anyhow!("s3 storage backend requires 's3' configuration"))?;

            if s3.bucket.is_empty() {
                bail!(
                    "S3 bucket name is required\n\n\
                    How to fix:\n\
                      • Environment: export {}S3_BUCKET=my-bucket\n\
                      • TOML: [storage.s3]\n              bucket = \"my-bucket\"\n",
                    ENV_PREFIX
                );
            }

            if s3.region.is_empty() {
                bail!(
                    "S3 region is required\n\n\
                    How to fix:\n\
                      • Environment: export {}S3_REGION=ap-southeast-1\n\
                      • TOML: [storage.s3]\n              region = \"ap-southeast-1\"\n",
                    ENV_PREFIX
                );
            }
        }
        StorageBackend::R2 => {
            let r2 = config
                .r2
                .as_ref()
                .ok_or_else(|| anyhow::anyhow!("r2 storage backend requires 'r2' configuration"))?;

            if r2.bucket.is_empty() {
                bail!(
                    "R2 bucket name is required\n\n\
                    How to fix:\n\
                      • Environment: export {}R2_BUCKET=my-bucket\n\
                      • TOML: [storage.r2]\n              bucket = \"my-bucket\"\n",
                    ENV_PREFIX
                );
            }

            if r2.account_id.is_empty() {
                bail!(
                    "R2 account ID is required\n\n\
                    How to fix:\n\
                      • Environment: export {}R2_ACCOUNT_ID=<your-account-id>\n\
                      • TOML: [storage.r2]\n              account_id = \"<your-account-id>\"\n",
                    ENV_PREFIX
                );
            }

            if r2.access_key_id.is_empty() || r2.secret_access_key.is_empty() {
                bail!(
                    "R2 credentials are required\n\n\
                    How to fix:\n\
                      • Environment: export AWS_ACCESS_KEY_ID=<key> AWS_SECRET_ACCESS_KEY=<secret>\n\
                      • TOML: [storage.r2]\n              access_key_id = \"<key>\"\n              secret_access_key = \"<secret>\"\n"
                );
            }
        }
    }

    Ok(())
}

fn validate_destinations(destinations: &[DestinationConfig]) -> Result<()> {
    let mut names = HashSet::new();
    let mut prefixes = HashSet::new();

    for destination in destinations {
        if destination.name.trim().is_empty() {
            bail!("destinations[].name must not be empty");
        }
        if !names.insert(destination.name.as_str()) {
            bail!("duplicate destination name '{}'", destination.name);
        }
        if destination.max_part_bytes == 0 {
            bail!(
                "destination '{}': max_part_bytes must be greater than 0",
                destination.name
            );
        }
        if destination.filename().is_empty() {
            bail!("destination '{}': filename must not be empty", destination.name);
        }
        if let Some(template) = &destination.filename_template {
            if !template.contains("{part}") {
                bail!(
                    "destination '{}': filename_template must contain {{part}} or parts overwrite each other",
                    destination.name
                );
            }
        }
        if let Some(transform) = &destination.transform {
            for (field, value) in [
                ("input_delimiter", &transform.input_delimiter),
                ("output_delimiter", &transform.output_delimiter),
            ] {
                if let Err(err) = delimiter_byte(field, value) {
                    bail!("destination '{}': {}", destination.name, err);
                }
            }
            if transform.columns.as_ref().is_some_and(|c| c.is_empty()) {
                bail!(
                    "destination '{}': transform.columns must not be empty when set",
                    destination.name
                );
            }
        }

        if destination.max_part_bytes < 1024 {
            warn!(
                destination = %destination.name,
                max_part_bytes = destination.max_part_bytes,
                "max_part_bytes is very small; expect many parts"
            );
        }

        // Two destinations writing the same names would clobber each other's parts.
        let key = (
            destination.path.trim_end_matches('/').to_string(),
            destination.filename_template.clone(),
            destination.filename().to_string(),
            destination.extension.clone(),
        );
        if !prefixes.insert(key) {
            bail!(
                "destination '{}' writes the same part names as another destination",
                destination.name
            );
        }
    }

    Ok(())
}
