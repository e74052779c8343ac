//! Storage operator construction from [`StorageConfig`].

use opendal::Operator;

use super::OperatorStore;
use crate::config::{StorageBackend, StorageConfig};
use crate::error::{PipeError, Result};

/// Build the OpenDAL operator for the configured backend.
pub fn build_operator(config: &StorageConfig) -> Result<Operator> {
    let operator = match config.backend {
        StorageBackend::Fs => {
            let fs = config.fs.as_ref().ok_or_else(|| {
                PipeError::invalid_config("fs config required for filesystem backend")
            })?;

            let fs_builder = opendal::services::Fs::default().root(&fs.path);
            Operator::new(fs_builder)
                .map_err(|e| PipeError::sink_init(&fs.path, e))?
                .finish()
        }
        StorageBackend::S3 => {
            let s3 = config.s3.as_ref().ok_or_else(|| {
                PipeError::invalid_config("s3 config required for S3 backend")
            })?;

            let mut s3_builder = opendal::services::S3::default()
                .bucket(&s3.bucket)
                .region(&s3.region);

            if let Some(endpoint) = &s3.endpoint {
                s3_builder = s3_builder.endpoint(endpoint);
            }

            Operator::new(s3_builder)
                .map_err(|e| PipeError::sink_init(format!("s3://{}", s3.bucket), e))?
                .finish()
        }
        StorageBackend::R2 => {
            let r2 = config.r2.as_ref().ok_or_else(|| {
                PipeError::invalid_config("r2 config required for R2 backend")
            })?;

            let endpoint = r2
                .endpoint
                .clone()
                .unwrap_or_else(|| format!("https://{}.r2.cloudflarestorage.com", r2.account_id));

            let r2_builder = opendal::services::S3::default()
                .bucket(&r2.bucket)
                .region("auto")
                .endpoint(&endpoint)
                .access_key_id(&r2.access_key_id)
                .secret_access_key(&r2.secret_access_key);

            Operator::new(r2_builder)
                .map_err(|e| PipeError::sink_init(format!("r2://{}", r2.bucket), e))?
                .finish()
        }
    };

    tracing::debug!(backend = %config.backend, "Storage operator initialized");
    Ok(operator)
}

/// Part store for the configured backend, with its key prefix applied.
pub fn open_store(config: &StorageConfig) -> Result<OperatorStore> {
    let operator = build_operator(config)?;
    Ok(OperatorStore::new(operator)
        .with_prefix(config.prefix())
        .with_write_chunk(config.write_chunk_bytes))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{FsConfig, S3Config};
    use crate::writer::PartStore;
    use bytes::Bytes;

    #[tokio::test]
    async fn fs_store_writes_under_root() {
        let dir = tempfile::tempdir().unwrap();
        let config = StorageConfig {
            fs: Some(FsConfig {
                path: dir.path().to_string_lossy().into_owned(),
            }),
            ..StorageConfig::default()
        };

        let store = open_store(&config).unwrap();
        let mut part = store.open("nested/a.txt").await.unwrap();
        part.write(Bytes::from_static(b"row\n")).await.unwrap();
        part.close().await.unwrap();

        let written = std::fs::read_to_string(dir.path().join("nested/a.txt")).unwrap();
        assert_eq!(written, "row\n");
    }

    #[test]
    fn missing_backend_table_is_invalid_config() {
        let config = StorageConfig {
            backend: StorageBackend::S3,
            ..StorageConfig::default()
        };
        let err = build_operator(&config).unwrap_err();
        assert_eq!(err.code(), "E004");
    }

    #[test]
    fn s3_operator_builds_without_network() {
        let config = StorageConfig {
            backend: StorageBackend::S3,
            s3: Some(S3Config {
                bucket: "exports".to_string(),
                region: "ap-southeast-1".to_string(),
                endpoint: Some("http://localhost:9000".to_string()),
                prefix: Some("runs/".to_string()),
            }),
            ..StorageConfig::default()
        };
        assert!(open_store(&config).is_ok());
    }
}
