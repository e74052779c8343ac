//! Durable targets for output parts.
//!
//! A [`PartStore`] opens one [`PartHandle`] per part. The production store
//! writes through an OpenDAL [`Operator`], so the same writer targets the
//! local filesystem, S3 or R2 depending on how the operator was built.

use async_trait::async_trait;
use bytes::Bytes;
use opendal::Operator;

use crate::error::{PipeError, Result};

/// Opens part handles by key.
#[async_trait]
pub trait PartStore: Send + Sync {
    async fn open(&self, key: &str) -> Result<Box<dyn PartHandle>>;
}

/// One open part. Data is committed only by [`PartHandle::close`].
#[async_trait]
pub trait PartHandle: Send {
    /// Full storage key, including any store prefix.
    fn key(&self) -> &str;

    async fn write(&mut self, data: Bytes) -> Result<()>;

    async fn close(&mut self) -> Result<()>;

    /// Discard the part without committing it.
    async fn abort(&mut self) -> Result<()>;
}

/// [`PartStore`] backed by an OpenDAL operator.
#[derive(Debug, Clone)]
pub struct OperatorStore {
    operator: Operator,
    prefix: Option<String>,
    write_chunk: Option<usize>,
}

impl OperatorStore {
    pub fn new(operator: Operator) -> Self {
        Self {
            operator,
            prefix: None,
            write_chunk: None,
        }
    }

    /// Prepend `prefix` to every key (e.g. `"runs/2024-05-01/"`).
    pub fn with_prefix(mut self, prefix: Option<String>) -> Self {
        self.prefix = prefix
            .map(|p| p.trim_matches('/').to_string())
            .filter(|p| !p.is_empty());
        self
    }

    /// Buffer size for multipart uploads on object stores.
    pub fn with_write_chunk(mut self, write_chunk: Option<usize>) -> Self {
        self.write_chunk = write_chunk;
        self
    }

    pub fn operator(&self) -> &Operator {
        &self.operator
    }

    fn full_key(&self, key: &str) -> String {
        match &self.prefix {
            Some(prefix) => format!("{}/{}", prefix, key.trim_start_matches('/')),
            None => key.to_string(),
        }
    }
}

#[async_trait]
impl PartStore for OperatorStore {
    async fn open(&self, key: &str) -> Result<Box<dyn PartHandle>> {
        let key = self.full_key(key);

        let writer = match self.write_chunk {
            Some(chunk) => self.operator.writer_with(&key).chunk(chunk).await,
            None => self.operator.writer(&key).await,
        }
        .map_err(|e| PipeError::sink_init(&key, e))?;

        tracing::debug!(key = %key, "Opened part writer");
        Ok(Box::new(OperatorPart { key, writer }))
    }
}

struct OperatorPart {
    key: String,
    writer: opendal::Writer,
}

#[async_trait]
impl PartHandle for OperatorPart {
    fn key(&self) -> &str {
        &self.key
    }

    async fn write(&mut self, data: Bytes) -> Result<()> {
        self.writer
            .write(data)
            .await
            .map_err(|e| PipeError::sink_write(&self.key, e))
    }

    async fn close(&mut self) -> Result<()> {
        self.writer
            .close()
            .await
            .map(|_| ())
            .map_err(|e| PipeError::sink_close(&self.key, e))
    }

    async fn abort(&mut self) -> Result<()> {
        self.writer
            .abort()
            .await
            .map_err(|e| PipeError::sink_close(&self.key, e))
    }
}
