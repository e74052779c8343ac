// Size-bounded, line-preserving part writer.
//
// Every line goes through the same path: reassemble, transform, rotation
// check, buffer. Buffered output reaches the part handle at the end of each
// accepted chunk, before a rotation and whenever it grows past
// FLUSH_THRESHOLD, so a part is always complete before its successor opens.

use std::sync::Arc;

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use tracing::{debug, info, warn};

use super::config::ChunkedWriterConfig;
use super::reassembler::LineReassembler;
use super::store::{PartHandle, PartStore};
use crate::error::{PipeError, Result};
use crate::pipe::Sink;

const FLUSH_THRESHOLD: usize = 256 * 1024;

#[derive(Debug)]
enum Status {
    Open,
    Finalized,
    Failed(PipeError),
    Destroyed(PipeError),
}

/// Rotation state of the part currently being written.
#[derive(Default)]
struct PartState {
    /// 1-based once the first part is open
    index: u32,
    /// Bytes in the part so far, header included
    bytes: u64,
    /// Lines in the part, header excluded
    lines: u64,
    handle: Option<Box<dyn PartHandle>>,
    buffer: BytesMut,
}

/// Writes a line stream into a sequence of parts, none larger than
/// `max_part_bytes` unless a single line alone is.
///
/// The writer owns its rotation state exclusively; use it from one task, or
/// wrap it in a [`crate::pipe::BufferedSink`] to move it onto its own.
pub struct ChunkedWriter {
    name: String,
    config: ChunkedWriterConfig,
    store: Arc<dyn PartStore>,
    lines: LineReassembler,
    part: PartState,
    parts: Vec<String>,
    status: Status,
}

impl ChunkedWriter {
    /// Create a writer named after its base filename and open part 1.
    pub async fn create(config: ChunkedWriterConfig, store: Arc<dyn PartStore>) -> Result<Self> {
        let name = config.filename.clone();
        Self::create_named(name, config, store).await
    }

    /// Create a writer with an explicit name for logs and error targets.
    pub async fn create_named(
        name: impl Into<String>,
        config: ChunkedWriterConfig,
        store: Arc<dyn PartStore>,
    ) -> Result<Self> {
        let name = name.into();
        if config.max_part_bytes == 0 {
            return Err(PipeError::invalid_config(format!(
                "max_part_bytes must be greater than 0 for '{}'",
                name
            )));
        }

        let mut writer = Self {
            name,
            config,
            store,
            lines: LineReassembler::default(),
            part: PartState::default(),
            parts: Vec::new(),
            status: Status::Open,
        };
        writer.open_next_part().await?;
        Ok(writer)
    }

    /// Keys of every part opened so far, in order.
    pub fn parts(&self) -> &[String] {
        &self.parts
    }

    pub fn part_index(&self) -> u32 {
        self.part.index
    }

    pub fn current_part_bytes(&self) -> u64 {
        self.part.bytes
    }

    /// Length of the unterminated trailing fragment.
    pub fn pending_bytes(&self) -> usize {
        self.lines.pending_len()
    }

    /// Feed a chunk of raw input. Complete lines are transformed and written;
    /// a trailing fragment waits for the next chunk or [`Self::finish`].
    pub async fn accept(&mut self, chunk: &[u8]) -> Result<()> {
        self.ensure_open()?;
        let result = self.accept_lines(chunk).await;
        self.settle(result).await
    }

    /// Write the pending fragment as a final line, close the open part
    /// durably and return every part key in order.
    pub async fn finish(&mut self) -> Result<Vec<String>> {
        if matches!(self.status, Status::Finalized) {
            return Ok(self.parts.clone());
        }
        self.ensure_open()?;
        let result = self.finish_parts().await;
        self.settle(result).await?;

        self.status = Status::Finalized;
        info!(
            writer = %self.name,
            parts = self.parts.len(),
            "Chunked writer finished"
        );
        Ok(self.parts.clone())
    }

    fn ensure_open(&self) -> Result<()> {
        match &self.status {
            Status::Open => Ok(()),
            Status::Failed(err) => Err(err.clone()),
            Status::Finalized => Err(PipeError::terminated(&self.name, "writer already finalized")),
            Status::Destroyed(_) => Err(PipeError::terminated(&self.name, "writer destroyed")),
        }
    }

    /// Any error is fatal: the open part is aborted, closed parts stay.
    async fn settle<T>(&mut self, result: Result<T>) -> Result<T> {
        if let Err(err) = &result {
            warn!(writer = %self.name, part = self.part.index, error = %err, "Chunked writer failed");
            self.abort_part().await;
            self.status = Status::Failed(err.clone());
        }
        result
    }

    async fn accept_lines(&mut self, chunk: &[u8]) -> Result<()> {
        self.lines.push(chunk);
        while let Some(line) = self.lines.next_line() {
            self.write_line(line).await?;
        }
        self.flush().await
    }

    async fn finish_parts(&mut self) -> Result<()> {
        if let Some(rest) = self.lines.take_remainder() {
            self.write_line(rest).await?;
        }
        self.close_part().await
    }

    async fn write_line(&mut self, line: Bytes) -> Result<()> {
        let line = match self.config.transform_mut() {
            None => line,
            Some(transform) => {
                let text = String::from_utf8_lossy(&line);
                match transform.apply(&text) {
                    Some(mapped) => Bytes::from(mapped),
                    None => return Ok(()),
                }
            }
        };

        let len = line.len() as u64 + 1;
        // Rotation counts lines, not bytes: a header-only part is empty, so
        // its first line stays with the header even when the two together
        // exceed the cap.
        if self.part.lines > 0 && self.part.bytes + len > self.config.max_part_bytes {
            self.rotate().await?;
        }

        self.part.buffer.extend_from_slice(&line);
        self.part.buffer.extend_from_slice(b"\n");
        self.part.bytes += len;
        self.part.lines += 1;

        if self.part.buffer.len() >= FLUSH_THRESHOLD {
            self.flush().await?;
        }
        Ok(())
    }

    async fn rotate(&mut self) -> Result<()> {
        debug!(
            writer = %self.name,
            part = self.part.index,
            bytes = self.part.bytes,
            lines = self.part.lines,
            "Rotating part"
        );
        self.close_part().await?;
        self.open_next_part().await
    }

    async fn open_next_part(&mut self) -> Result<()> {
        let index = self.part.index + 1;
        let handle = self.store.open(&self.config.part_key(index)).await?;
        let key = handle.key().to_string();
        info!(writer = %self.name, part = index, key = %key, "Creating new part");

        self.parts.push(key);
        self.part.index = index;
        self.part.bytes = 0;
        self.part.lines = 0;
        self.part.handle = Some(handle);

        if let Some(header) = self.config.header_for(index) {
            self.part.bytes = header.len() as u64;
            self.part.buffer.extend_from_slice(header.as_bytes());
        }
        Ok(())
    }

    async fn flush(&mut self) -> Result<()> {
        if self.part.buffer.is_empty() {
            return Ok(());
        }
        let data = self.part.buffer.split().freeze();
        match self.part.handle.as_mut() {
            Some(handle) => handle.write(data).await,
            None => Err(PipeError::terminated(&self.name, "no open part")),
        }
    }

    async fn close_part(&mut self) -> Result<()> {
        self.flush().await?;
        if let Some(mut handle) = self.part.handle.take() {
            handle.close().await?;
            debug!(
                writer = %self.name,
                key = handle.key(),
                bytes = self.part.bytes,
                "Closed part"
            );
        }
        Ok(())
    }

    async fn abort_part(&mut self) {
        self.part.buffer.clear();
        self.lines.clear();
        if let Some(mut handle) = self.part.handle.take() {
            if let Err(err) = handle.abort().await {
                warn!(writer = %self.name, key = handle.key(), error = %err, "Failed to abort part");
            }
        }
    }
}

#[async_trait]
impl Sink for ChunkedWriter {
    fn name(&self) -> &str {
        &self.name
    }

    async fn write(&mut self, chunk: Bytes) -> Result<bool> {
        self.accept(&chunk).await?;
        Ok(true)
    }

    async fn drained(&mut self) -> Result<()> {
        Ok(())
    }

    async fn finalize(&mut self) -> Result<()> {
        self.finish().await.map(|_| ())
    }

    async fn destroy(&mut self, error: &PipeError) {
        if matches!(self.status, Status::Finalized | Status::Destroyed(_)) {
            return;
        }
        debug!(writer = %self.name, error = %error, "Destroying chunked writer");
        self.abort_part().await;
        self.status = Status::Destroyed(error.clone());
    }

    fn is_terminated(&self) -> bool {
        !matches!(self.status, Status::Open)
    }

    fn failure(&self) -> Option<PipeError> {
        match &self.status {
            Status::Failed(err) | Status::Destroyed(err) => Some(err.clone()),
            Status::Open | Status::Finalized => None,
        }
    }
}
