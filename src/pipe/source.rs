// Source adapters over tokio readers and futures streams.

use std::io;
use std::path::Path;

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use futures::{Stream, StreamExt};
use tokio::io::{AsyncRead, AsyncReadExt};

use super::Source;
use crate::error::{PipeError, Result};

/// Default read size for [`ReaderSource`].
pub const DEFAULT_CHUNK_SIZE: usize = 64 * 1024;

/// Reads fixed-size chunks from any tokio reader.
pub struct ReaderSource<R> {
    reader: Option<R>,
    chunk_size: usize,
    destroyed: Option<PipeError>,
}

impl<R> ReaderSource<R>
where
    R: AsyncRead + Unpin + Send,
{
    pub fn new(reader: R) -> Self {
        Self::with_chunk_size(reader, DEFAULT_CHUNK_SIZE)
    }

    pub fn with_chunk_size(reader: R, chunk_size: usize) -> Self {
        Self {
            reader: Some(reader),
            chunk_size: chunk_size.max(1),
            destroyed: None,
        }
    }
}

impl ReaderSource<tokio::fs::File> {
    /// Open a local file as a source.
    pub async fn open(path: impl AsRef<Path>, chunk_size: usize) -> Result<Self> {
        let path = path.as_ref();
        let file = tokio::fs::File::open(path).await.map_err(|e| {
            PipeError::source(format!("failed to open '{}': {}", path.display(), e))
        })?;
        Ok(Self::with_chunk_size(file, chunk_size))
    }
}

impl ReaderSource<tokio::io::Stdin> {
    pub fn stdin(chunk_size: usize) -> Self {
        Self::with_chunk_size(tokio::io::stdin(), chunk_size)
    }
}

#[async_trait]
impl<R> Source for ReaderSource<R>
where
    R: AsyncRead + Unpin + Send,
{
    async fn next_chunk(&mut self) -> Result<Option<Bytes>> {
        if let Some(err) = &self.destroyed {
            return Err(PipeError::source(format!("source destroyed: {}", err)));
        }
        let Some(reader) = self.reader.as_mut() else {
            return Ok(None);
        };

        let mut buf = BytesMut::with_capacity(self.chunk_size);
        let read = match reader.read_buf(&mut buf).await {
            Ok(read) => read,
            Err(e) => {
                // An error terminates the sequence.
                self.reader = None;
                return Err(PipeError::source(e));
            }
        };
        if read == 0 {
            self.reader = None;
            return Ok(None);
        }
        Ok(Some(buf.freeze()))
    }

    async fn destroy(&mut self, error: &PipeError) {
        self.reader = None;
        self.destroyed = Some(error.clone());
    }
}

/// Adapts a stream of byte results into a [`Source`].
pub struct StreamSource<S> {
    stream: Option<S>,
    destroyed: Option<PipeError>,
}

impl<S> StreamSource<S>
where
    S: Stream<Item = io::Result<Bytes>> + Unpin + Send,
{
    pub fn new(stream: S) -> Self {
        Self {
            stream: Some(stream),
            destroyed: None,
        }
    }
}

#[async_trait]
impl<S> Source for StreamSource<S>
where
    S: Stream<Item = io::Result<Bytes>> + Unpin + Send,
{
    async fn next_chunk(&mut self) -> Result<Option<Bytes>> {
        if let Some(err) = &self.destroyed {
            return Err(PipeError::source(format!("source destroyed: {}", err)));
        }
        let Some(stream) = self.stream.as_mut() else {
            return Ok(None);
        };

        match stream.next().await {
            Some(Ok(chunk)) => Ok(Some(chunk)),
            Some(Err(e)) => {
                // An error terminates the sequence.
                self.stream = None;
                Err(PipeError::source(e))
            }
            None => {
                self.stream = None;
                Ok(None)
            }
        }
    }

    async fn destroy(&mut self, error: &PipeError) {
        self.stream = None;
        self.destroyed = Some(error.clone());
    }
}
