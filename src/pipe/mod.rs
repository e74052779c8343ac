//! Streaming plumbing: sources, sinks and the fan-out driver.
//!
//! A [`Source`] produces an ordered sequence of byte chunks. A [`Sink`]
//! accepts them with explicit backpressure: `write` reports saturation and
//! `drained` resolves once the sink can take more. [`FanOutPipe`] replicates
//! one source into any number of sinks and owns their shared lifecycle.

mod buffered;
mod fanout;
mod source;

pub use buffered::{BufferedSink, DEFAULT_HIGH_WATER_MARK};
pub use fanout::{close_all, FanOutPipe, PipeOptions, PipeState, PipeSummary};
pub use source::{ReaderSource, StreamSource, DEFAULT_CHUNK_SIZE};

use async_trait::async_trait;
use bytes::Bytes;

use crate::error::{PipeError, Result};

/// Producer of an ordered, terminating sequence of data chunks.
#[async_trait]
pub trait Source: Send {
    /// Next chunk, `Ok(None)` once the stream has ended.
    async fn next_chunk(&mut self) -> Result<Option<Bytes>>;

    /// Abort the source. Later reads fail.
    async fn destroy(&mut self, error: &PipeError);
}

/// Durable write target with explicit flow control.
#[async_trait]
pub trait Sink: Send {
    /// Label used in logs and error targets.
    fn name(&self) -> &str;

    /// Accept a chunk. `Ok(false)` means the sink is saturated and the caller
    /// must wait for [`Sink::drained`] before writing again.
    async fn write(&mut self, chunk: Bytes) -> Result<bool>;

    /// Resolves once a saturated sink can accept data again.
    async fn drained(&mut self) -> Result<()>;

    /// Flush everything and close durably.
    async fn finalize(&mut self) -> Result<()>;

    /// Abort immediately, discarding anything not yet committed. Must be
    /// idempotent and a no-op on a finalized sink.
    async fn destroy(&mut self, error: &PipeError);

    /// True once the sink was finalized or destroyed, or has already
    /// returned its failure to the caller.
    fn is_terminated(&self) -> bool;

    /// Error that ended the sink, when it was destroyed or failed rather
    /// than finalized.
    fn failure(&self) -> Option<PipeError> {
        None
    }
}

#[async_trait]
impl<S: Sink + ?Sized> Sink for Box<S> {
    fn name(&self) -> &str {
        (**self).name()
    }

    async fn write(&mut self, chunk: Bytes) -> Result<bool> {
        (**self).write(chunk).await
    }

    async fn drained(&mut self) -> Result<()> {
        (**self).drained().await
    }

    async fn finalize(&mut self) -> Result<()> {
        (**self).finalize().await
    }

    async fn destroy(&mut self, error: &PipeError) {
        (**self).destroy(error).await
    }

    fn is_terminated(&self) -> bool {
        (**self).is_terminated()
    }

    fn failure(&self) -> Option<PipeError> {
        (**self).failure()
    }
}
