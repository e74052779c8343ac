//! chunkpipe - stream line-oriented exports into size-bounded parts
//!
//! One input stream is fanned out to any number of destinations. Each
//! destination reassembles lines across chunk boundaries, optionally maps
//! them, and writes them into parts no larger than a configured cap, without
//! ever splitting a line. Parts land on the local filesystem, S3 or R2
//! through OpenDAL.
//!
//! ```no_run
//! use std::sync::Arc;
//! use chunkpipe::pipe::{FanOutPipe, ReaderSource, Sink};
//! use chunkpipe::writer::{ChunkedWriter, ChunkedWriterConfig, OperatorStore};
//!
//! # async fn example(op: opendal::Operator) -> chunkpipe::Result<()> {
//! let store = Arc::new(OperatorStore::new(op));
//! let mut a = ChunkedWriter::create(ChunkedWriterConfig::new("a"), store.clone()).await?;
//! let mut b = ChunkedWriter::create(
//!     ChunkedWriterConfig::new("b").with_max_part_bytes(1024),
//!     store,
//! )
//! .await?;
//!
//! let mut source = ReaderSource::open("master.txt", 64 * 1024).await?;
//! FanOutPipe::default()
//!     .drive(&mut source, &mut [&mut a as &mut dyn Sink, &mut b])
//!     .await?;
//! println!("{:?} {:?}", a.parts(), b.parts());
//! # Ok(())
//! # }
//! ```

// Allow large error types - rich diagnostic messages are more valuable on error paths.
#![allow(clippy::result_large_err)]

pub mod config;
pub mod error;
pub mod pipe;
pub mod runner;
pub mod template;
pub mod transform;
pub mod writer;

mod init;

pub use error::{ErrorCode, PipeError, Result};
pub use init::{init_tracing, log_storage};
pub use runner::{run_with_config, run_with_store, DestinationReport, RunReport};
