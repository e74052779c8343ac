//! Chunked part writer.
//!
//! Turns a raw byte stream into newline-terminated lines and writes them into
//! size-bounded parts on a [`PartStore`], never splitting a line.

mod chunked;
mod config;
mod reassembler;
mod storage;
mod store;

pub use chunked::ChunkedWriter;
pub use config::{ChunkedWriterConfig, FilenameFn, HeaderFn, LineTransform, DEFAULT_MAX_PART_BYTES};
pub use storage::{build_operator, open_store};
pub use store::{OperatorStore, PartHandle, PartStore};
