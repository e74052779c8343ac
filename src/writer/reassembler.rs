// Line reassembly across arbitrary chunk boundaries.

use bytes::{Bytes, BytesMut};

/// Buffers raw chunks and hands out complete lines.
///
/// Between calls the pending buffer never contains a newline: every complete
/// line has been handed out, only the trailing fragment remains.
#[derive(Debug, Default)]
pub(crate) struct LineReassembler {
    pending: BytesMut,
    // Prefix of `pending` already known to contain no newline.
    scanned: usize,
}

impl LineReassembler {
    pub fn push(&mut self, chunk: &[u8]) {
        self.pending.extend_from_slice(chunk);
    }

    /// Next complete line, without its `\n` terminator.
    pub fn next_line(&mut self) -> Option<Bytes> {
        match self.pending[self.scanned..].iter().position(|b| *b == b'\n') {
            Some(offset) => {
                let end = self.scanned + offset;
                let mut line = self.pending.split_to(end + 1);
                line.truncate(end);
                self.scanned = 0;
                Some(line.freeze())
            }
            None => {
                self.scanned = self.pending.len();
                None
            }
        }
    }

    /// Take the unterminated trailing fragment, if any.
    pub fn take_remainder(&mut self) -> Option<Bytes> {
        self.scanned = 0;
        if self.pending.is_empty() {
            None
        } else {
            Some(self.pending.split().freeze())
        }
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    pub fn clear(&mut self) {
        self.pending.clear();
        self.scanned = 0;
    }
}
