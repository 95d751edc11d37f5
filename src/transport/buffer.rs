//! Receive buffer for links that deliver replies in bounded reads.
//!
//! A VISA read returns at most the requested number of bytes and stops
//! early at the end of a message, so a short read marks the message as
//! complete. Until then the buffer keeps asking for more, no matter how
//! many bytes are still waiting to be consumed.

use std::io::{self, Read};

/// Read at most `size` bytes from `reader` in a single call.
pub(crate) fn read_chunk<R: Read + ?Sized>(reader: &mut R, size: usize) -> io::Result<Vec<u8>> {
    let mut chunk = vec![0u8; size];
    let n = reader.read(&mut chunk)?;
    chunk.truncate(n);
    Ok(chunk)
}

#[derive(Debug)]
pub(crate) struct ReceiveBuffer {
    bytes: Vec<u8>,
    chunk_size: usize,
    message_complete: bool,
}

impl ReceiveBuffer {
    pub(crate) fn new(chunk_size: usize) -> Self {
        Self {
            bytes: Vec::new(),
            chunk_size,
            message_complete: true,
        }
    }

    pub(crate) fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    /// A command went out; the instrument may start a new message.
    pub(crate) fn start_message(&mut self) {
        self.message_complete = false;
    }

    /// Whether another read may return more of the current message.
    pub(crate) fn needs_fill(&self) -> bool {
        !self.message_complete
    }

    /// Append one read. A short read ends the message.
    pub(crate) fn push(&mut self, chunk: &[u8]) {
        if chunk.len() < self.chunk_size {
            self.message_complete = true;
        }
        self.bytes.extend_from_slice(chunk);
    }

    pub(crate) fn len(&self) -> usize {
        self.bytes.len()
    }

    /// Next `\n`-terminated line, or the unterminated tail of a complete
    /// message. Trailing whitespace is stripped.
    pub(crate) fn take_line(&mut self) -> Option<String> {
        let line: Vec<u8> = match self.bytes.iter().position(|&b| b == b'\n') {
            Some(end) => self.bytes.drain(..=end).collect(),
            None if self.message_complete && !self.bytes.is_empty() => {
                std::mem::take(&mut self.bytes)
            }
            None => return None,
        };
        Some(String::from_utf8_lossy(&line).trim_end().to_string())
    }

    /// Exactly `count` bytes, if that many are buffered.
    pub(crate) fn take(&mut self, count: usize) -> Option<Vec<u8>> {
        (self.bytes.len() >= count).then(|| self.bytes.drain(..count).collect())
    }

    pub(crate) fn clear(&mut self) {
        self.bytes.clear();
        self.message_complete = true;
    }
}
