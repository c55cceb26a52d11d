//! Output buffer queue.
//!
//! Rendered output is a FIFO of immutable [`Bytes`] chunks. The consumer
//! never receives ownership of the bytes: it borrows the unread part of the
//! front chunk, writes as much as it can, and advances. A chunk is dropped
//! the moment its last byte is consumed.

use std::collections::VecDeque;

use bytes::{Buf, Bytes};

use crate::error::{Error, Result};

/// FIFO of rendered chunks with a read cursor into the front chunk.
#[derive(Debug, Default)]
pub struct BufferQueue {
    chunks: VecDeque<Bytes>,
    buffered: usize,
}

impl BufferQueue {
    /// Creates an empty queue.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a chunk. Empty chunks are ignored.
    pub fn push(&mut self, chunk: Bytes) {
        if chunk.is_empty() {
            return;
        }
        self.buffered += chunk.len();
        self.chunks.push_back(chunk);
    }

    /// Unread bytes of the front chunk, or `None` when the queue is empty.
    #[must_use]
    pub fn front(&self) -> Option<&[u8]> {
        self.chunks.front().map(Bytes::as_ref)
    }

    /// Number of unread bytes in the front chunk.
    #[must_use]
    pub fn front_len(&self) -> usize {
        self.chunks.front().map_or(0, Bytes::len)
    }

    /// Consumes `n` bytes of the front chunk.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidUsage`] if `n` exceeds [`BufferQueue::front_len`].
    pub fn advance(&mut self, n: usize) -> Result<()> {
        let available = self.front_len();
        if n > available {
            return Err(Error::invalid_usage(format!(
                "cannot advance by {n} bytes, {available} available"
            )));
        }
        if n == 0 {
            return Ok(());
        }

        self.buffered -= n;
        if n == available {
            self.chunks.pop_front();
        } else if let Some(front) = self.chunks.front_mut() {
            front.advance(n);
        }
        Ok(())
    }

    /// Total unread bytes across all chunks.
    #[must_use]
    pub const fn buffered(&self) -> usize {
        self.buffered
    }

    /// Number of chunks still holding unread bytes.
    #[must_use]
    pub fn chunk_count(&self) -> usize {
        self.chunks.len()
    }

    /// Returns true if nothing is left to read.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    /// Drops every buffered chunk.
    pub fn clear(&mut self) {
        self.chunks.clear();
        self.buffered = 0;
    }
}
