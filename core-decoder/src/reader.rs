//! # Byte Sources
//!
//! The session pulls bytes one chunk at a time, only when the engine asks for
//! more. Network bodies and in-memory buffers both implement [`ByteSource`],
//! so the session never needs to know where its bytes come from.

use async_trait::async_trait;
use bridge_traits::ByteStream;
use bytes::Bytes;
use futures::StreamExt;
use tracing::trace;

use crate::error::{DecodeError, Result};

/// Number of parts a buffer is split into when no chunk size is given.
pub const DEFAULT_PART_COUNT: usize = 5;

/// One step of a sequential read.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ReadChunk {
    pub bytes: Bytes,
    /// No bytes follow this chunk.
    pub done: bool,
}

/// Sequential, asynchronously readable source of CPTV bytes.
#[async_trait]
pub trait ByteSource: Send {
    /// Returns the next chunk. Callers stop once `done` is observed.
    async fn read(&mut self) -> Result<ReadChunk>;

    /// Discards any remaining state. Safe to call repeatedly.
    async fn cancel(&mut self);
}

// ============================================================================
// ChunkedByteReader
// ============================================================================

/// Presents a resident buffer as a chunked stream.
///
/// Boundaries are `ceil(i * len / parts)` for `i` in `0..parts`, followed by
/// `len` itself, so every byte is delivered exactly once even when `len` does
/// not divide evenly.
#[derive(Debug)]
pub struct ChunkedByteReader {
    bytes: Bytes,
    offsets: Vec<usize>,
    cursor: usize,
}

impl ChunkedByteReader {
    /// Splits `bytes` into `ceil(len / max_chunk_size)` parts, or into
    /// [`DEFAULT_PART_COUNT`] parts when `max_chunk_size` is zero.
    pub fn new(bytes: impl Into<Bytes>, max_chunk_size: usize) -> Self {
        let bytes = bytes.into();
        let len = bytes.len();
        let parts = if max_chunk_size == 0 {
            DEFAULT_PART_COUNT
        } else {
            len.div_ceil(max_chunk_size)
        };

        let mut offsets: Vec<usize> = (0..parts).map(|i| (i * len).div_ceil(parts)).collect();
        offsets.push(len);

        Self {
            bytes,
            offsets,
            cursor: 0,
        }
    }

    /// Number of chunks the buffer was split into.
    pub fn parts(&self) -> usize {
        self.offsets.len() - 1
    }

    pub fn offsets(&self) -> &[usize] {
        &self.offsets
    }

    pub fn is_done(&self) -> bool {
        self.cursor + 1 >= self.offsets.len()
    }
}

#[async_trait]
impl ByteSource for ChunkedByteReader {
    async fn read(&mut self) -> Result<ReadChunk> {
        // Reading past the end yields an empty final chunk.
        if self.is_done() {
            return Ok(ReadChunk {
                bytes: Bytes::new(),
                done: true,
            });
        }

        self.cursor += 1;
        let start = self.offsets[self.cursor - 1];
        let end = self.offsets[self.cursor];
        trace!(start, end, part = self.cursor, "buffer chunk");

        Ok(ReadChunk {
            bytes: self.bytes.slice(start..end),
            done: self.is_done(),
        })
    }

    async fn cancel(&mut self) {
        self.bytes = Bytes::new();
        self.offsets = vec![0];
        self.cursor = 0;
    }
}

// ============================================================================
// NetworkByteReader
// ============================================================================

/// Reads an HTTP response body as it arrives.
pub struct NetworkByteReader {
    body: Option<ByteStream>,
}

impl NetworkByteReader {
    pub fn new(body: ByteStream) -> Self {
        Self { body: Some(body) }
    }
}

impl std::fmt::Debug for NetworkByteReader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NetworkByteReader")
            .field("open", &self.body.is_some())
            .finish()
    }
}

#[async_trait]
impl ByteSource for NetworkByteReader {
    async fn read(&mut self) -> Result<ReadChunk> {
        let Some(body) = self.body.as_mut() else {
            return Ok(ReadChunk {
                bytes: Bytes::new(),
                done: true,
            });
        };

        match body.next().await {
            Some(Ok(bytes)) => Ok(ReadChunk { bytes, done: false }),
            Some(Err(e)) => Err(DecodeError::Io(e.to_string())),
            None => {
                self.body = None;
                Ok(ReadChunk {
                    bytes: Bytes::new(),
                    done: true,
                })
            }
        }
    }

    async fn cancel(&mut self) {
        // Dropping the body aborts the transfer.
        self.body = None;
    }
}
