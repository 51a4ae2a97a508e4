//! Decoding Engine Abstraction
//!
//! The engine is the opaque component that understands CPTV bytes. It owns a
//! single mutable read position, so callers must never drive it from two
//! places at once; the decoding session serializes every call behind its gate.
//!
//! ## Data flow
//!
//! The engine never performs I/O. Whenever an operation cannot complete with
//! the bytes ingested so far it answers [`EngineStep::NeedMoreData`]; the
//! session then reads the next chunk from its byte source, calls
//! [`DecodingEngine::ingest`], and retries. When the source is exhausted the
//! session calls [`DecodingEngine::end_of_input`]; from then on an engine must
//! resolve every operation (success, end of stream, or error) instead of
//! asking for more data.
//!
//! ```text
//! session ──parse_header()──▶ engine ──NeedMoreData──▶ session
//!    ▲                                                   │
//!    └──────── ingest(chunk) ◀── ByteSource::read() ◀────┘
//! ```

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::cptv::{CptvFrame, CptvHeader};

/// Outcome of an engine operation that may need more input.
#[derive(Debug, Clone, PartialEq)]
pub enum EngineStep<T> {
    Ready(T),
    NeedMoreData,
}

/// Result of asking for the next frame.
#[derive(Debug, Clone, PartialEq)]
pub enum FrameStep {
    Frame(CptvFrame),
    /// No frames remain; the engine now knows the total frame count.
    EndOfStream,
}

/// Failure reported by the engine while interpreting the container.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[error("{message}")]
pub struct EngineError {
    pub message: String,
}

impl EngineError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Stateful CPTV decoder with one read cursor.
pub trait DecodingEngine: Send {
    /// Append bytes to the engine's input. Returns `false` if the engine
    /// refused them (for example after `release`).
    fn ingest(&mut self, chunk: &[u8]) -> bool;

    /// Signal that no more bytes will be ingested.
    fn end_of_input(&mut self);

    /// Parse the container header from the bytes seen so far.
    fn parse_header(&mut self) -> Result<EngineStep<CptvHeader>, EngineError>;

    /// Decode the frame after the last one returned.
    fn decode_next_frame(&mut self) -> Result<EngineStep<FrameStep>, EngineError>;

    /// Walk to the end of the stream discarding payloads, returning the total
    /// number of frames. Frame reads are meaningless afterwards.
    fn scan_to_end(&mut self) -> Result<EngineStep<u32>, EngineError>;

    /// Total frame count, known only once the stream has been fully walked.
    fn total_frames(&self) -> Option<u32>;

    /// Free engine resources. Must tolerate repeated calls.
    fn release(&mut self);
}

/// Creates a fresh engine for every new decoding session.
pub trait EngineFactory: Send + Sync {
    fn create(&self) -> Box<dyn DecodingEngine>;
}

impl<F> EngineFactory for F
where
    F: Fn() -> Box<dyn DecodingEngine> + Send + Sync,
{
    fn create(&self) -> Box<dyn DecodingEngine> {
        self()
    }
}
