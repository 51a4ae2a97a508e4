//! # Decode Error Types
//!
//! Errors are plain values: they are recorded on the session, replayed on
//! later queries, and cross the worker boundary, so they are `Clone` and
//! serializable. `Display` yields the message shown to callers.

use bridge_traits::EngineError;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "detail", rename_all = "camelCase")]
pub enum DecodeError {
    /// A session operation was called before any initialisation.
    #[error("You need to initialise the player with the url of a CPTV file")]
    NotInitialized,

    /// The server answered with a non-success status. `message` is the
    /// server's own explanation, or its raw body.
    #[error("{message}")]
    Transport { url: String, message: String },

    /// The source could not be opened or primed.
    #[error("{0}")]
    Source(String),

    /// The engine could not interpret the container header.
    #[error("{0}")]
    Parse(String),

    /// The engine failed while decoding or scanning frames.
    #[error("{0}")]
    Stream(String),

    /// Frame-level access after a full-stream scan.
    #[error("Stream has already been consumed and discarded")]
    StreamConsumed,

    /// The source ended while the engine still wanted bytes.
    #[error("CPTV stream ended unexpectedly")]
    TruncatedStream,

    /// Reading from the underlying source failed.
    #[error("I/O error: {0}")]
    Io(String),
}

impl DecodeError {
    pub fn parse(err: EngineError) -> Self {
        DecodeError::Parse(err.message)
    }

    pub fn stream(err: EngineError) -> Self {
        DecodeError::Stream(err.message)
    }
}

pub type Result<T> = std::result::Result<T, DecodeError>;
