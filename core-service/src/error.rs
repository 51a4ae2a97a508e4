use core_decoder::DecodeError;
use thiserror::Error;

/// Failures of the message channel itself, as opposed to decoding failures
/// reported by the worker.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ChannelError {
    #[error("Failed to start decoder worker: {0}")]
    SpawnFailed(String),

    #[error("Decoder worker stopped before replying")]
    WorkerStopped,

    #[error("Decoder worker answered {expected} with {actual}")]
    TagMismatch { expected: String, actual: String },
}

#[derive(Error, Debug)]
pub enum CoreError {
    #[error("Configuration error: {0}")]
    Runtime(#[from] core_runtime::Error),

    #[error(transparent)]
    Decode(#[from] DecodeError),

    #[error("Channel error: {0}")]
    Channel(#[from] ChannelError),
}

impl CoreError {
    /// The decoding error, when this is one.
    pub fn as_decode(&self) -> Option<&DecodeError> {
        match self {
            CoreError::Decode(err) => Some(err),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, CoreError>;
