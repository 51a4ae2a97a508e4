use thiserror::Error;

/// Failure inside a host capability.
#[derive(Error, Debug)]
pub enum BridgeError {
    /// The capability could not be constructed on this host.
    #[error("Bridge capability not available: {0}")]
    NotAvailable(String),

    #[error("Bridge operation failed: {0}")]
    OperationFailed(String),
}

pub type Result<T> = std::result::Result<T, BridgeError>;
