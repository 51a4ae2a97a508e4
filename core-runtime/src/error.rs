use bridge_traits::BridgeError;
use thiserror::Error;

/// Failures raised while assembling or starting the runtime.
#[derive(Error, Debug)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(String),

    /// A required host capability was not injected.
    #[error("Capability missing: {capability} - {message}")]
    CapabilityMissing { capability: String, message: String },

    /// A default platform capability could not be constructed.
    #[error("Bridge error: {0}")]
    Bridge(#[from] BridgeError),

    #[error("Logging error: {0}")]
    Logging(String),
}

pub type Result<T> = std::result::Result<T, Error>;
