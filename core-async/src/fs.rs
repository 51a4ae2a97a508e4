//! Async filesystem helpers re-exported from the underlying runtime.
//!
//! Only whole-file reads are needed: a local CPTV file is loaded into memory
//! and then served through the same chunked reader used for buffers.

pub use tokio::fs::{metadata, read};
