//! # CPTV Decoding Session
//!
//! Drives an opaque [`DecodingEngine`](bridge_traits::DecodingEngine) over a
//! network stream or an in-memory buffer.
//!
//! ## Overview
//!
//! This crate handles:
//! - Adapting buffers and HTTP bodies into one chunked [`ByteSource`] contract
//! - Serializing every engine-touching operation behind an exclusive gate
//! - The session state machine: load, header, frames, full scan, release
//! - Sensor-specific repeated-frame suppression ([`FrameRepeatPolicy`])
//!
//! ```text
//! EMPTY ─init─▶ LOADING ─▶ READY ─get_header─▶ HEADER_FETCHED ─get_next_frame─▶ STREAMING
//!                  │                                                              │
//!                  └──────────────▶ ERROR ◀──────── engine failure ───────────────┤
//!                                                         count_total_frames ─▶ CONSUMED
//! any state ─free─▶ CLOSED
//! ```

pub mod config;
pub mod error;
pub mod policy;
pub mod reader;
pub mod session;

#[cfg(any(test, feature = "test-util"))]
pub mod testing;

pub use config::SessionConfig;
pub use error::{DecodeError, Result};
pub use policy::FrameRepeatPolicy;
pub use reader::{ByteSource, ChunkedByteReader, NetworkByteReader, ReadChunk};
pub use session::{CptvMetadata, DecodingSession, SessionState, SourceKind};
