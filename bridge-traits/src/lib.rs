//! # Host Bridge Traits
//!
//! Capability contracts the decoder core requires from its host.
//!
//! ## Overview
//!
//! The orchestration core never touches sockets or the CPTV bit layout itself.
//! It is handed two capabilities:
//!
//! - [`HttpClient`](http::HttpClient) - opens a streaming GET for remote CPTV files
//! - [`EngineFactory`](engine::EngineFactory) - creates the opaque, stateful
//!   [`DecodingEngine`](engine::DecodingEngine) that understands CPTV bytes
//!
//! The value objects the engine hands back ([`CptvHeader`](cptv::CptvHeader),
//! [`CptvFrameHeader`](cptv::CptvFrameHeader), [`CptvFrame`](cptv::CptvFrame))
//! live here too, so every crate shares one definition.
//!
//! ## Platform Requirements
//!
//! | Capability | Desktop implementation | Notes |
//! |------------|------------------------|-------|
//! | `HttpClient` | `bridge-desktop::ReqwestHttpClient` | optional, network sources only |
//! | `EngineFactory` | supplied by the host | required |
//!
//! ## Thread Safety
//!
//! Factories and clients are `Send + Sync`; engines are `Send` because they
//! are created on the caller side and driven on the decoder's own thread.

pub mod cptv;
pub mod engine;
pub mod error;
pub mod http;

pub use error::BridgeError;

// Re-export commonly used types
pub use cptv::{CptvFrame, CptvFrameHeader, CptvHeader, ImageData};
pub use engine::{DecodingEngine, EngineError, EngineFactory, EngineStep, FrameStep};
pub use http::{ByteStream, HttpClient, HttpMethod, HttpRequest, HttpResponse, StreamingResponse};
