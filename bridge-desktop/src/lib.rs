//! # Desktop Bridge Implementations
//!
//! Default implementations of bridge traits for desktop platforms
//! (macOS, Windows, Linux).
//!
//! ## Overview
//!
//! - `HttpClient` using `reqwest`, streaming response bodies chunk by chunk
//!
//! The decoding engine is always supplied by the host; there is no desktop
//! default for it.
//!
//! ## Usage
//!
//! ```ignore
//! use bridge_desktop::ReqwestHttpClient;
//! use std::sync::Arc;
//!
//! let http_client = Arc::new(ReqwestHttpClient::new()?);
//! // Hand it to CoreConfig::builder().http_client(http_client)
//! ```

mod http;

pub use http::ReqwestHttpClient;
