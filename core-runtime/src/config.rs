//! # Core Configuration Module
//!
//! Provides configuration management for the CPTV decoder core.
//!
//! ## Overview
//!
//! The configuration system uses a builder pattern to construct a `CoreConfig`
//! instance that holds the injected host capabilities and the tuning knobs of
//! the decoder. It enforces fail-fast validation so a missing engine is
//! reported at startup rather than on the first decode.
//!
//! ## Required Dependencies
//!
//! - `EngineFactory` - creates the opaque CPTV decoding engine
//!
//! ## Optional Dependencies (with platform defaults)
//!
//! - `HttpClient` - streaming GETs for network sources (desktop default: reqwest)
//!
//! When the `desktop-shims` feature is enabled, the reqwest-backed client is
//! injected automatically if none is provided. Without it, network sources
//! fail with a transport error while buffer and file sources keep working.
//!
//! ## Usage
//!
//! ```ignore
//! use core_runtime::config::CoreConfig;
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! let config = CoreConfig::builder()
//!     .engine_factory(Arc::new(MyEngineFactory))
//!     .idle_timeout(Duration::from_secs(5))
//!     .build()?;
//! ```

use crate::error::{Error, Result};
use bridge_traits::{EngineFactory, HttpClient};
use core_async::time::Duration;
use std::sync::Arc;

/// Idle period after which the decoder worker is shut down.
pub const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_secs(2);

/// Chunk size used when wrapping in-memory buffers.
pub const DEFAULT_BUFFER_CHUNK_SIZE: usize = 100_000;

/// Pixel width of the sensor variant that legitimately repeats time-on values.
pub const DEFAULT_FIXED_SIZE_SENSOR_WIDTH: u32 = 32;

pub const DEFAULT_WORKER_THREAD_NAME: &str = "cptv-decoder-worker";

/// Core configuration for the CPTV decoder.
///
/// Use [`CoreConfigBuilder`] to construct instances.
#[derive(Clone)]
pub struct CoreConfig {
    /// Creates a fresh decoding engine per session (required)
    pub engine_factory: Arc<dyn EngineFactory>,

    /// HTTP client for network sources (optional with desktop default)
    pub http_client: Option<Arc<dyn HttpClient>>,

    /// Worker idle shutdown delay; zero keeps the worker alive until `close`
    pub idle_timeout: Duration,

    /// Maximum chunk size for buffer sources; zero selects the default
    /// five-part split
    pub buffer_max_chunk_size: usize,

    /// Drop frames whose time-on value repeats the previous frame's
    pub suppress_repeated_frames: bool,

    /// Frames of this width are never treated as repeats
    pub fixed_size_sensor_width: u32,

    /// Name of the dedicated decoder thread
    pub worker_thread_name: String,
}

impl std::fmt::Debug for CoreConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CoreConfig")
            .field("engine_factory", &"EngineFactory { ... }")
            .field(
                "http_client",
                &self.http_client.as_ref().map(|_| "HttpClient { ... }"),
            )
            .field("idle_timeout", &self.idle_timeout)
            .field("buffer_max_chunk_size", &self.buffer_max_chunk_size)
            .field("suppress_repeated_frames", &self.suppress_repeated_frames)
            .field("fixed_size_sensor_width", &self.fixed_size_sensor_width)
            .field("worker_thread_name", &self.worker_thread_name)
            .finish()
    }
}

impl CoreConfig {
    /// Creates a new builder for constructing a `CoreConfig`.
    pub fn builder() -> CoreConfigBuilder {
        CoreConfigBuilder::default()
    }

    /// Validates the configuration and returns an error if invalid.
    pub fn validate(&self) -> Result<()> {
        if self.worker_thread_name.trim().is_empty() {
            return Err(Error::Config(
                "Worker thread name cannot be empty".to_string(),
            ));
        }

        Ok(())
    }
}

fn engine_factory_missing_error() -> Error {
    Error::CapabilityMissing {
        capability: "EngineFactory".to_string(),
        message: "An EngineFactory is required to decode CPTV streams. \
                 Inject the host's CPTV decoding engine with .engine_factory()."
            .to_string(),
    }
}

#[cfg(feature = "desktop-shims")]
fn provide_default_http_client() -> Result<Option<Arc<dyn HttpClient>>> {
    use bridge_desktop::ReqwestHttpClient;

    let client: Arc<dyn HttpClient> = Arc::new(ReqwestHttpClient::new()?);
    Ok(Some(client))
}

#[cfg(not(feature = "desktop-shims"))]
fn provide_default_http_client() -> Result<Option<Arc<dyn HttpClient>>> {
    tracing::debug!("No HttpClient injected; network sources are unavailable");
    Ok(None)
}

/// Builder for constructing [`CoreConfig`] instances.
///
/// Use this builder to incrementally set configuration options and then
/// call [`build()`](CoreConfigBuilder::build) to create the final config.
#[derive(Default)]
pub struct CoreConfigBuilder {
    engine_factory: Option<Arc<dyn EngineFactory>>,
    http_client: Option<Arc<dyn HttpClient>>,
    idle_timeout: Option<Duration>,
    buffer_max_chunk_size: Option<usize>,
    suppress_repeated_frames: Option<bool>,
    fixed_size_sensor_width: Option<u32>,
    worker_thread_name: Option<String>,
}

impl CoreConfigBuilder {
    /// Sets the decoding engine factory (required).
    pub fn engine_factory(mut self, factory: Arc<dyn EngineFactory>) -> Self {
        self.engine_factory = Some(factory);
        self
    }

    /// Sets the HTTP client implementation.
    ///
    /// If not provided, the desktop default (reqwest-based) will be used when
    /// the `desktop-shims` feature is enabled.
    pub fn http_client(mut self, client: Arc<dyn HttpClient>) -> Self {
        self.http_client = Some(client);
        self
    }

    /// Sets how long the worker may sit idle before it is shut down.
    ///
    /// Default: 2 seconds. `Duration::ZERO` disables idle shutdown.
    pub fn idle_timeout(mut self, timeout: Duration) -> Self {
        self.idle_timeout = Some(timeout);
        self
    }

    /// Sets the chunk size used when feeding in-memory buffers.
    ///
    /// Default: 100 000 bytes.
    pub fn buffer_max_chunk_size(mut self, size: usize) -> Self {
        self.buffer_max_chunk_size = Some(size);
        self
    }

    /// Enables or disables repeated-frame suppression. Default: enabled.
    pub fn suppress_repeated_frames(mut self, enabled: bool) -> Self {
        self.suppress_repeated_frames = Some(enabled);
        self
    }

    /// Sets the frame width exempt from repeated-frame suppression.
    ///
    /// Default: 32.
    pub fn fixed_size_sensor_width(mut self, width: u32) -> Self {
        self.fixed_size_sensor_width = Some(width);
        self
    }

    /// Sets the decoder thread name. Default: `cptv-decoder-worker`.
    pub fn worker_thread_name(mut self, name: impl Into<String>) -> Self {
        self.worker_thread_name = Some(name.into());
        self
    }

    /// Builds the configuration.
    ///
    /// # Errors
    ///
    /// - [`Error::CapabilityMissing`] if no engine factory was provided
    /// - [`Error::Config`] if a setting is invalid
    /// - [`Error::Bridge`] if the default HTTP client cannot be created
    pub fn build(self) -> Result<CoreConfig> {
        let engine_factory = self
            .engine_factory
            .ok_or_else(engine_factory_missing_error)?;

        let http_client = match self.http_client {
            Some(client) => Some(client),
            None => provide_default_http_client()?,
        };

        let config = CoreConfig {
            engine_factory,
            http_client,
            idle_timeout: self.idle_timeout.unwrap_or(DEFAULT_IDLE_TIMEOUT),
            buffer_max_chunk_size: self
                .buffer_max_chunk_size
                .unwrap_or(DEFAULT_BUFFER_CHUNK_SIZE),
            suppress_repeated_frames: self.suppress_repeated_frames.unwrap_or(true),
            fixed_size_sensor_width: self
                .fixed_size_sensor_width
                .unwrap_or(DEFAULT_FIXED_SIZE_SENSOR_WIDTH),
            worker_thread_name: self
                .worker_thread_name
                .unwrap_or_else(|| DEFAULT_WORKER_THREAD_NAME.to_string()),
        };

        config.validate()?;

        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use bridge_traits::error::Result as BridgeResult;
    use bridge_traits::{
        CptvHeader, DecodingEngine, EngineError, EngineStep, FrameStep, HttpRequest,
        StreamingResponse,
    };
    use mockall::mock;

    struct InertEngine;

    impl DecodingEngine for InertEngine {
        fn ingest(&mut self, _chunk: &[u8]) -> bool {
            true
        }
        fn end_of_input(&mut self) {}
        fn parse_header(&mut self) -> std::result::Result<EngineStep<CptvHeader>, EngineError> {
            Ok(EngineStep::NeedMoreData)
        }
        fn decode_next_frame(
            &mut self,
        ) -> std::result::Result<EngineStep<FrameStep>, EngineError> {
            Ok(EngineStep::NeedMoreData)
        }
        fn scan_to_end(&mut self) -> std::result::Result<EngineStep<u32>, EngineError> {
            Ok(EngineStep::NeedMoreData)
        }
        fn total_frames(&self) -> Option<u32> {
            None
        }
        fn release(&mut self) {}
    }

    fn factory() -> Arc<dyn EngineFactory> {
        Arc::new(|| Box::new(InertEngine) as Box<dyn DecodingEngine>)
    }

    mock! {
        Client {}

        #[async_trait]
        impl HttpClient for Client {
            async fn open_stream(&self, request: HttpRequest) -> BridgeResult<StreamingResponse>;
        }
    }

    #[test]
    fn test_builder_requires_engine_factory() {
        let result = CoreConfig::builder().build();

        let err_msg = result.unwrap_err().to_string();
        assert!(err_msg.contains("EngineFactory"));
        assert!(err_msg.contains(".engine_factory()"));
    }

    #[test]
    fn test_builder_defaults() {
        let config = CoreConfig::builder()
            .engine_factory(factory())
            .build()
            .unwrap();

        assert_eq!(config.idle_timeout, Duration::from_secs(2));
        assert_eq!(config.buffer_max_chunk_size, 100_000);
        assert!(config.suppress_repeated_frames);
        assert_eq!(config.fixed_size_sensor_width, 32);
        assert_eq!(config.worker_thread_name, "cptv-decoder-worker");

        #[cfg(feature = "desktop-shims")]
        assert!(config.http_client.is_some());
        #[cfg(not(feature = "desktop-shims"))]
        assert!(config.http_client.is_none());
    }

    #[test]
    fn test_builder_overrides() {
        let config = CoreConfig::builder()
            .engine_factory(factory())
            .http_client(Arc::new(MockClient::new()))
            .idle_timeout(Duration::ZERO)
            .buffer_max_chunk_size(0)
            .suppress_repeated_frames(false)
            .fixed_size_sensor_width(160)
            .worker_thread_name("thermal")
            .build()
            .unwrap();

        assert!(config.http_client.is_some());
        assert_eq!(config.idle_timeout, Duration::ZERO);
        assert_eq!(config.buffer_max_chunk_size, 0);
        assert!(!config.suppress_repeated_frames);
        assert_eq!(config.fixed_size_sensor_width, 160);
        assert_eq!(config.worker_thread_name, "thermal");
    }

    #[test]
    fn test_validate_rejects_blank_thread_name() {
        let result = CoreConfig::builder()
            .engine_factory(factory())
            .worker_thread_name("  ")
            .build();

        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn test_debug_hides_capabilities() {
        let config = CoreConfig::builder()
            .engine_factory(factory())
            .build()
            .unwrap();

        let rendered = format!("{:?}", config);
        assert!(rendered.contains("EngineFactory { ... }"));
        assert!(rendered.contains("idle_timeout"));
    }
}
