//! HTTP Client Abstraction
//!
//! Provides a streaming GET used to read remote CPTV files chunk by chunk.

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use futures::stream::{Stream, StreamExt};
use serde::de::DeserializeOwned;
use std::collections::HashMap;
use std::pin::Pin;
use std::time::Duration;

use crate::error::{BridgeError, Result};

/// A body that arrives incrementally.
pub type ByteStream = Pin<Box<dyn Stream<Item = Result<Bytes>> + Send>>;

/// HTTP method types
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpMethod {
    Get,
    Head,
}

/// HTTP request builder
#[derive(Debug, Clone)]
pub struct HttpRequest {
    pub method: HttpMethod,
    pub url: String,
    pub headers: HashMap<String, String>,
    pub timeout: Option<Duration>,
}

impl HttpRequest {
    pub fn new(method: HttpMethod, url: impl Into<String>) -> Self {
        Self {
            method,
            url: url.into(),
            headers: HashMap::new(),
            timeout: None,
        }
    }

    pub fn get(url: impl Into<String>) -> Self {
        Self::new(HttpMethod::Get, url)
    }

    pub fn header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(key.into(), value.into());
        self
    }

    pub fn timeout(mut self, duration: Duration) -> Self {
        self.timeout = Some(duration);
        self
    }
}

/// Fully buffered HTTP response
#[derive(Debug)]
pub struct HttpResponse {
    pub status: u16,
    pub headers: HashMap<String, String>,
    pub body: Bytes,
}

impl HttpResponse {
    /// Parse response body as JSON
    pub fn json<T: DeserializeOwned>(&self) -> Result<T> {
        serde_json::from_slice(&self.body).map_err(|e| {
            BridgeError::OperationFailed(format!("JSON deserialization failed: {}", e))
        })
    }

    /// Get response body as UTF-8 string
    pub fn text(&self) -> Result<String> {
        String::from_utf8(self.body.to_vec())
            .map_err(|e| BridgeError::OperationFailed(format!("Invalid UTF-8: {}", e)))
    }

    /// Check if response status is successful (2xx)
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Response whose body has not been read yet.
pub struct StreamingResponse {
    pub status: u16,
    pub headers: HashMap<String, String>,
    pub body: ByteStream,
}

impl StreamingResponse {
    /// Exactly `200 OK`; partial content and redirects are not a decodable body.
    pub fn is_ok(&self) -> bool {
        self.status == 200
    }

    /// Case-insensitive header lookup.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    /// Declared body length, when the server sent a parseable `Content-Length`.
    pub fn content_length(&self) -> Option<u64> {
        self.header("content-length")
            .and_then(|value| value.trim().parse().ok())
    }

    /// Drain the body into a buffered response (used for error bodies).
    pub async fn into_response(mut self) -> Result<HttpResponse> {
        let mut body = BytesMut::new();
        while let Some(chunk) = self.body.next().await {
            body.extend_from_slice(&chunk?);
        }
        Ok(HttpResponse {
            status: self.status,
            headers: self.headers,
            body: body.freeze(),
        })
    }
}

impl std::fmt::Debug for StreamingResponse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamingResponse")
            .field("status", &self.status)
            .field("headers", &self.headers)
            .field("body", &"ByteStream { ... }")
            .finish()
    }
}

/// Retry policy configuration
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Maximum number of attempts to get response headers
    pub max_attempts: u32,
    /// Base delay between retries
    pub base_delay: Duration,
    /// Maximum delay between retries
    pub max_delay: Duration,
    /// Whether to use exponential backoff
    pub use_exponential_backoff: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(5),
            use_exponential_backoff: true,
        }
    }
}

impl RetryPolicy {
    /// A policy that tries exactly once.
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }

    /// Delay before retry number `attempt` (1-based).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        if self.use_exponential_backoff {
            let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
            self.base_delay.saturating_mul(factor).min(self.max_delay)
        } else {
            self.base_delay
        }
    }
}

/// Async HTTP client trait
///
/// Only streaming reads are needed: the decoder pulls the body lazily, one
/// chunk per engine request for more data. Implementations retry connection
/// failures before the first byte; once a body is streaming, stalls surface
/// as the stream's own stall.
///
/// # Example
///
/// ```ignore
/// use bridge_traits::http::{HttpClient, HttpRequest};
///
/// async fn open(client: &dyn HttpClient) -> bridge_traits::error::Result<()> {
///     let response = client.open_stream(HttpRequest::get("https://example.com/clip.cptv")).await?;
///     println!("status {}", response.status);
///     Ok(())
/// }
/// ```
#[async_trait]
pub trait HttpClient: Send + Sync {
    /// Send the request and return as soon as response headers arrive.
    ///
    /// Non-success statuses are returned as responses, not errors, so the
    /// caller can read the server's error body.
    async fn open_stream(&self, request: HttpRequest) -> Result<StreamingResponse>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::stream;

    fn streaming(status: u16, headers: &[(&str, &str)], chunks: Vec<&'static [u8]>) -> StreamingResponse {
        let body = stream::iter(chunks.into_iter().map(|c| Ok(Bytes::from_static(c))));
        StreamingResponse {
            status,
            headers: headers
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
            body: Box::pin(body),
        }
    }

    #[test]
    fn test_http_request_builder() {
        let request = HttpRequest::get("https://example.com/clip.cptv")
            .header("User-Agent", "test")
            .timeout(Duration::from_secs(30));

        assert_eq!(request.method, HttpMethod::Get);
        assert_eq!(request.url, "https://example.com/clip.cptv");
        assert_eq!(request.headers.get("User-Agent"), Some(&"test".to_string()));
        assert_eq!(request.timeout, Some(Duration::from_secs(30)));
    }

    #[test]
    fn test_content_length_is_case_insensitive() {
        let response = streaming(200, &[("Content-Length", " 4096 ")], vec![]);
        assert_eq!(response.content_length(), Some(4096));
        assert!(response.is_ok());

        let missing = streaming(206, &[("content-type", "application/x-cptv")], vec![]);
        assert_eq!(missing.content_length(), None);
        assert!(!missing.is_ok());
    }

    #[core_async::test]
    async fn test_into_response_collects_chunks() {
        let response = streaming(403, &[], vec![b"{\"mess", b"age\":\"expired\"}"]);
        let buffered = response.into_response().await.unwrap();

        assert!(!buffered.is_success());
        let value: serde_json::Value = buffered.json().unwrap();
        assert_eq!(value["message"], "expired");
    }

    #[test]
    fn test_retry_delay_backs_off_and_caps() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.delay_for(1), Duration::from_millis(100));
        assert_eq!(policy.delay_for(2), Duration::from_millis(200));
        assert_eq!(policy.delay_for(30), Duration::from_secs(5));
        assert_eq!(RetryPolicy::none().max_attempts, 1);
    }
}
