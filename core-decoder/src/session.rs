//! # Decoding Session
//!
//! One session wraps one decoding engine over one source. Every operation that
//! reads from or advances the engine holds the session's
//! [`ExclusiveAccessGate`] for its whole critical section, so concurrent
//! callers are served strictly in arrival order.
//!
//! ## Ownership
//!
//! The live engine and its byte source sit in a slot. A gated operation takes
//! them out, drives the engine (awaiting reads as needed), and puts them back.
//! `free` bumps a generation counter; an operation that finishes after its
//! session was freed releases what it holds instead of restoring it.
//!
//! Queries that do not touch the engine (`get_load_progress`,
//! `get_total_frames`, `has_stream_error`) never wait on the gate and return
//! "unknown" while it is held.

use std::sync::Arc;

use bridge_traits::{
    CptvFrame, CptvFrameHeader, CptvHeader, DecodingEngine, EngineError, EngineFactory,
    EngineStep, FrameStep, HttpClient, HttpRequest,
};
use bytes::Bytes;
use core_async::ExclusiveAccessGate;
use core_runtime::logging::{redact_url, strip_path};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};

use crate::config::SessionConfig;
use crate::error::{DecodeError, Result};
use crate::reader::{ByteSource, ChunkedByteReader, NetworkByteReader, ReadChunk};

// ============================================================================
// Public Types
// ============================================================================

/// Lifecycle of a decoding session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SessionState {
    /// Never initialised.
    Empty,
    /// Opening and priming a source.
    Loading,
    /// Source primed, header not read yet.
    Ready,
    HeaderFetched,
    /// At least one frame delivered.
    Streaming,
    /// Fully scanned for its frame count; frame reads are no longer valid.
    Consumed,
    /// An error was recorded; see [`DecodingSession::stream_error`].
    Error,
    /// Released by `free`.
    Closed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SourceKind {
    Network,
    Buffer,
}

/// Header fields plus the derived frame count and duration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CptvMetadata {
    /// `total_frames` is always populated here.
    #[serde(flatten)]
    pub header: CptvHeader,
    /// Seconds; zero when the header reports no frame rate.
    pub duration: f64,
}

impl CptvMetadata {
    pub fn total_frames(&self) -> u32 {
        self.header.total_frames.unwrap_or(0)
    }
}

// ============================================================================
// Internal State
// ============================================================================

struct LiveStream {
    engine: Box<dyn DecodingEngine>,
    source: Box<dyn ByteSource>,
    /// `end_of_input` has been signalled.
    exhausted: bool,
    bytes_consumed: u64,
}

impl LiveStream {
    /// Stops the source; the engine is released when `self` drops.
    async fn shutdown(mut self) {
        self.source.cancel().await;
    }
}

// A stream can also be dropped with its task, for example when the worker
// runtime shuts down mid-read.
impl Drop for LiveStream {
    fn drop(&mut self) {
        self.engine.release();
    }
}

struct Status {
    generation: u64,
    state: SessionState,
    source_kind: Option<SourceKind>,
    expected_size: u64,
    frames_read: u32,
    prev_frame_header: Option<CptvFrameHeader>,
    header: Option<CptvHeader>,
    stream_error: Option<DecodeError>,
    consumed: bool,
}

impl Status {
    fn new() -> Self {
        Self {
            generation: 0,
            state: SessionState::Empty,
            source_kind: None,
            expected_size: 0,
            frames_read: 0,
            prev_frame_header: None,
            header: None,
            stream_error: None,
            consumed: false,
        }
    }

    /// Clears every per-source field and invalidates in-flight operations.
    fn reset(&mut self, state: SessionState) {
        *self = Self {
            generation: self.generation + 1,
            state,
            ..Self::new()
        };
    }

    /// Fails fast for operations that need an initialised, healthy stream.
    fn check_usable(&self) -> Result<()> {
        if let Some(err) = &self.stream_error {
            return Err(err.clone());
        }
        match self.state {
            SessionState::Empty | SessionState::Closed | SessionState::Loading => {
                Err(DecodeError::NotInitialized)
            }
            _ => Ok(()),
        }
    }
}

// ============================================================================
// DecodingSession
// ============================================================================

/// State machine around one decoding engine.
pub struct DecodingSession {
    factory: Arc<dyn EngineFactory>,
    http_client: Option<Arc<dyn HttpClient>>,
    config: SessionConfig,
    gate: ExclusiveAccessGate,
    stream: Mutex<Option<LiveStream>>,
    status: Mutex<Status>,
}

impl DecodingSession {
    pub fn new(
        factory: Arc<dyn EngineFactory>,
        http_client: Option<Arc<dyn HttpClient>>,
        config: SessionConfig,
    ) -> Self {
        Self {
            factory,
            http_client,
            config,
            gate: ExclusiveAccessGate::new(),
            stream: Mutex::new(None),
            status: Mutex::new(Status::new()),
        }
    }

    pub fn state(&self) -> SessionState {
        self.status.lock().state
    }

    pub fn source_kind(&self) -> Option<SourceKind> {
        self.status.lock().source_kind
    }

    /// Frames delivered to callers so far.
    pub fn frames_read(&self) -> u32 {
        self.status.lock().frames_read
    }

    // ------------------------------------------------------------------------
    // Initialisation
    // ------------------------------------------------------------------------

    /// Opens `url` and primes the engine with the first chunk of its body.
    ///
    /// `size` is only used for progress reporting; without it the
    /// `Content-Length` header is used, and failing that progress is unknown.
    #[instrument(skip(self, url), fields(url = %redact_url(url)))]
    pub async fn init_with_url(&self, url: &str, size: Option<u64>) -> Result<()> {
        self.free().await;
        let _permit = self.gate.acquire().await;
        let generation = self.begin_loading(SourceKind::Network);

        let opened = self.open_network(url, size).await;
        let (source, expected_size) = match opened {
            Ok(opened) => opened,
            Err(err) => {
                warn!(error = %err, "Failed to open CPTV url");
                self.record_error(generation, err.clone());
                return Err(err);
            }
        };

        self.prime(generation, source, expected_size)
            .await
            .map_err(|err| load_failure("url", url, err))
    }

    /// Wraps a resident buffer and primes the engine with its first chunk.
    ///
    /// `file_name` only appears in error messages.
    #[instrument(skip(self, bytes, file_name), fields(len = bytes.len(), file = %strip_path(file_name)))]
    pub async fn init_with_bytes(&self, bytes: Bytes, file_name: &str) -> Result<()> {
        self.free().await;
        let _permit = self.gate.acquire().await;
        let generation = self.begin_loading(SourceKind::Buffer);

        let expected_size = bytes.len() as u64;
        let reader = ChunkedByteReader::new(bytes, self.config.buffer_max_chunk_size);
        debug!(parts = reader.parts(), "Buffer split into chunks");

        self.prime(generation, Box::new(reader), expected_size)
            .await
            .map_err(|err| load_failure("file", file_name, err))
    }

    fn begin_loading(&self, kind: SourceKind) -> u64 {
        let mut status = self.status.lock();
        status.reset(SessionState::Loading);
        status.source_kind = Some(kind);
        debug!(generation = status.generation, ?kind, "Session loading");
        status.generation
    }

    async fn open_network(
        &self,
        url: &str,
        size: Option<u64>,
    ) -> Result<(Box<dyn ByteSource>, u64)> {
        let client = self.http_client.as_ref().ok_or_else(|| {
            DecodeError::Source(format!(
                "Failed to load CPTV url {}, no HTTP client configured",
                url
            ))
        })?;

        let response = client
            .open_stream(HttpRequest::get(url))
            .await
            .map_err(|e| DecodeError::Source(format!("Failed to load CPTV url {}, {}", url, e)))?;

        if !response.is_ok() {
            let status = response.status;
            let body = response
                .into_response()
                .await
                .map(|r| r.body)
                .unwrap_or_default();
            let message = transport_message(&body);
            warn!(status, message = %message, "CPTV url answered with an error");
            return Err(DecodeError::Transport {
                url: url.to_string(),
                message,
            });
        }

        let expected_size = size
            .filter(|s| *s > 0)
            .or_else(|| response.content_length())
            .unwrap_or(0);

        let source: Box<dyn ByteSource> = Box::new(NetworkByteReader::new(response.body));
        Ok((source, expected_size))
    }

    /// Creates the engine, feeds it the first chunk and installs the stream.
    async fn prime(
        &self,
        generation: u64,
        mut source: Box<dyn ByteSource>,
        expected_size: u64,
    ) -> Result<()> {
        let mut engine = self.factory.create();

        let first = match feed_first_chunk(engine.as_mut(), source.as_mut()).await {
            Ok(first) => first,
            Err(err) => {
                source.cancel().await;
                engine.release();
                self.record_error(generation, err.clone());
                return Err(err);
            }
        };

        let live = LiveStream {
            engine,
            source,
            exhausted: first.done,
            bytes_consumed: first.bytes.len() as u64,
        };

        let stale = {
            let mut status = self.status.lock();
            if status.generation == generation {
                status.state = SessionState::Ready;
                status.expected_size = expected_size;
                *self.stream.lock() = Some(live);
                None
            } else {
                Some(live)
            }
        };

        match stale {
            Some(live) => {
                debug!("Session freed while loading; discarding stream");
                live.shutdown().await;
                Err(DecodeError::NotInitialized)
            }
            None => {
                info!(expected_size, "Session ready");
                Ok(())
            }
        }
    }

    // ------------------------------------------------------------------------
    // Gated Operations
    // ------------------------------------------------------------------------

    /// Returns the container header, parsing it on first use.
    #[instrument(skip(self))]
    pub async fn get_header(&self) -> Result<CptvHeader> {
        if let Some(header) = self.cached_header()? {
            return Ok(header);
        }

        let _permit = self.gate.acquire().await;
        if let Some(header) = self.cached_header()? {
            return Ok(header);
        }
        let (generation, mut live) = self.checkout()?;

        let result = Self::drive(
            &mut live,
            |engine| engine.parse_header(),
            DecodeError::parse,
        )
        .await;
        self.checkin(generation, live).await;

        let mut status = self.status.lock();
        if status.generation != generation {
            return Err(DecodeError::NotInitialized);
        }
        match result {
            Ok(header) => {
                debug!(
                    width = header.width,
                    height = header.height,
                    fps = header.fps,
                    recorded_at = ?header.recorded_at(),
                    "Header parsed"
                );
                status.header = Some(header.clone());
                if status.state == SessionState::Ready {
                    status.state = SessionState::HeaderFetched;
                }
                Ok(header)
            }
            Err(err) => {
                warn!(error = %err, "Header parse failed");
                Self::fail(&mut status, err.clone());
                Err(err)
            }
        }
    }

    fn cached_header(&self) -> Result<Option<CptvHeader>> {
        let status = self.status.lock();
        if let Some(header) = &status.header {
            return Ok(Some(header.clone()));
        }
        status.check_usable()?;
        if status.consumed {
            return Err(DecodeError::StreamConsumed);
        }
        Ok(None)
    }

    /// Decodes the next frame.
    ///
    /// `Ok(None)` means no frame is available: the stream has ended, the
    /// frame carried no samples, or it was suppressed as a spurious repeat.
    #[instrument(skip(self))]
    pub async fn get_next_frame(&self) -> Result<Option<CptvFrame>> {
        self.check_frame_access()?;

        let _permit = self.gate.acquire().await;
        self.check_frame_access()?;
        let (generation, mut live) = self.checkout()?;

        let result = Self::drive(
            &mut live,
            |engine| engine.decode_next_frame(),
            DecodeError::stream,
        )
        .await;
        let total_known = live.engine.total_frames().is_some();
        self.checkin(generation, live).await;

        let mut status = self.status.lock();
        if status.generation != generation {
            return Err(DecodeError::NotInitialized);
        }

        let frame = match result {
            Ok(FrameStep::Frame(frame)) => frame,
            Ok(FrameStep::EndOfStream) => {
                debug!(frames_read = status.frames_read, "End of stream");
                return Ok(None);
            }
            Err(err) => {
                warn!(error = %err, frames_read = status.frames_read, "Frame decode failed");
                Self::fail(&mut status, err.clone());
                return Err(err);
            }
        };

        let policy = self.config.repeat_policy;
        if policy.applies_to(&frame.meta) {
            let spurious = policy.is_spurious_repeat(
                status.prev_frame_header.as_ref(),
                &frame.meta,
                total_known,
            );
            status.prev_frame_header = Some(frame.meta.clone());
            if spurious {
                debug!(time_on_ms = frame.meta.time_on_ms, "Suppressed repeated frame");
                return Ok(None);
            }
        }

        if frame.is_empty() {
            return Ok(None);
        }

        status.frames_read += 1;
        if matches!(
            status.state,
            SessionState::Ready | SessionState::HeaderFetched
        ) {
            status.state = SessionState::Streaming;
        }
        Ok(Some(frame))
    }

    fn check_frame_access(&self) -> Result<()> {
        let status = self.status.lock();
        if let Err(err) = status.check_usable() {
            if err == DecodeError::NotInitialized {
                warn!("{}", err);
            }
            return Err(err);
        }
        if status.consumed {
            warn!("{}", DecodeError::StreamConsumed);
            return Err(DecodeError::StreamConsumed);
        }
        Ok(())
    }

    /// Scans the rest of the stream to learn its frame count.
    ///
    /// Frame payloads are discarded, so the session is consumed afterwards:
    /// further frame reads fail with [`DecodeError::StreamConsumed`].
    #[instrument(skip(self))]
    pub async fn count_total_frames(&self) -> Result<u32> {
        if let Some(total) = self.consumed_total()? {
            return Ok(total);
        }

        let _permit = self.gate.acquire().await;
        if let Some(total) = self.consumed_total()? {
            return Ok(total);
        }
        let (generation, mut live) = self.checkout()?;

        let result = Self::drive(
            &mut live,
            |engine| engine.scan_to_end(),
            DecodeError::stream,
        )
        .await;
        self.checkin(generation, live).await;

        let mut status = self.status.lock();
        if status.generation != generation {
            return Err(DecodeError::NotInitialized);
        }
        status.consumed = true;
        match result {
            Ok(total) => {
                info!(total, "Stream scanned to end");
                status.state = SessionState::Consumed;
                Ok(total)
            }
            Err(err) => {
                warn!(error = %err, "Frame count scan failed");
                Self::fail(&mut status, err.clone());
                Err(err)
            }
        }
    }

    fn consumed_total(&self) -> Result<Option<u32>> {
        {
            let status = self.status.lock();
            status.check_usable()?;
            if !status.consumed {
                return Ok(None);
            }
        }
        Ok(self.known_total())
    }

    /// Header plus frame count and duration.
    ///
    /// Uses the header's embedded count when present; otherwise the stream is
    /// scanned, which consumes it.
    #[instrument(skip(self))]
    pub async fn get_metadata(&self) -> Result<CptvMetadata> {
        let mut header = self.get_header().await?;

        let total = match header.total_frames {
            Some(total) if total > 0 => total,
            _ => self.count_total_frames().await?,
        };
        let duration = if header.fps == 0 {
            0.0
        } else {
            total as f64 / header.fps as f64
        };

        header.total_frames = Some(total);
        Ok(CptvMetadata { header, duration })
    }

    // ------------------------------------------------------------------------
    // Queries
    // ------------------------------------------------------------------------

    /// Total frame count once the stream has been fully walked.
    ///
    /// After a stream error this is the number of frames delivered before the
    /// failure. `None` while unknown or while an operation holds the gate.
    pub fn get_total_frames(&self) -> Option<u32> {
        {
            let status = self.status.lock();
            if status.stream_error.is_some() {
                return Some(status.frames_read);
            }
        }
        if self.gate.is_locked() {
            return None;
        }
        self.known_total()
    }

    fn known_total(&self) -> Option<u32> {
        self.stream
            .lock()
            .as_ref()
            .and_then(|live| live.engine.total_frames())
    }

    /// Fraction of the expected bytes the engine has pulled so far.
    ///
    /// This tracks lazy reads, not network transfer. `None` while locked,
    /// after an error, or when the expected size is unknown.
    pub fn get_load_progress(&self) -> Option<f64> {
        if self.gate.is_locked() {
            return None;
        }
        let expected = {
            let status = self.status.lock();
            if status.stream_error.is_some() || status.expected_size == 0 {
                return None;
            }
            status.expected_size
        };
        let consumed = self.stream.lock().as_ref()?.bytes_consumed;
        Some((consumed as f64 / expected as f64).clamp(0.0, 1.0))
    }

    pub fn has_stream_error(&self) -> bool {
        self.status.lock().stream_error.is_some()
    }

    pub fn stream_error(&self) -> Option<DecodeError> {
        self.status.lock().stream_error.clone()
    }

    /// Releases the engine and source and clears all session fields.
    ///
    /// Safe to call at any time, including when nothing was initialised. An
    /// operation already holding the engine finishes first and then discards
    /// it.
    #[instrument(skip(self))]
    pub async fn free(&self) {
        let live = {
            let mut status = self.status.lock();
            if status.state != SessionState::Empty {
                status.reset(SessionState::Closed);
            }
            self.stream.lock().take()
        };

        if let Some(live) = live {
            debug!("Releasing decoding engine");
            live.shutdown().await;
        }
    }

    // ------------------------------------------------------------------------
    // Engine Plumbing
    // ------------------------------------------------------------------------

    fn checkout(&self) -> Result<(u64, LiveStream)> {
        let status = self.status.lock();
        let live = self
            .stream
            .lock()
            .take()
            .ok_or(DecodeError::NotInitialized)?;
        Ok((status.generation, live))
    }

    async fn checkin(&self, generation: u64, live: LiveStream) {
        let stale = {
            let status = self.status.lock();
            if status.generation == generation {
                *self.stream.lock() = Some(live);
                None
            } else {
                Some(live)
            }
        };
        if let Some(live) = stale {
            debug!("Session was freed mid-operation; discarding engine");
            live.shutdown().await;
        }
    }

    /// Runs `op` until the engine stops asking for data, feeding it one chunk
    /// per request.
    async fn drive<T>(
        live: &mut LiveStream,
        mut op: impl FnMut(&mut dyn DecodingEngine) -> std::result::Result<EngineStep<T>, EngineError>,
        on_error: fn(EngineError) -> DecodeError,
    ) -> Result<T> {
        loop {
            match op(live.engine.as_mut()).map_err(on_error)? {
                EngineStep::Ready(value) => return Ok(value),
                EngineStep::NeedMoreData if live.exhausted => {
                    return Err(DecodeError::TruncatedStream)
                }
                EngineStep::NeedMoreData => {
                    let chunk = live.source.read().await?;
                    live.bytes_consumed += chunk.bytes.len() as u64;
                    if !chunk.bytes.is_empty() && !live.engine.ingest(&chunk.bytes) {
                        return Err(DecodeError::Stream(
                            "decoder rejected the stream data".to_string(),
                        ));
                    }
                    if chunk.done {
                        live.engine.end_of_input();
                        live.exhausted = true;
                    }
                }
            }
        }
    }

    fn record_error(&self, generation: u64, err: DecodeError) {
        let mut status = self.status.lock();
        if status.generation == generation {
            Self::fail(&mut status, err);
        }
    }

    fn fail(status: &mut Status, err: DecodeError) {
        status.stream_error = Some(err);
        status.state = SessionState::Error;
    }
}

impl std::fmt::Debug for DecodingSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let status = self.status.lock();
        f.debug_struct("DecodingSession")
            .field("state", &status.state)
            .field("source_kind", &status.source_kind)
            .field("frames_read", &status.frames_read)
            .field("locked", &self.gate.is_locked())
            .field("waiting", &self.gate.waiting())
            .finish()
    }
}

/// Pulls the first chunk into a new engine. A refusal means the bytes are not
/// a container this engine understands.
async fn feed_first_chunk(
    engine: &mut dyn DecodingEngine,
    source: &mut dyn ByteSource,
) -> Result<ReadChunk> {
    let first = source.read().await?;
    if !first.bytes.is_empty() && !engine.ingest(&first.bytes) {
        return Err(DecodeError::Parse("Unrecognised CPTV stream".to_string()));
    }
    if first.done {
        engine.end_of_input();
    }
    Ok(first)
}

/// Wraps a priming failure in the message returned from `init_*`. The raw
/// error stays recorded on the session.
fn load_failure(kind: &str, name: &str, err: DecodeError) -> DecodeError {
    match err {
        DecodeError::NotInitialized | DecodeError::Transport { .. } | DecodeError::Source(_) => err,
        other => DecodeError::Source(format!(
            "Failed to load CPTV {} {}, {}",
            kind, name, other
        )),
    }
}

/// Extracts the server's explanation from an error response body.
///
/// JSON bodies yield the last entry of `messages`, then `message`, then
/// "Unknown error". Anything else is returned as text.
fn transport_message(body: &[u8]) -> String {
    match serde_json::from_slice::<serde_json::Value>(body) {
        Ok(json) => json
            .get("messages")
            .and_then(|m| m.as_array())
            .and_then(|m| m.last())
            .and_then(|m| m.as_str())
            .or_else(|| json.get("message").and_then(|m| m.as_str()))
            .unwrap_or("Unknown error")
            .to_string(),
        Err(_) => String::from_utf8_lossy(body).into_owned(),
    }
}
