//! Core service façade for CPTV decoding.
//!
//! [`CptvDecoder`] is what host applications hold. Every call is one round trip
//! to a dedicated decoder worker (see [`channel`]), which owns the decoding
//! session and its engine. The worker is started on first use and stopped
//! after an idle period, or explicitly with [`CptvDecoder::close`].
//!
//! ```ignore
//! use core_runtime::config::CoreConfig;
//! use core_service::CptvDecoder;
//!
//! let decoder =
//!     CptvDecoder::from_builder(CoreConfig::builder().engine_factory(engine_factory))?;
//! decoder.init_with_url("https://example.com/clip.cptv").await?;
//! while let Some(frame) = decoder.get_next_frame().await? {
//!     render(&frame);
//! }
//! decoder.close().await;
//! ```

pub mod channel;
pub mod error;
pub mod protocol;
mod worker;

pub use channel::ExecutionContextChannel;
pub use error::{ChannelError, CoreError, Result};
pub use protocol::{Request, RequestId, Response};

pub use bridge_traits::{CptvFrame, CptvFrameHeader, CptvHeader};
pub use core_decoder::{CptvMetadata, DecodeError};
pub use core_runtime::config::{CoreConfig, CoreConfigBuilder};

use std::path::Path;

use bytes::Bytes;
use core_runtime::logging::{redact_url, strip_path};
use tracing::{instrument, warn};

/// Decodes one CPTV recording at a time on a background worker.
///
/// Initialising again replaces the current recording. Calls that need a
/// recording fail with [`DecodeError::NotInitialized`] until one is loaded.
#[derive(Debug)]
pub struct CptvDecoder {
    channel: ExecutionContextChannel,
}

impl CptvDecoder {
    pub fn new(config: CoreConfig) -> Self {
        Self {
            channel: ExecutionContextChannel::new(config),
        }
    }

    /// Validates `builder` and creates a decoder from the result.
    pub fn from_builder(builder: CoreConfigBuilder) -> Result<Self> {
        Ok(Self::new(builder.build()?))
    }

    /// Streams the recording at `url`; its size is taken from
    /// `Content-Length` when the server sends one.
    #[instrument(skip(self, url), fields(url = %redact_url(url)))]
    pub async fn init_with_url(&self, url: &str) -> Result<()> {
        match self
            .call(Request::InitWithUrl {
                url: url.to_string(),
            })
            .await?
        {
            Response::InitWithUrl(result) => Ok(result?),
            other => Err(unexpected("initWithUrl", other)),
        }
    }

    /// Streams the recording at `url`, using `size` (bytes) for progress.
    /// A size of zero means unknown.
    #[instrument(skip(self, url), fields(url = %redact_url(url)))]
    pub async fn init_with_url_and_size(&self, url: &str, size: u64) -> Result<()> {
        match self
            .call(Request::InitWithUrlAndSize {
                url: url.to_string(),
                size: Some(size),
            })
            .await?
        {
            Response::InitWithUrlAndSize(result) => Ok(result?),
            other => Err(unexpected("initWithUrlAndSize", other)),
        }
    }

    /// Decodes a recording already in memory. `file_name` appears in errors.
    #[instrument(skip(self, bytes, file_name), fields(file = %strip_path(file_name)))]
    pub async fn init_with_file_bytes(
        &self,
        bytes: impl Into<Bytes>,
        file_name: &str,
    ) -> Result<()> {
        match self
            .call(Request::InitWithLocalCptvFile {
                bytes: bytes.into(),
                file_name: file_name.to_string(),
            })
            .await?
        {
            Response::InitWithLocalCptvFile(result) => Ok(result?),
            other => Err(unexpected("initWithLocalCptvFile", other)),
        }
    }

    /// Reads a recording from disk and decodes it from memory.
    pub async fn init_with_file(&self, path: impl AsRef<Path>) -> Result<()> {
        let (bytes, file_name) = read_recording(path.as_ref()).await?;
        self.init_with_file_bytes(bytes, &file_name).await
    }

    /// Loads `bytes` and returns its metadata. The loaded recording is left
    /// consumed unless its header embeds a frame count.
    pub async fn get_bytes_metadata(
        &self,
        bytes: impl Into<Bytes>,
        file_name: &str,
    ) -> Result<CptvMetadata> {
        match self
            .call(Request::GetBytesMetadata {
                bytes: bytes.into(),
                file_name: file_name.to_string(),
            })
            .await?
        {
            Response::GetBytesMetadata(result) => Ok(result?),
            other => Err(unexpected("getBytesMetadata", other)),
        }
    }

    /// Streams the recording at `url` and returns its metadata.
    #[instrument(skip(self, url), fields(url = %redact_url(url)))]
    pub async fn get_stream_metadata(&self, url: &str) -> Result<CptvMetadata> {
        match self
            .call(Request::GetStreamMetadata {
                url: url.to_string(),
            })
            .await?
        {
            Response::GetStreamMetadata(result) => Ok(result?),
            other => Err(unexpected("getStreamMetadata", other)),
        }
    }

    pub async fn get_header(&self) -> Result<CptvHeader> {
        match self.call(Request::GetHeader).await? {
            Response::GetHeader(result) => Ok(result?),
            other => Err(unexpected("getHeader", other)),
        }
    }

    /// `Ok(None)` when no frame is available; check
    /// [`has_stream_error`](Self::has_stream_error) to tell the end of the
    /// recording from a broken stream.
    pub async fn get_next_frame(&self) -> Result<Option<CptvFrame>> {
        match self.call(Request::GetNextFrame).await? {
            Response::GetNextFrame(result) => Ok(result?),
            other => Err(unexpected("getNextFrame", other)),
        }
    }

    /// `None` until the recording has been read or scanned to its end.
    pub async fn get_total_frames(&self) -> Result<Option<u32>> {
        match self.call(Request::GetTotalFrames).await? {
            Response::GetTotalFrames(total) => Ok(total),
            other => Err(unexpected("getTotalFrames", other)),
        }
    }

    /// Scans to the end for the frame count. Frames can no longer be read
    /// afterwards.
    pub async fn count_total_frames(&self) -> Result<u32> {
        match self.call(Request::CountTotalFrames).await? {
            Response::CountTotalFrames(result) => Ok(result?),
            other => Err(unexpected("countTotalFrames", other)),
        }
    }

    pub async fn get_metadata(&self) -> Result<CptvMetadata> {
        match self.call(Request::GetMetadata).await? {
            Response::GetMetadata(result) => Ok(result?),
            other => Err(unexpected("getMetadata", other)),
        }
    }

    /// Fraction of the recording read so far, or `None` if unknown.
    pub async fn get_load_progress(&self) -> Result<Option<f64>> {
        match self.call(Request::GetLoadProgress).await? {
            Response::GetLoadProgress(progress) => Ok(progress),
            other => Err(unexpected("getLoadProgress", other)),
        }
    }

    pub async fn has_stream_error(&self) -> Result<bool> {
        match self.call(Request::HasStreamError).await? {
            Response::HasStreamError(has_error) => Ok(has_error),
            other => Err(unexpected("hasStreamError", other)),
        }
    }

    pub async fn get_stream_error(&self) -> Result<Option<DecodeError>> {
        match self.call(Request::GetStreamError).await? {
            Response::GetStreamError(error) => Ok(error),
            other => Err(unexpected("getStreamError", other)),
        }
    }

    /// Releases the current recording. The worker keeps running.
    pub async fn free(&self) -> Result<()> {
        match self.call(Request::FreeResources).await? {
            Response::FreeResources => Ok(()),
            other => Err(unexpected("freeResources", other)),
        }
    }

    /// Stops the worker and waits for it to exit. The next call starts a new
    /// one with no recording loaded.
    pub async fn close(&self) {
        self.channel.close().await;
    }

    pub fn channel(&self) -> &ExecutionContextChannel {
        &self.channel
    }

    async fn call(&self, request: Request) -> Result<Response> {
        Ok(self.channel.request(request).await?)
    }
}

async fn read_recording(path: &Path) -> Result<(Bytes, String)> {
    let file_name = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string());

    match core_async::fs::read(path).await {
        Ok(bytes) => Ok((Bytes::from(bytes), file_name)),
        Err(e) => {
            warn!(file = %strip_path(&file_name), error = %e, "Failed to read CPTV file");
            let message = format!("Failed to load CPTV file {}, {}", file_name, e);
            Err(DecodeError::Source(message).into())
        }
    }
}

/// The channel already checks tags, so this only fires on a protocol bug.
fn unexpected(expected: &str, actual: Response) -> CoreError {
    ChannelError::TagMismatch {
        expected: expected.to_string(),
        actual: actual.tag().to_string(),
    }
    .into()
}
