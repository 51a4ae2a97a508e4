//! End-to-end tests for `CptvDecoder`: every call goes through the worker
//! thread and its message channel.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use bridge_traits::error::Result as BridgeResult;
use bridge_traits::{
    CptvHeader, DecodingEngine, EngineError, EngineFactory, EngineStep, FrameStep, HttpClient,
    HttpRequest, StreamingResponse,
};
use bytes::Bytes;
use core_async::time::Duration;
use core_decoder::testing::{FixtureClip, FixtureEngine};
use core_service::{
    ChannelError, CoreConfig, CoreError, CptvDecoder, DecodeError, Request, Response,
};
use futures::{stream, StreamExt};
use mockall::mock;

mock! {
    Client {}

    #[async_trait]
    impl HttpClient for Client {
        async fn open_stream(&self, request: HttpRequest) -> BridgeResult<StreamingResponse>;
    }
}

/// Fixture engine that counts how often it is released.
struct CountingEngine {
    inner: FixtureEngine,
    releases: Arc<AtomicUsize>,
}

impl DecodingEngine for CountingEngine {
    fn ingest(&mut self, chunk: &[u8]) -> bool {
        self.inner.ingest(chunk)
    }
    fn end_of_input(&mut self) {
        self.inner.end_of_input()
    }
    fn parse_header(&mut self) -> Result<EngineStep<CptvHeader>, EngineError> {
        self.inner.parse_header()
    }
    fn decode_next_frame(&mut self) -> Result<EngineStep<FrameStep>, EngineError> {
        self.inner.decode_next_frame()
    }
    fn scan_to_end(&mut self) -> Result<EngineStep<u32>, EngineError> {
        self.inner.scan_to_end()
    }
    fn total_frames(&self) -> Option<u32> {
        self.inner.total_frames()
    }
    fn release(&mut self) {
        self.releases.fetch_add(1, Ordering::SeqCst);
        self.inner.release()
    }
}

fn decoder() -> CptvDecoder {
    CptvDecoder::from_builder(CoreConfig::builder().engine_factory(FixtureEngine::factory()))
        .unwrap()
}

fn decoder_with_idle_timeout(timeout: Duration) -> CptvDecoder {
    CptvDecoder::new(
        CoreConfig::builder()
            .engine_factory(FixtureEngine::factory())
            .idle_timeout(timeout)
            .build()
            .unwrap(),
    )
}

fn decode_error(err: CoreError) -> DecodeError {
    match err {
        CoreError::Decode(err) => err,
        other => panic!("expected a decode error, got {other:?}"),
    }
}

fn ten_frame_clip() -> Vec<u8> {
    FixtureClip::new(4, 3).fps(9).frames(10).build()
}

#[core_async::test]
async fn test_calls_before_init_report_not_initialized() {
    let decoder = decoder();

    let err = decode_error(decoder.get_header().await.unwrap_err());
    assert_eq!(err, DecodeError::NotInitialized);
    assert_eq!(
        err.to_string(),
        "You need to initialise the player with the url of a CPTV file"
    );
    assert_eq!(
        decode_error(decoder.get_next_frame().await.unwrap_err()),
        DecodeError::NotInitialized
    );
    assert_eq!(decoder.get_total_frames().await.unwrap(), None);
    assert_eq!(decoder.get_load_progress().await.unwrap(), None);
    assert!(!decoder.has_stream_error().await.unwrap());
    assert_eq!(decoder.get_stream_error().await.unwrap(), None);
    decoder.free().await.unwrap();

    decoder.close().await;
}

#[core_async::test]
async fn test_ten_frames_then_none() {
    let decoder = decoder();
    decoder
        .init_with_file_bytes(ten_frame_clip(), "ten.cptv")
        .await
        .unwrap();

    let header = decoder.get_header().await.unwrap();
    assert_eq!((header.width, header.height), (4, 3));

    let mut frames = 0;
    while let Some(frame) = decoder.get_next_frame().await.unwrap() {
        assert_eq!(frame.data.len(), 12);
        frames += 1;
    }
    assert_eq!(frames, 10);
    assert_eq!(decoder.get_total_frames().await.unwrap(), Some(10));
    assert_eq!(decoder.get_next_frame().await.unwrap(), None);
    assert!(!decoder.has_stream_error().await.unwrap());
    assert_eq!(decoder.get_load_progress().await.unwrap(), Some(1.0));

    decoder.close().await;
}

#[core_async::test]
async fn test_corrupt_buffer_is_reported_not_raised() {
    let decoder = decoder();

    let err = decoder
        .init_with_file_bytes(vec![0x5A; 100], "corrupt.cptv")
        .await
        .unwrap_err();
    assert!(err.to_string().starts_with("Failed to load CPTV file corrupt.cptv"));

    assert!(decoder.has_stream_error().await.unwrap());
    let recorded = decoder.get_stream_error().await.unwrap().unwrap();
    assert_eq!(decode_error(decoder.get_header().await.unwrap_err()), recorded);
    assert_eq!(decoder.get_load_progress().await.unwrap(), None);

    decoder.close().await;
}

#[core_async::test]
async fn test_count_then_next_frame_is_consumed() {
    let decoder = decoder();
    decoder
        .init_with_file_bytes(ten_frame_clip(), "ten.cptv")
        .await
        .unwrap();

    assert_eq!(decoder.count_total_frames().await.unwrap(), 10);
    assert_eq!(
        decode_error(decoder.get_next_frame().await.unwrap_err()),
        DecodeError::StreamConsumed
    );
    assert_eq!(decoder.get_total_frames().await.unwrap(), Some(10));

    decoder.close().await;
}

#[core_async::test]
async fn test_metadata_matches_a_full_read() {
    let clip = FixtureClip::new(4, 3).fps(9).frames(18).build();
    let decoder = decoder();

    let metadata = decoder
        .get_bytes_metadata(clip.clone(), "clip.cptv")
        .await
        .unwrap();
    assert_eq!(metadata.total_frames(), 18);
    assert!((metadata.duration - 18.0 / 9.0).abs() < 1e-9);

    decoder.init_with_file_bytes(clip, "clip.cptv").await.unwrap();
    while decoder.get_next_frame().await.unwrap().is_some() {}
    assert_eq!(
        decoder.get_total_frames().await.unwrap(),
        Some(metadata.total_frames())
    );

    decoder.close().await;
}

#[core_async::test]
async fn test_metadata_of_loaded_recording() {
    let clip = FixtureClip::new(4, 3)
        .fps(5)
        .frames(10)
        .embed_total()
        .build();
    let decoder = decoder();
    decoder.init_with_file_bytes(clip, "clip.cptv").await.unwrap();

    let metadata = decoder.get_metadata().await.unwrap();
    assert_eq!(metadata.total_frames(), 10);
    assert!((metadata.duration - 2.0).abs() < 1e-9);
    // An embedded count does not require a scan.
    assert!(decoder.get_next_frame().await.unwrap().is_some());

    decoder.close().await;
}

#[core_async::test]
async fn test_concurrent_frame_requests_do_not_interleave() {
    let decoder = decoder();
    decoder
        .init_with_file_bytes(ten_frame_clip(), "ten.cptv")
        .await
        .unwrap();

    let (a, b, c, progress) = futures::join!(
        decoder.get_next_frame(),
        decoder.get_next_frame(),
        decoder.get_next_frame(),
        decoder.get_load_progress()
    );
    let mut times: Vec<u32> = [a, b, c]
        .into_iter()
        .map(|frame| frame.unwrap().unwrap().meta.time_on_ms)
        .collect();
    times.sort_unstable();
    assert_eq!(times, vec![1_000, 1_111, 1_222]);
    assert!(progress.is_ok());

    decoder.close().await;
}

#[core_async::test]
async fn test_reinitialising_replaces_the_recording() {
    let decoder = decoder();
    decoder
        .init_with_file_bytes(ten_frame_clip(), "ten.cptv")
        .await
        .unwrap();
    let _ = decoder.get_next_frame().await.unwrap();

    let other = FixtureClip::new(6, 2).device_name("second").frames(1).build();
    decoder.init_with_file_bytes(other, "second.cptv").await.unwrap();
    let header = decoder.get_header().await.unwrap();
    assert_eq!(header.device_name, "second");
    assert_eq!(header.width, 6);

    decoder.free().await.unwrap();
    assert_eq!(
        decode_error(decoder.get_header().await.unwrap_err()),
        DecodeError::NotInitialized
    );

    decoder.close().await;
}

#[core_async::test]
async fn test_init_with_file_reads_from_disk() {
    let path = std::env::temp_dir().join(format!("cptv-decoder-{}.cptv", std::process::id()));
    std::fs::write(&path, ten_frame_clip()).unwrap();

    let decoder = decoder();
    decoder.init_with_file(&path).await.unwrap();
    assert_eq!(decoder.get_header().await.unwrap().fps, 9);
    std::fs::remove_file(&path).unwrap();

    let err = decoder
        .init_with_file("/definitely/not/here/missing.cptv")
        .await
        .unwrap_err();
    assert!(err
        .to_string()
        .starts_with("Failed to load CPTV file missing.cptv, "));

    decoder.close().await;
}

#[core_async::test]
async fn test_network_error_surfaces_server_message() {
    let mut client = MockClient::new();
    client.expect_open_stream().returning(|_| {
        Ok(StreamingResponse {
            status: 401,
            headers: HashMap::new(),
            body: Box::pin(stream::iter(vec![Ok(Bytes::from_static(
                br#"{"messages":["Invalid JWT","Token expired"]}"#,
            ))])),
        })
    });
    let decoder = CptvDecoder::new(
        CoreConfig::builder()
            .engine_factory(FixtureEngine::factory())
            .http_client(Arc::new(client))
            .build()
            .unwrap(),
    );

    let err = decoder
        .init_with_url_and_size("https://api.example/signed.cptv?jwt=x", 1_000)
        .await
        .unwrap_err();
    assert_eq!(err.to_string(), "Token expired");
    assert!(decoder.has_stream_error().await.unwrap());

    decoder.close().await;
}

#[core_async::test]
async fn test_stream_metadata_over_network() {
    let clip = FixtureClip::new(4, 3).fps(4).frames(8).build();
    let mut client = MockClient::new();
    client.expect_open_stream().returning(move |_| {
        let chunks: Vec<BridgeResult<Bytes>> = clip
            .chunks(13)
            .map(|c| Ok(Bytes::copy_from_slice(c)))
            .collect();
        Ok(StreamingResponse {
            status: 200,
            headers: HashMap::new(),
            body: Box::pin(stream::iter(chunks)),
        })
    });
    let decoder = CptvDecoder::new(
        CoreConfig::builder()
            .engine_factory(FixtureEngine::factory())
            .http_client(Arc::new(client))
            .build()
            .unwrap(),
    );

    let metadata = decoder
        .get_stream_metadata("https://files.example/clip.cptv")
        .await
        .unwrap();
    assert_eq!(metadata.total_frames(), 8);
    assert!((metadata.duration - 2.0).abs() < 1e-9);

    decoder.close().await;
}

#[core_async::test]
async fn test_unknown_request_is_echoed() {
    let decoder = decoder();
    let response = decoder
        .channel()
        .request(Request::Other("ping".into()))
        .await
        .unwrap();
    assert_eq!(response, Response::Unsupported("ping".into()));

    decoder.close().await;
}

// ============================================================================
// Worker lifecycle
// ============================================================================

#[core_async::test]
async fn test_worker_starts_lazily() {
    let decoder = decoder();
    assert!(!decoder.channel().is_running().await);
    assert_eq!(decoder.channel().worker_starts(), 0);

    decoder.has_stream_error().await.unwrap();
    assert!(decoder.channel().is_running().await);
    assert_eq!(decoder.channel().worker_starts(), 1);

    decoder.has_stream_error().await.unwrap();
    assert_eq!(decoder.channel().worker_starts(), 1);
    assert_eq!(decoder.channel().pending_requests().await, 0);

    decoder.close().await;
}

#[core_async::test]
async fn test_idle_worker_is_torn_down_and_restarts() {
    let decoder = decoder_with_idle_timeout(Duration::from_millis(50));
    decoder
        .init_with_file_bytes(ten_frame_clip(), "ten.cptv")
        .await
        .unwrap();
    assert!(decoder.channel().is_running().await);

    core_async::sleep(Duration::from_millis(400)).await;
    assert!(!decoder.channel().is_running().await);

    // A fresh worker has no recording loaded.
    assert_eq!(
        decode_error(decoder.get_header().await.unwrap_err()),
        DecodeError::NotInitialized
    );
    assert_eq!(decoder.channel().worker_starts(), 2);

    decoder.close().await;
}

#[core_async::test]
async fn test_zero_idle_timeout_keeps_worker_alive() {
    let decoder = decoder_with_idle_timeout(Duration::ZERO);
    decoder
        .init_with_file_bytes(ten_frame_clip(), "ten.cptv")
        .await
        .unwrap();

    core_async::sleep(Duration::from_millis(100)).await;
    assert!(decoder.channel().is_running().await);
    assert!(decoder.get_next_frame().await.unwrap().is_some());

    decoder.close().await;
}

#[core_async::test]
async fn test_close_is_idempotent_and_releases_engine() {
    let never_started = decoder();
    never_started.close().await;
    never_started.close().await;
    assert_eq!(never_started.channel().worker_starts(), 0);

    let releases = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&releases);
    let factory: Arc<dyn EngineFactory> = Arc::new(move || {
        Box::new(CountingEngine {
            inner: FixtureEngine::new(),
            releases: Arc::clone(&counter),
        }) as Box<dyn DecodingEngine>
    });
    let decoder = CptvDecoder::new(
        CoreConfig::builder()
            .engine_factory(factory)
            .build()
            .unwrap(),
    );
    decoder
        .init_with_file_bytes(ten_frame_clip(), "ten.cptv")
        .await
        .unwrap();

    decoder.close().await;
    assert_eq!(releases.load(Ordering::SeqCst), 1);
    assert!(!decoder.channel().is_running().await);
    decoder.close().await;
    assert_eq!(releases.load(Ordering::SeqCst), 1);

    // Closing does not prevent later use.
    assert!(!decoder.has_stream_error().await.unwrap());
    assert_eq!(decoder.channel().worker_starts(), 2);
    decoder.close().await;
}

#[core_async::test]
async fn test_close_releases_engine_held_by_stalled_read() {
    // Everything but the last byte arrives, then the body never ends.
    let clip = ten_frame_clip();
    let mut client = MockClient::new();
    client.expect_open_stream().returning(move |_| {
        let head: Vec<BridgeResult<Bytes>> =
            vec![Ok(Bytes::copy_from_slice(&clip[..clip.len() - 1]))];
        Ok(StreamingResponse {
            status: 200,
            headers: HashMap::new(),
            body: Box::pin(stream::iter(head).chain(stream::pending())),
        })
    });

    let releases = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&releases);
    let factory: Arc<dyn EngineFactory> = Arc::new(move || {
        Box::new(CountingEngine {
            inner: FixtureEngine::new(),
            releases: Arc::clone(&counter),
        }) as Box<dyn DecodingEngine>
    });
    let decoder = Arc::new(CptvDecoder::new(
        CoreConfig::builder()
            .engine_factory(factory)
            .http_client(Arc::new(client))
            .build()
            .unwrap(),
    ));
    decoder
        .init_with_url("https://files.example/slow.cptv")
        .await
        .unwrap();
    for _ in 0..9 {
        assert!(decoder.get_next_frame().await.unwrap().is_some());
    }

    let stalled = {
        let decoder = Arc::clone(&decoder);
        core_async::spawn(async move { decoder.get_next_frame().await })
    };
    core_async::sleep(Duration::from_millis(50)).await;
    assert_eq!(releases.load(Ordering::SeqCst), 0);

    decoder.close().await;
    assert_eq!(releases.load(Ordering::SeqCst), 1);
    assert!(matches!(
        stalled.await.unwrap(),
        Err(CoreError::Channel(ChannelError::WorkerStopped))
    ));
}

#[test]
fn test_builder_without_engine_is_a_runtime_error() {
    let err = CptvDecoder::from_builder(CoreConfig::builder()).unwrap_err();
    assert!(matches!(
        err,
        CoreError::Runtime(core_runtime::Error::CapabilityMissing { .. })
    ));
    assert!(err.to_string().starts_with("Configuration error: "));
}

#[test]
fn test_channel_errors_are_descriptive() {
    let err = CoreError::from(ChannelError::WorkerStopped);
    assert_eq!(
        err.to_string(),
        "Channel error: Decoder worker stopped before replying"
    );
    assert!(err.as_decode().is_none());
}
