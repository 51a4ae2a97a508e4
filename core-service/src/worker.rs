//! # Decoder Worker
//!
//! The isolated execution context: a dedicated OS thread that owns one
//! [`DecodingSession`] and runs its own current-thread runtime. The only way
//! in or out is the pair of message channels handed to [`spawn`].
//!
//! Each request is handled on its own task so that cheap queries (progress,
//! error state) are answered while a frame decode is parked on the session
//! gate. The gate keeps engine-touching requests in arrival order.

use std::sync::Arc;
use std::thread::{self, JoinHandle};

use core_async::sync::mpsc;
use core_decoder::{DecodingSession, SessionConfig};
use core_runtime::config::CoreConfig;
use tracing::{debug, error, info, trace};

use crate::error::ChannelError;
use crate::protocol::{Envelope, Request, RequestId, Response};

pub(crate) type RequestSender = mpsc::UnboundedSender<Envelope<Request>>;
pub(crate) type ResponseSender = mpsc::UnboundedSender<Envelope<Response>>;

/// Caller-side handle on a running worker thread.
pub(crate) struct WorkerHandle {
    requests: RequestSender,
    thread: JoinHandle<()>,
}

impl WorkerHandle {
    pub(crate) fn send(&self, envelope: Envelope<Request>) -> Result<(), ChannelError> {
        self.requests
            .send(envelope)
            .map_err(|_| ChannelError::WorkerStopped)
    }

    /// Closes the request channel and waits for the thread to exit.
    ///
    /// The worker frees its session before returning, so the engine is
    /// released by the time this resolves.
    pub(crate) async fn shutdown(self) {
        let WorkerHandle { requests, thread } = self;
        drop(requests);

        match core_async::task::spawn_blocking(move || thread.join()).await {
            Ok(Ok(())) => {}
            Ok(Err(_)) => error!("Decoder worker panicked"),
            Err(e) => error!(error = %e, "Failed to join decoder worker"),
        }
    }
}

/// Starts a worker thread. Its first message on `responses` is
/// [`Response::Init`].
pub(crate) fn spawn(
    config: &CoreConfig,
    responses: ResponseSender,
) -> Result<WorkerHandle, ChannelError> {
    let (requests, inbox) = mpsc::unbounded_channel();
    let factory = Arc::clone(&config.engine_factory);
    let http_client = config.http_client.clone();
    let session_config = SessionConfig::from(config);

    let thread = thread::Builder::new()
        .name(config.worker_thread_name.clone())
        .spawn(move || {
            let session = DecodingSession::new(factory, http_client, session_config);
            run(session, inbox, responses);
        })
        .map_err(|e| ChannelError::SpawnFailed(e.to_string()))?;

    Ok(WorkerHandle { requests, thread })
}

fn run(
    session: DecodingSession,
    mut inbox: mpsc::UnboundedReceiver<Envelope<Request>>,
    responses: ResponseSender,
) {
    let runtime = match core_async::runtime::current_thread() {
        Ok(runtime) => runtime,
        Err(e) => {
            // Dropping `responses` without an Init tells the caller we failed.
            error!(error = %e, "Decoder worker could not build its runtime");
            return;
        }
    };

    runtime.block_on(async move {
        let session = Arc::new(session);
        info!("Decoder worker started");

        if responses
            .send(Envelope {
                id: RequestId::INIT,
                message: Response::Init,
            })
            .is_err()
        {
            return;
        }

        while let Some(Envelope { id, message }) = inbox.recv().await {
            trace!(%id, tag = message.tag(), "Request received");
            let session = Arc::clone(&session);
            let responses = responses.clone();
            core_async::spawn(async move {
                let message = handle(&session, message).await;
                // The caller may have stopped waiting; that is not our concern.
                let _ = responses.send(Envelope { id, message });
            });
        }

        session.free().await;
        info!("Decoder worker stopped");
    });
}

async fn handle(session: &DecodingSession, request: Request) -> Response {
    match request {
        Request::InitWithUrl { url } => {
            Response::InitWithUrl(session.init_with_url(&url, None).await)
        }
        Request::InitWithUrlAndSize { url, size } => {
            Response::InitWithUrlAndSize(session.init_with_url(&url, size).await)
        }
        Request::InitWithLocalCptvFile { bytes, file_name } => {
            Response::InitWithLocalCptvFile(session.init_with_bytes(bytes, &file_name).await)
        }
        Request::GetBytesMetadata { bytes, file_name } => {
            let result = match session.init_with_bytes(bytes, &file_name).await {
                Ok(()) => session.get_metadata().await,
                Err(err) => Err(err),
            };
            Response::GetBytesMetadata(result)
        }
        Request::GetStreamMetadata { url } => {
            let result = match session.init_with_url(&url, None).await {
                Ok(()) => session.get_metadata().await,
                Err(err) => Err(err),
            };
            Response::GetStreamMetadata(result)
        }
        Request::GetHeader => Response::GetHeader(session.get_header().await),
        Request::GetNextFrame => Response::GetNextFrame(session.get_next_frame().await),
        Request::GetTotalFrames => Response::GetTotalFrames(session.get_total_frames()),
        Request::CountTotalFrames => {
            Response::CountTotalFrames(session.count_total_frames().await)
        }
        Request::GetMetadata => Response::GetMetadata(session.get_metadata().await),
        Request::GetLoadProgress => Response::GetLoadProgress(session.get_load_progress()),
        Request::HasStreamError => Response::HasStreamError(session.has_stream_error()),
        Request::GetStreamError => Response::GetStreamError(session.stream_error()),
        Request::FreeResources => {
            session.free().await;
            Response::FreeResources
        }
        Request::Other(tag) => {
            debug!(tag = %tag, "Echoing unsupported request");
            Response::Unsupported(tag)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bridge_traits::{DecodingEngine, EngineFactory};
    use bytes::Bytes;
    use core_decoder::testing::{FixtureClip, FixtureEngine};
    use parking_lot::Mutex;

    fn config() -> CoreConfig {
        CoreConfig::builder()
            .engine_factory(FixtureEngine::factory())
            .worker_thread_name("worker-under-test")
            .build()
            .unwrap()
    }

    #[core_async::test]
    async fn test_worker_acknowledges_then_answers() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let worker = spawn(&config(), tx).unwrap();

        let init = rx.recv().await.unwrap();
        assert_eq!(init.id, RequestId::INIT);
        assert_eq!(init.message, Response::Init);

        let clip = FixtureClip::new(4, 3).frames(2).build();
        worker
            .send(Envelope {
                id: RequestId(1),
                message: Request::InitWithLocalCptvFile {
                    bytes: Bytes::from(clip),
                    file_name: "clip.cptv".into(),
                },
            })
            .unwrap();
        let reply = rx.recv().await.unwrap();
        assert_eq!(reply.id, RequestId(1));
        assert_eq!(reply.message, Response::InitWithLocalCptvFile(Ok(())));

        worker
            .send(Envelope {
                id: RequestId(2),
                message: Request::Other("ping".into()),
            })
            .unwrap();
        let reply = rx.recv().await.unwrap();
        assert_eq!(reply.message, Response::Unsupported("ping".into()));

        worker.shutdown().await;
        assert!(rx.recv().await.is_none());
    }

    #[core_async::test]
    async fn test_sessions_run_on_the_named_thread() {
        let seen = Arc::new(Mutex::new(None));
        let record = Arc::clone(&seen);
        let factory: Arc<dyn EngineFactory> = Arc::new(move || {
            *record.lock() = thread::current().name().map(String::from);
            Box::new(FixtureEngine::new()) as Box<dyn DecodingEngine>
        });
        let config = CoreConfig::builder()
            .engine_factory(factory)
            .worker_thread_name("thermal-decoder")
            .build()
            .unwrap();

        let (tx, mut rx) = mpsc::unbounded_channel();
        let worker = spawn(&config, tx).unwrap();
        let _ = rx.recv().await;

        worker
            .send(Envelope {
                id: RequestId(7),
                message: Request::InitWithLocalCptvFile {
                    bytes: Bytes::from(FixtureClip::new(2, 2).frames(1).build()),
                    file_name: "clip.cptv".into(),
                },
            })
            .unwrap();
        let _ = rx.recv().await.unwrap();
        worker.shutdown().await;

        assert_eq!(seen.lock().as_deref(), Some("thermal-decoder"));
    }
}
