//! # Execution Context Channel
//!
//! Caller side of the worker protocol. The channel starts the worker lazily on
//! the first request, waits for its `init` acknowledgement, and then forwards
//! requests, matching each response to its caller by [`RequestId`].
//!
//! ## Idle Shutdown
//!
//! An idle timer is re-armed whenever a request is sent and whenever one
//! completes. If it expires while nothing is pending, the worker is torn down
//! and its session freed. The next request starts a fresh worker, so a session
//! does not survive an idle shutdown.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use core_async::sync::{mpsc, oneshot, Mutex as AsyncMutex};
use core_async::task::{AbortHandle, JoinHandle};
use core_async::time::Duration;
use core_runtime::config::CoreConfig;
use parking_lot::Mutex;
use tracing::{debug, info, instrument, warn};

use crate::error::ChannelError;
use crate::protocol::{Envelope, Request, RequestId, Response};
use crate::worker::{self, WorkerHandle};

type PendingMap = HashMap<RequestId, oneshot::Sender<Response>>;

struct Running {
    worker: WorkerHandle,
    /// Requests sent to this worker and not yet answered.
    pending: Arc<Mutex<PendingMap>>,
    dispatcher: JoinHandle<()>,
}

struct Inner {
    config: CoreConfig,
    /// Held while starting, sending, or tearing down the worker.
    running: AsyncMutex<Option<Running>>,
    idle_timer: Mutex<Option<AbortHandle>>,
    next_id: AtomicU64,
    starts: AtomicU64,
}

/// Message channel to a lazily started decoder worker.
pub struct ExecutionContextChannel {
    inner: Arc<Inner>,
}

impl ExecutionContextChannel {
    pub fn new(config: CoreConfig) -> Self {
        Self {
            inner: Arc::new(Inner {
                config,
                running: AsyncMutex::new(None),
                idle_timer: Mutex::new(None),
                next_id: AtomicU64::new(1),
                starts: AtomicU64::new(0),
            }),
        }
    }

    /// Sends `request` and waits for the worker's answer.
    ///
    /// Starts the worker first if it is not running.
    pub async fn request(&self, request: Request) -> Result<Response, ChannelError> {
        let expected = request.tag().to_string();
        let id = RequestId(self.inner.next_id.fetch_add(1, Ordering::Relaxed));
        let (reply, answer) = oneshot::channel();

        let pending = {
            let mut running = self.inner.running.lock().await;
            if running.is_none() {
                *running = Some(self.inner.start().await?);
            }
            let Some(current) = running.as_ref() else {
                return Err(ChannelError::WorkerStopped);
            };

            current.pending.lock().insert(id, reply);
            debug!(%id, tag = %expected, "Dispatching request");
            if let Err(err) = current.worker.send(Envelope {
                id,
                message: request,
            }) {
                current.pending.lock().remove(&id);
                *running = None;
                return Err(err);
            }
            Arc::clone(&current.pending)
        };
        Inner::arm_idle_timer(&self.inner);

        let guard = PendingGuard { id, pending };
        let response = answer.await.map_err(|_| ChannelError::WorkerStopped);
        drop(guard);
        Inner::arm_idle_timer(&self.inner);

        let response = response?;
        if response.tag() != expected {
            warn!(%id, expected = %expected, actual = response.tag(), "Response tag mismatch");
            return Err(ChannelError::TagMismatch {
                expected,
                actual: response.tag().to_string(),
            });
        }
        Ok(response)
    }

    /// Tears the worker down and waits for it to exit.
    ///
    /// Safe to call repeatedly, and a no-op if the worker never started.
    /// Requests still waiting fail with [`ChannelError::WorkerStopped`].
    #[instrument(skip(self))]
    pub async fn close(&self) {
        if let Some(timer) = self.inner.idle_timer.lock().take() {
            timer.abort();
        }
        self.inner.teardown(false).await;
    }

    pub async fn is_running(&self) -> bool {
        self.inner.running.lock().await.is_some()
    }

    /// Number of times a worker has been started.
    pub fn worker_starts(&self) -> u64 {
        self.inner.starts.load(Ordering::Relaxed)
    }

    /// Requests sent to the current worker but not yet answered.
    pub async fn pending_requests(&self) -> usize {
        self.inner
            .running
            .lock()
            .await
            .as_ref()
            .map_or(0, |running| running.pending.lock().len())
    }
}

impl std::fmt::Debug for ExecutionContextChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExecutionContextChannel")
            .field("worker_starts", &self.worker_starts())
            .finish()
    }
}

impl Inner {
    /// Spawns a worker and waits for its `init` acknowledgement.
    async fn start(&self) -> Result<Running, ChannelError> {
        let (responses, mut inbox) = mpsc::unbounded_channel();
        let worker = worker::spawn(&self.config, responses)?;

        match inbox.recv().await {
            Some(Envelope {
                message: Response::Init,
                ..
            }) => {}
            other => {
                warn!(reply = ?other.map(|e| e.message), "Worker did not acknowledge start");
                worker.shutdown().await;
                return Err(ChannelError::WorkerStopped);
            }
        }

        let starts = self.starts.fetch_add(1, Ordering::Relaxed) + 1;
        info!(starts, "Decoder worker ready");

        let pending = Arc::new(Mutex::new(HashMap::new()));
        let dispatcher = core_async::spawn(dispatch(inbox, Arc::clone(&pending)));
        Ok(Running {
            worker,
            pending,
            dispatcher,
        })
    }

    /// Replaces any armed idle timer with a fresh one.
    fn arm_idle_timer(this: &Arc<Self>) {
        let timeout = this.config.idle_timeout;
        if timeout.is_zero() {
            return;
        }

        let timer = core_async::spawn(idle_shutdown(Arc::downgrade(this), timeout));
        if let Some(previous) = this.idle_timer.lock().replace(timer.abort_handle()) {
            previous.abort();
        }
    }

    /// Stops the worker. With `only_if_idle`, leaves it running while any
    /// request is outstanding.
    ///
    /// The lock is held until the thread has exited, so a new worker never
    /// overlaps the old one.
    async fn teardown(&self, only_if_idle: bool) {
        let mut running = self.running.lock().await;
        if only_if_idle
            && running
                .as_ref()
                .is_some_and(|r| !r.pending.lock().is_empty())
        {
            return;
        }

        if let Some(Running {
            worker, dispatcher, ..
        }) = running.take()
        {
            worker.shutdown().await;
            // Ends once the worker's last response sender is gone.
            let _ = dispatcher.await;
            debug!("Decoder worker torn down");
        }
    }
}

async fn idle_shutdown(inner: Weak<Inner>, timeout: Duration) {
    core_async::sleep(timeout).await;
    let Some(inner) = inner.upgrade() else {
        return;
    };
    debug!(?timeout, "Idle timer fired");
    // Detached so that re-arming the timer cannot interrupt a teardown.
    core_async::spawn(async move { inner.teardown(true).await });
}

/// Routes responses to their waiting callers until the worker goes away.
async fn dispatch(
    mut inbox: mpsc::UnboundedReceiver<Envelope<Response>>,
    pending: Arc<Mutex<PendingMap>>,
) {
    while let Some(Envelope { id, message }) = inbox.recv().await {
        let waiter = pending.lock().remove(&id);
        match waiter {
            Some(reply) => {
                let _ = reply.send(message);
            }
            None => debug!(%id, tag = message.tag(), "Dropping response nobody is waiting for"),
        }
    }

    // Fail whoever is still waiting.
    pending.lock().clear();
}

/// Forgets a pending request if its caller stops waiting.
struct PendingGuard {
    id: RequestId,
    pending: Arc<Mutex<PendingMap>>,
}

impl Drop for PendingGuard {
    fn drop(&mut self) {
        self.pending.lock().remove(&self.id);
    }
}
