//! Synchronization primitives.
//!
//! Re-exports the async-aware `tokio::sync` primitives used across the
//! workspace, plus `CancellationToken` from `tokio-util`.
//!
//! All primitives are `Send + Sync` and can be shared across threads, which
//! matters here: the caller side and the decoder's execution context live on
//! different OS threads and talk only through these channels.
//!
//! # Examples
//!
//! ```rust
//! use core_async::sync::{mpsc, oneshot};
//!
//! # core_async::runtime::block_on(async {
//! let (tx, mut rx) = mpsc::unbounded_channel::<u32>();
//! tx.send(7).unwrap();
//! assert_eq!(rx.recv().await, Some(7));
//!
//! let (reply_tx, reply_rx) = oneshot::channel();
//! reply_tx.send("done").unwrap();
//! assert_eq!(reply_rx.await.unwrap(), "done");
//! # });
//! ```

pub use tokio::sync::{
    mpsc, oneshot, watch, AcquireError, Mutex, MutexGuard, Notify, RwLock, Semaphore,
    SemaphorePermit, TryAcquireError,
};

pub use tokio_util::sync::CancellationToken;
