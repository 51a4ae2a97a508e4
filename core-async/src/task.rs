//! Task spawning.
//!
//! Thin wrappers over `tokio::task` so downstream crates spawn work through a
//! single seam.
//!
//! - `spawn`: Returns a `JoinHandle<T>` that can be awaited or aborted
//! - `spawn_blocking`: For blocking work such as joining an OS thread
//!
//! # Examples
//!
//! ```rust
//! use core_async::task;
//!
//! # core_async::runtime::block_on(async {
//! let handle = task::spawn(async { 42 });
//! assert_eq!(handle.await.unwrap(), 42);
//! # });
//! ```

pub use tokio::task::{spawn_blocking, yield_now, AbortHandle, JoinError, JoinHandle};

/// Spawns a new asynchronous task on the current Tokio runtime.
///
/// # Panics
///
/// Panics when called outside of a runtime context.
pub fn spawn<F>(future: F) -> JoinHandle<F::Output>
where
    F: std::future::Future + Send + 'static,
    F::Output: Send + 'static,
{
    tokio::task::spawn(future)
}

/// Result type for task operations.
pub type Result<T> = std::result::Result<T, JoinError>;
