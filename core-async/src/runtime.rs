//! Runtime utilities that abstract over the underlying async executor.
//!
//! The decoder's isolated execution context runs its own current-thread
//! runtime on a dedicated OS thread; [`current_thread`] builds it. Tests and
//! the `#[core_async::main]` macro go through [`block_on`].

pub use tokio::runtime::{Builder, Handle, Runtime};

/// Builds a single-threaded runtime with timers and I/O enabled.
pub fn current_thread() -> std::io::Result<Runtime> {
    Builder::new_current_thread().enable_all().build()
}

/// Runs the provided future to completion using a lightweight runtime.
pub fn block_on<F>(future: F) -> F::Output
where
    F: std::future::Future,
{
    current_thread()
        .expect("core_async::runtime::block_on: failed to build Tokio runtime")
        .block_on(future)
}
