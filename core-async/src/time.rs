//! Time-related abstractions.
//!
//! Re-exports `tokio::time` for sleeping and deadlines, alongside the std
//! duration and instant types. The execution-context idle timer is the only
//! time-driven behaviour in the decoder, and it is built from [`sleep`].
//!
//! # Examples
//!
//! ```rust
//! use core_async::time::{sleep, Duration, Instant};
//!
//! # core_async::runtime::block_on(async {
//! let start = Instant::now();
//! sleep(Duration::from_millis(5)).await;
//! assert!(start.elapsed() >= Duration::from_millis(5));
//! # });
//! ```

pub use tokio::time::{error::Elapsed, sleep, sleep_until, timeout, Sleep, Timeout};

pub use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};
