//! Async abstraction layer for the CPTV decoder workspace.
//!
//! Every other crate in the workspace depends on this crate instead of
//! reaching for tokio directly. It re-exports the runtime pieces the decoder
//! needs and adds [`gate::ExclusiveAccessGate`], the primitive that serializes
//! access to a decoding engine's single read cursor.
//!
//! # Modules
//!
//! - `task`: Task spawning and execution
//! - `time`: Sleep, timeouts, instants
//! - `sync`: Channels, locks, cancellation
//! - `runtime`: Runtime construction and `block_on`
//! - `fs`: Async filesystem reads
//! - `gate`: FIFO exclusive-access gate
//!
//! # Examples
//!
//! ```rust
//! use core_async::gate::ExclusiveAccessGate;
//!
//! # core_async::runtime::block_on(async {
//! let gate = ExclusiveAccessGate::new();
//! {
//!     let _permit = gate.acquire().await;
//!     assert!(gate.is_locked());
//! }
//! assert!(!gate.is_locked());
//! # });
//! ```

// Re-export the async entry-point/test macros so downstream crates never need
// direct Tokio dependencies.
pub use core_async_macros::{main, test};

// Lets the attribute macros resolve `core_async::...` inside this crate's own tests.
extern crate self as core_async;

pub mod fs;
pub mod gate;
pub mod runtime;
pub mod sync;
pub mod task;
pub mod time;

pub use gate::{ExclusiveAccessGate, GatePermit};
pub use task::spawn;
pub use time::{sleep, Duration, Instant};
