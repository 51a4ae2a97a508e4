//! Workspace umbrella crate.
//!
//! This crate exists to expose shared feature flags that map to the individual
//! workspace crates. Host applications can depend on `cptv-workspace`, enable
//! `desktop-shims`, and reach the decoder façade without wiring each crate
//! individually.

#[cfg(feature = "desktop-shims")]
pub use core_service::*;
