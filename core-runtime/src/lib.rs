//! # Core Runtime Module
//!
//! Foundational runtime infrastructure for the CPTV decoder core:
//! - Logging and tracing infrastructure
//! - Configuration management and capability injection
//!
//! ## Overview
//!
//! Every other core crate reads its settings from [`config::CoreConfig`] and
//! reports through the `tracing` subscriber installed by
//! [`logging::init_logging`].

pub mod config;
pub mod error;
pub mod logging;

pub use error::{Error, Result};
