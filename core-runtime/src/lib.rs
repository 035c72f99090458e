//! # Core Runtime Module
//!
//! Provides foundational runtime infrastructure for the streaming core:
//! - Logging and tracing infrastructure
//! - Shared runtime error type used for configuration and capability failures
//!
//! ## Overview
//!
//! This crate contains the runtime utilities that other modules depend on. It
//! establishes the logging conventions used throughout the system.

pub mod error;
pub mod logging;

pub use error::{Error, Result};
