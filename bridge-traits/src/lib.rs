//! # Host Bridge Traits
//!
//! Platform abstraction traits that must be implemented by each host platform.
//!
//! ## Overview
//!
//! This crate defines the contract between the streaming core and
//! platform-specific implementations. Each trait represents a capability that
//! the core requires but that must be implemented differently per platform.
//!
//! ## Traits
//!
//! ### Networking
//! - [`HttpClient`](http::HttpClient) - Async HTTP with ranged, streamed bodies
//!
//! ### Audio Output
//! - [`AudioSink`](playback::AudioSink) - Start/pause/stop control of the host audio engine
//! - [`SampleProvider`](playback::SampleProvider) - PCM pull interface the engine reads from
//!
//! ## Platform Requirements
//!
//! | Platform | Implementation Crate | Status |
//! |----------|---------------------|--------|
//! | Desktop  | `bridge-desktop`    | HTTP only |
//!
//! Audio output is always supplied by the host application.
//!
//! ## Error Handling
//!
//! All bridge traits use the [`BridgeError`](error::BridgeError) type. Platform
//! implementations should:
//!
//! - Convert platform-specific errors to `BridgeError`
//! - Report aborted work as [`BridgeError::Cancelled`] rather than a failure
//! - Include error context (e.g., URL, status code)
//!
//! ## Thread Safety
//!
//! All bridge traits require `Send + Sync` bounds to support safe concurrent usage
//! across async tasks.

pub mod error;
pub mod http;
pub mod playback;

pub use error::BridgeError;

// Re-export commonly used types
pub use http::{
    ContentRange, HttpClient, HttpMethod, HttpRequest, HttpResponse, HttpStream, RetryPolicy,
};
pub use playback::{AudioSink, PcmFormat, SampleProvider, SinkState};
