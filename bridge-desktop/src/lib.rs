//! # Desktop Bridge Implementations
//!
//! Default implementations of bridge traits for desktop platforms
//! (macOS, Windows, Linux).
//!
//! ## Overview
//!
//! - `HttpClient` using `reqwest`, with streamed bodies for ranged downloads
//!
//! Audio output is left to the host application, which implements
//! `bridge_traits::AudioSink` on top of its audio engine of choice.
//!
//! ## Usage
//!
//! ```ignore
//! use std::sync::Arc;
//! use bridge_desktop::ReqwestHttpClient;
//! use bridge_traits::HttpClient;
//!
//! #[tokio::main]
//! async fn main() {
//!     let http_client: Arc<dyn HttpClient> = Arc::new(ReqwestHttpClient::new());
//!     // Hand to the streaming controller
//! }
//! ```

mod http;

pub use http::ReqwestHttpClient;
