//! # Frame Sources
//!
//! Seekable byte providers the frame scanner reads compressed audio from.
//!
//! The implementation is chosen once, when a [`MediaLocation`] is opened:
//!
//! | Location | Source | Seek cost |
//! |----------|--------|-----------|
//! | `LocalFile` | [`FileSource`] | O(1) |
//! | `RemoteStream` | [`PartialHttpSource`] | new ranged request on the next read |
//! | `CachedChunk` | [`MemorySource`] | O(1) |

mod file;
mod http;
mod memory;

pub use file::FileSource;
pub use http::PartialHttpSource;
pub use memory::MemorySource;

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bridge_traits::http::HttpClient;
use bytes::Bytes;
use tokio_util::sync::CancellationToken;

use crate::config::{IndexMode, StreamingConfig};
use crate::error::Result;

/// Seekable byte source.
///
/// `read` returns `Ok(0)` only at end of data. Sources are owned by a single
/// decoded stream and are never shared.
#[async_trait]
pub trait FrameSource: Send {
    /// Read up to `buf.len()` bytes at the current position.
    async fn read(&mut self, buf: &mut [u8]) -> Result<usize>;

    /// Move the read position. Positions past the end are allowed; reads
    /// there return 0.
    async fn seek(&mut self, position: u64) -> Result<()>;

    fn position(&self) -> u64;

    /// Total length in bytes, if the source can learn it.
    async fn length(&mut self) -> Result<Option<u64>>;

    /// Short label for logs.
    fn describe(&self) -> String;

    /// Read until `buf` is full or the data ends.
    async fn read_full(&mut self, buf: &mut [u8]) -> Result<usize> {
        let mut filled = 0;
        while filled < buf.len() {
            let n = self.read(&mut buf[filled..]).await?;
            if n == 0 {
                break;
            }
            filled += n;
        }
        Ok(filled)
    }
}

/// Where a stream's compressed bytes come from.
#[derive(Debug, Clone)]
pub enum MediaLocation {
    /// Local file accessible to the process.
    LocalFile { path: PathBuf },
    /// HTTP(S) resource; the server should honour `Range` requests.
    RemoteStream {
        url: String,
        headers: HashMap<String, String>,
    },
    /// Bytes already held in memory.
    CachedChunk { data: Bytes },
}

impl MediaLocation {
    pub fn local(path: impl Into<PathBuf>) -> Self {
        Self::LocalFile { path: path.into() }
    }

    pub fn remote(url: impl Into<String>) -> Self {
        Self::RemoteStream {
            url: url.into(),
            headers: HashMap::new(),
        }
    }

    pub fn is_remote(&self) -> bool {
        matches!(self, MediaLocation::RemoteStream { .. })
    }

    /// Remote streams index as they play; everything else is scanned up front.
    pub fn default_index_mode(&self) -> IndexMode {
        if self.is_remote() {
            IndexMode::Progressive
        } else {
            IndexMode::Eager
        }
    }
}

/// Dependencies and tuning needed to open a [`MediaLocation`].
#[derive(Clone)]
pub struct SourceOptions {
    pub http_client: Option<Arc<dyn HttpClient>>,
    pub read_ahead_bytes: usize,
    pub http_timeout: Duration,
    /// Aborts in-flight network work.
    pub cancel: CancellationToken,
}

impl SourceOptions {
    pub fn from_config(
        config: &StreamingConfig,
        http_client: Option<Arc<dyn HttpClient>>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            http_client,
            read_ahead_bytes: config.http_read_ahead_bytes,
            http_timeout: config.http_timeout,
            cancel,
        }
    }
}

impl Default for SourceOptions {
    fn default() -> Self {
        Self::from_config(&StreamingConfig::default(), None, CancellationToken::new())
    }
}

/// Open the source for `location`.
///
/// # Errors
///
/// - `IoError` if a local file cannot be opened
/// - `Runtime(CapabilityMissing)` for remote locations without an HTTP client
pub async fn open_source(
    location: &MediaLocation,
    options: &SourceOptions,
) -> Result<Box<dyn FrameSource>> {
    match location {
        MediaLocation::LocalFile { path } => Ok(Box::new(FileSource::open(path).await?)),
        MediaLocation::RemoteStream { url, headers } => {
            let client = options.http_client.clone().ok_or_else(|| {
                core_runtime::Error::CapabilityMissing {
                    capability: "HttpClient".to_string(),
                    message: "Remote streams need an HTTP client. \
                              Desktop: use bridge_desktop::ReqwestHttpClient."
                        .to_string(),
                }
            })?;
            Ok(Box::new(
                PartialHttpSource::new(client, url.clone(), options.cancel.clone())
                    .with_headers(headers.clone())
                    .with_read_ahead(options.read_ahead_bytes)
                    .with_timeout(options.http_timeout),
            ))
        }
        MediaLocation::CachedChunk { data } => Ok(Box::new(MemorySource::new(data.clone()))),
    }
}
