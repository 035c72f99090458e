use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bridge_traits::error::BridgeError;
use bridge_traits::http::{HttpClient, HttpMethod, HttpRequest};
use core_runtime::logging::strip_query;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::FrameSource;
use crate::error::{PlaybackError, Result};

const DEFAULT_READ_AHEAD: usize = 4096;

struct NetworkStream {
    body: Box<dyn AsyncRead + Send + Unpin>,
    /// Offset of the next byte `body` yields.
    position: u64,
}

/// Seekable view over an HTTP resource, fetched with ranged GET requests.
///
/// A connection is reused for as long as reads stay sequential. Any seek that
/// moves the logical position away from the connection's position drops it,
/// and the next read opens a new `Range` request. Small reads are served from
/// a read-ahead cache.
pub struct PartialHttpSource {
    client: Arc<dyn HttpClient>,
    url: String,
    headers: HashMap<String, String>,
    position: u64,
    length: Option<u64>,
    stream: Option<NetworkStream>,
    cache: Vec<u8>,
    cache_start: u64,
    read_ahead: usize,
    timeout: Duration,
    cancel: CancellationToken,
}

impl PartialHttpSource {
    pub fn new(client: Arc<dyn HttpClient>, url: impl Into<String>, cancel: CancellationToken) -> Self {
        Self {
            client,
            url: url.into(),
            headers: HashMap::new(),
            position: 0,
            length: None,
            stream: None,
            cache: Vec::new(),
            cache_start: 0,
            read_ahead: DEFAULT_READ_AHEAD,
            timeout: Duration::from_secs(30),
            cancel,
        }
    }

    /// Extra headers sent with every request (auth, cookies).
    pub fn with_headers(mut self, headers: HashMap<String, String>) -> Self {
        self.headers = headers;
        self
    }

    pub fn with_read_ahead(mut self, bytes: usize) -> Self {
        self.read_ahead = bytes.max(1);
        self
    }

    /// Timeout for length probes. Streaming bodies are not time-limited.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    fn cached_slice(&self) -> Option<&[u8]> {
        let end = self.cache_start + self.cache.len() as u64;
        if self.position >= self.cache_start && self.position < end {
            let offset = (self.position - self.cache_start) as usize;
            Some(&self.cache[offset..])
        } else {
            None
        }
    }

    async fn open_at(&mut self, start: u64) -> Result<()> {
        self.stream = None;

        let end = self.length.map(|length| length.saturating_sub(1));
        let request = HttpRequest::new(HttpMethod::Get, self.url.clone())
            .headers(&self.headers)
            .range(start, end);

        debug!(
            url = %strip_query(&self.url),
            start,
            end = ?end,
            "Opening ranged HTTP request"
        );

        let opened = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => return Err(PlaybackError::Cancelled),
            opened = self.client.open_stream(request) => opened,
        };
        let mut response = match opened {
            Ok(response) => response,
            Err(BridgeError::RangeNotSatisfiable) => {
                // Nothing left at `start`: leave `stream` empty so the read sees end of data.
                debug!(start, "Range starts at end of resource");
                return Ok(());
            }
            Err(e) => return Err(e.into()),
        };

        if self.length.is_none() {
            self.length = match response.content_range() {
                Some(range) => range.total,
                None if response.is_partial() => response.content_length().map(|len| start + len),
                None => response.content_length(),
            };
            if let Some(length) = self.length {
                debug!(length, "Learnt HTTP resource length");
            }
        }

        if !response.is_partial() && start > 0 {
            warn!(
                url = %strip_query(&self.url),
                start,
                "Server ignored Range header, discarding leading bytes"
            );
            let skipped = cancellable_io(
                &self.cancel,
                tokio::io::copy(&mut (&mut response.body).take(start), &mut tokio::io::sink()),
            )
            .await?;
            if skipped < start {
                return Ok(());
            }
        }

        self.stream = Some(NetworkStream {
            body: response.body,
            position: start,
        });
        Ok(())
    }

    /// Refill the read-ahead cache at the logical position. Leaves the cache
    /// empty at end of data.
    async fn fill_cache(&mut self) -> Result<()> {
        let start = self.position;
        self.cache.clear();
        self.cache_start = start;
        let mut fresh = false;

        loop {
            let diverged = self
                .stream
                .as_ref()
                .map_or(true, |stream| stream.position != start);
            if diverged {
                self.open_at(start).await?;
                fresh = true;
            }
            let Some(stream) = self.stream.as_mut() else {
                return Ok(());
            };

            self.cache.resize(self.read_ahead, 0);
            let mut filled = 0;
            while filled < self.read_ahead {
                let n = cancellable_io(&self.cancel, stream.body.read(&mut self.cache[filled..]))
                    .await?;
                if n == 0 {
                    break;
                }
                filled += n;
            }
            self.cache.truncate(filled);
            stream.position += filled as u64;

            if filled < self.read_ahead {
                // Body ended. Next read, if any, needs a new request.
                self.stream = None;
            }
            if filled > 0 {
                return Ok(());
            }

            // Nothing at all: end of data unless the server cut a range short.
            // With no known length only a fresh request can tell.
            let more_expected = self.length.map_or(true, |length| start < length);
            if fresh || !more_expected {
                return Ok(());
            }
        }
    }
}

#[async_trait]
impl FrameSource for PartialHttpSource {
    async fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        if buf.is_empty() || self.length.is_some_and(|length| self.position >= length) {
            return Ok(0);
        }

        if self.cached_slice().is_none() {
            self.fill_cache().await?;
        }

        let Some(cached) = self.cached_slice() else {
            return Ok(0);
        };
        let n = cached.len().min(buf.len());
        buf[..n].copy_from_slice(&cached[..n]);
        self.position += n as u64;
        Ok(n)
    }

    async fn seek(&mut self, position: u64) -> Result<()> {
        self.position = position;
        Ok(())
    }

    fn position(&self) -> u64 {
        self.position
    }

    async fn length(&mut self) -> Result<Option<u64>> {
        if self.length.is_some() {
            return Ok(self.length);
        }

        let head = HttpRequest::new(HttpMethod::Head, self.url.clone())
            .headers(&self.headers)
            .timeout(self.timeout);
        match cancellable(&self.cancel, self.client.execute(head)).await {
            Ok(response) if response.is_success() => {
                self.length = response.content_length();
            }
            Ok(response) => {
                debug!(status = response.status, "HEAD rejected, probing with a range request");
            }
            Err(PlaybackError::Cancelled) => return Err(PlaybackError::Cancelled),
            Err(e) => {
                debug!(error = %e, "HEAD failed, probing with a range request");
            }
        }

        if self.length.is_none() {
            let probe = HttpRequest::new(HttpMethod::Get, self.url.clone())
                .headers(&self.headers)
                .range(0, Some(0))
                .timeout(self.timeout);
            let response = cancellable(&self.cancel, self.client.execute(probe)).await?;
            self.length = match response.content_range() {
                Some(range) => range.total,
                None if response.status == 200 => response.content_length(),
                None => None,
            };
        }

        Ok(self.length)
    }

    fn describe(&self) -> String {
        format!("http {}", strip_query(&self.url))
    }
}

async fn cancellable<T>(
    cancel: &CancellationToken,
    operation: impl Future<Output = bridge_traits::error::Result<T>>,
) -> Result<T> {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(PlaybackError::Cancelled),
        result = operation => result.map_err(PlaybackError::from),
    }
}

async fn cancellable_io<T>(
    cancel: &CancellationToken,
    operation: impl Future<Output = std::io::Result<T>>,
) -> Result<T> {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(PlaybackError::Cancelled),
        result = operation => result.map_err(|e| PlaybackError::Network(e.to_string())),
    }
}
