//! HTTP Client Implementation using Reqwest
//!
//! Buffered requests (length probes) go through a retry loop; ranged media
//! downloads are opened once and streamed.

use async_trait::async_trait;
use bridge_traits::{
    error::{BridgeError, Result},
    http::{HttpClient, HttpMethod, HttpRequest, HttpResponse, HttpStream, RetryPolicy},
};
use futures_util::TryStreamExt;
use reqwest::{Client, StatusCode};
use std::collections::HashMap;
use std::time::Duration;
use tracing::{debug, warn};

const USER_AGENT: &str = concat!("mp3-stream-core/", env!("CARGO_PKG_VERSION"));

/// Reqwest-backed [`HttpClient`].
///
/// Only the connect phase is bounded by the client. Whole-request timeouts
/// come from [`HttpRequest::timeout`], so a streaming body is never cut off
/// by a client-wide deadline.
pub struct ReqwestHttpClient {
    client: Client,
}

impl ReqwestHttpClient {
    pub fn new() -> Self {
        Self::with_connect_timeout(Duration::from_secs(10))
    }

    pub fn with_connect_timeout(timeout: Duration) -> Self {
        let client = Client::builder()
            .connect_timeout(timeout)
            .pool_max_idle_per_host(4)
            .user_agent(USER_AGENT)
            .build()
            .unwrap_or_else(|e| {
                warn!(error = %e, "Falling back to default HTTP client configuration");
                Client::new()
            });

        Self { client }
    }

    /// Wrap a preconfigured client (proxies, custom roots).
    pub fn with_client(client: Client) -> Self {
        Self { client }
    }

    fn method(method: HttpMethod) -> reqwest::Method {
        match method {
            HttpMethod::Get => reqwest::Method::GET,
            HttpMethod::Head => reqwest::Method::HEAD,
        }
    }

    fn build_request(&self, request: HttpRequest) -> reqwest::RequestBuilder {
        let mut builder = self
            .client
            .request(Self::method(request.method), &request.url);
        for (key, value) in request.headers {
            builder = builder.header(key, value);
        }
        if let Some(timeout) = request.timeout {
            builder = builder.timeout(timeout);
        }
        builder
    }

    fn response_headers(response: &reqwest::Response) -> HashMap<String, String> {
        response
            .headers()
            .iter()
            .filter_map(|(k, v)| v.to_str().ok().map(|s| (k.to_string(), s.to_string())))
            .collect()
    }

    fn send_error(e: reqwest::Error) -> BridgeError {
        if e.is_timeout() {
            BridgeError::OperationFailed("Request timed out".to_string())
        } else if e.is_connect() {
            BridgeError::OperationFailed(format!("Connection failed: {}", e))
        } else {
            BridgeError::OperationFailed(e.to_string())
        }
    }

    fn status_error(status: StatusCode, ranged: bool) -> BridgeError {
        if ranged && status == StatusCode::RANGE_NOT_SATISFIABLE {
            BridgeError::RangeNotSatisfiable
        } else {
            BridgeError::OperationFailed(format!("HTTP error: {}", status))
        }
    }

    /// Send once. `Ok(None)` means the status is worth retrying.
    async fn attempt(&self, request: &HttpRequest) -> Result<Option<HttpResponse>> {
        let response = self
            .build_request(request.clone())
            .send()
            .await
            .map_err(Self::send_error)?;

        let status = response.status().as_u16();
        if RetryPolicy::is_retryable_status(status) {
            warn!(status, "Retryable HTTP status");
            return Ok(None);
        }

        let headers = Self::response_headers(&response);
        let body = response
            .bytes()
            .await
            .map_err(|e| BridgeError::OperationFailed(e.to_string()))?;
        Ok(Some(HttpResponse {
            status,
            headers,
            body,
        }))
    }
}

impl Default for ReqwestHttpClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl HttpClient for ReqwestHttpClient {
    async fn execute(&self, request: HttpRequest) -> Result<HttpResponse> {
        self.execute_with_retry(request, RetryPolicy::default())
            .await
    }

    async fn execute_with_retry(
        &self,
        request: HttpRequest,
        policy: RetryPolicy,
    ) -> Result<HttpResponse> {
        let attempts = policy.max_attempts.max(1);
        let mut last_error = None;

        for attempt in 1..=attempts {
            debug!(attempt, attempts, method = ?request.method, "Sending HTTP request");
            match self.attempt(&request).await {
                Ok(Some(response)) => return Ok(response),
                Ok(None) => {
                    last_error = Some(BridgeError::OperationFailed(
                        "HTTP server kept failing".to_string(),
                    ));
                }
                Err(e) => {
                    warn!(error = %e, attempt, "HTTP request failed");
                    last_error = Some(e);
                }
            }

            if attempt < attempts {
                tokio::time::sleep(policy.delay_for(attempt)).await;
            }
        }

        Err(last_error.unwrap_or_else(|| {
            BridgeError::OperationFailed("All retry attempts exhausted".to_string())
        }))
    }

    async fn open_stream(&self, request: HttpRequest) -> Result<HttpStream> {
        let range = request.headers.get("Range").cloned();
        debug!(range = range.as_deref().unwrap_or("-"), "Opening HTTP stream");

        let response = self
            .build_request(request)
            .send()
            .await
            .map_err(Self::send_error)?;

        let status = response.status();
        if !status.is_success() {
            return Err(Self::status_error(status, range.is_some()));
        }
        if range.is_some() && status == StatusCode::OK {
            debug!("Server ignored the Range header");
        }

        let headers = Self::response_headers(&response);
        let body = response.bytes_stream().map_err(std::io::Error::other);

        Ok(HttpStream {
            status: status.as_u16(),
            headers,
            body: Box::new(tokio_util::io::StreamReader::new(body)),
        })
    }
}
