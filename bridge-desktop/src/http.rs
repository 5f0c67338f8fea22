//! HTTP Client Implementation using Reqwest

use async_trait::async_trait;
use bridge_traits::{
    error::{BridgeError, Result},
    http::{parse_content_disposition, DownloadResponse, HttpClient, HttpMethod, HttpRequest},
};
use futures_util::TryStreamExt;
use reqwest::{header, Client};
use std::time::Duration;
use tracing::{debug, warn};

/// Reqwest-based HTTP client implementation
///
/// Provides streaming downloads with:
/// - Connection pooling via reqwest
/// - TLS support by default (rustls)
/// - Redirect following
///
/// There is no retry layer; the download pipeline surfaces failures to the
/// user instead.
pub struct ReqwestHttpClient {
    client: Client,
}

impl ReqwestHttpClient {
    /// Create a new HTTP client with default configuration
    pub fn new() -> Result<Self> {
        Self::with_connect_timeout(Duration::from_secs(10))
    }

    /// Create a new HTTP client with a custom connect timeout.
    ///
    /// No total request timeout is set because media bodies can take minutes
    /// to stream; per-request timeouts come from [`HttpRequest::timeout`].
    pub fn with_connect_timeout(timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .connect_timeout(timeout)
            .pool_max_idle_per_host(10)
            .user_agent(concat!("offline-media-core/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| BridgeError::OperationFailed(format!("HTTP client setup failed: {e}")))?;

        Ok(Self { client })
    }

    /// Create a new HTTP client with custom configuration
    pub fn with_client(client: Client) -> Self {
        Self { client }
    }

    fn convert_method(method: HttpMethod) -> reqwest::Method {
        match method {
            HttpMethod::Get => reqwest::Method::GET,
            HttpMethod::Head => reqwest::Method::HEAD,
        }
    }

    fn build_request(&self, request: &HttpRequest) -> reqwest::RequestBuilder {
        let method = Self::convert_method(request.method);
        let mut req = self.client.request(method, &request.url);

        for (key, value) in &request.headers {
            req = req.header(key, value);
        }

        if let Some(timeout) = request.timeout {
            req = req.timeout(timeout);
        }

        req
    }

    fn map_send_error(e: reqwest::Error) -> BridgeError {
        if e.is_timeout() {
            BridgeError::OperationFailed("Request timed out".to_string())
        } else if e.is_connect() {
            BridgeError::OperationFailed(format!("Connection failed: {}", e))
        } else {
            BridgeError::OperationFailed(e.to_string())
        }
    }
}

fn header_str(headers: &header::HeaderMap, name: header::HeaderName) -> Option<&str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}

#[async_trait]
impl HttpClient for ReqwestHttpClient {
    async fn download(&self, request: HttpRequest) -> Result<DownloadResponse> {
        debug!(url = %request.url, "Starting HTTP download");

        let response = self
            .build_request(&request)
            .send()
            .await
            .map_err(Self::map_send_error)?;

        let status = response.status().as_u16();
        if !response.status().is_success() {
            warn!(status, url = %request.url, "HTTP download rejected");
            return Err(BridgeError::HttpStatus {
                status,
                url: request.url,
            });
        }

        let headers = response.headers();
        let suggested_filename =
            header_str(headers, header::CONTENT_DISPOSITION).and_then(parse_content_disposition);
        let mime_type = header_str(headers, header::CONTENT_TYPE)
            .and_then(|v| v.split(';').next())
            .map(|v| v.trim().to_ascii_lowercase())
            .filter(|v| !v.is_empty());
        let content_length = response.content_length();

        let stream = response.bytes_stream().map_err(std::io::Error::other);
        let reader = tokio_util::io::StreamReader::new(stream);

        Ok(DownloadResponse {
            status,
            content_length,
            suggested_filename,
            mime_type,
            body: Box::new(reader),
        })
    }
}
