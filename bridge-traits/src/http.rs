//! HTTP Client Abstraction
//!
//! Provides streaming HTTP downloads for the transfer pipeline.

use async_trait::async_trait;
use std::collections::HashMap;
use std::fmt;
use std::time::Duration;

use crate::error::Result;

/// HTTP method types
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpMethod {
    Get,
    Head,
}

/// HTTP request builder
#[derive(Debug, Clone)]
pub struct HttpRequest {
    pub method: HttpMethod,
    pub url: String,
    pub headers: HashMap<String, String>,
    pub timeout: Option<Duration>,
}

impl HttpRequest {
    pub fn new(method: HttpMethod, url: impl Into<String>) -> Self {
        Self {
            method,
            url: url.into(),
            headers: HashMap::new(),
            timeout: None,
        }
    }

    pub fn get(url: impl Into<String>) -> Self {
        Self::new(HttpMethod::Get, url)
    }

    pub fn header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(key.into(), value.into());
        self
    }

    pub fn timeout(mut self, duration: Duration) -> Self {
        self.timeout = Some(duration);
        self
    }
}

/// Streaming response returned by [`HttpClient::download`].
pub struct DownloadResponse {
    /// HTTP status code of the final response.
    pub status: u16,
    /// Declared body length, when the server sent one.
    pub content_length: Option<u64>,
    /// Filename suggested by the server via `Content-Disposition`.
    pub suggested_filename: Option<String>,
    /// MIME type from `Content-Type`, parameters stripped.
    pub mime_type: Option<String>,
    /// Response body.
    pub body: Box<dyn tokio::io::AsyncRead + Send + Unpin>,
}

impl fmt::Debug for DownloadResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DownloadResponse")
            .field("status", &self.status)
            .field("content_length", &self.content_length)
            .field("suggested_filename", &self.suggested_filename)
            .field("mime_type", &self.mime_type)
            .finish_non_exhaustive()
    }
}

impl DownloadResponse {
    /// Check if response status is successful (2xx)
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Extract the filename from a `Content-Disposition` header value.
///
/// Handles both `filename="name.ext"` and the RFC 5987 `filename*=UTF-8''name.ext`
/// forms, preferring the extended form. Percent-escapes in the extended form are
/// decoded; directory components are stripped.
pub fn parse_content_disposition(value: &str) -> Option<String> {
    let mut plain = None;
    let mut extended = None;

    for part in value.split(';').map(str::trim) {
        let Some((key, raw)) = part.split_once('=') else {
            continue;
        };
        let key = key.trim().to_ascii_lowercase();
        let raw = raw.trim();
        if key == "filename*" {
            let encoded = raw.rsplit("''").next().unwrap_or(raw);
            extended = urlencoding::decode(encoded.trim_matches('"'))
                .ok()
                .map(|name| name.into_owned());
        } else if key == "filename" {
            plain = Some(raw.trim_matches('"').to_string());
        }
    }

    extended
        .or(plain)
        .map(|name| {
            name.rsplit(['/', '\\'])
                .next()
                .unwrap_or_default()
                .trim()
                .to_string()
        })
        .filter(|name| !name.is_empty() && name != "." && name != "..")
}

/// Async HTTP client trait
///
/// Implementations should handle TLS validation, redirects and connection
/// pooling. Non-2xx statuses must surface as [`BridgeError::HttpStatus`](crate::BridgeError::HttpStatus)
/// rather than a successful response with an error body.
///
/// # Example
///
/// ```ignore
/// use bridge_traits::http::{HttpClient, HttpRequest};
///
/// async fn fetch(client: &dyn HttpClient) -> Result<u64> {
///     let response = client.download(HttpRequest::get("https://example.com/a.mp4")).await?;
///     Ok(response.content_length.unwrap_or(0))
/// }
/// ```
#[async_trait]
pub trait HttpClient: Send + Sync {
    /// Start a download and return the streaming body.
    ///
    /// # Errors
    ///
    /// Returns error if:
    /// - Network connection fails
    /// - TLS validation fails
    /// - Request times out
    /// - The server answers with a non-success status
    async fn download(&self, request: HttpRequest) -> Result<DownloadResponse>;
}
