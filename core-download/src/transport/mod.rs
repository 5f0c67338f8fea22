//! # Transfer Transport
//!
//! A [`Transport`] moves bytes for one transfer and reports back through a
//! [`TransferDelegate`]. Callbacks for a single transfer arrive in order;
//! callbacks for different transfers may interleave.
//!
//! ## Implementations
//!
//! - [`HttpTransport`] - streams over the host [`HttpClient`](bridge_traits::HttpClient)
//!   into a temp file, with a concurrency limit
//! - [`HostTransport`] - hands requests to a platform transfer service
//!   (e.g. a background URL session) that reports callbacks itself

mod host;
mod http;

pub use host::{HostTransport, PendingTransfer};
pub use http::HttpTransport;

use crate::error::TransferError;
use async_trait::async_trait;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Process-local identifier of one in-flight transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TransferId(pub u64);

impl fmt::Display for TransferId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "transfer-{}", self.0)
    }
}

/// Everything a transport needs to run one transfer.
#[derive(Debug, Clone)]
pub struct TransferRequest {
    pub id: TransferId,
    pub url: String,
    /// Where the transport writes the body before completion.
    pub temp_path: PathBuf,
    /// Cancelled when the user cancels the download.
    pub cancel: CancellationToken,
}

/// Outcome of a transfer that received its whole body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletedTransfer {
    /// The downloaded body
    pub temp_location: PathBuf,
    /// File name from `Content-Disposition`, if the server sent one
    pub suggested_filename: Option<String>,
    pub mime_type: Option<String>,
}

impl CompletedTransfer {
    pub fn new(temp_location: impl Into<PathBuf>) -> Self {
        Self {
            temp_location: temp_location.into(),
            suggested_filename: None,
            mime_type: None,
        }
    }

    pub fn with_suggested_filename(mut self, name: Option<String>) -> Self {
        self.suggested_filename = name;
        self
    }

    pub fn with_mime_type(mut self, mime_type: Option<String>) -> Self {
        self.mime_type = mime_type;
        self
    }
}

/// Receiver of transfer callbacks.
///
/// Callbacks for unknown or already finished transfers must be ignored.
#[async_trait]
pub trait TransferDelegate: Send + Sync {
    /// The transfer acquired a slot and began moving bytes.
    async fn on_started(&self, id: TransferId);

    /// `written` bytes so far out of `expected`, when the length is known.
    async fn on_progress(&self, id: TransferId, written: u64, expected: Option<u64>);

    async fn on_complete(&self, id: TransferId, completed: CompletedTransfer);

    async fn on_failure(&self, id: TransferId, error: TransferError);
}

/// Starts transfers. Implementations return immediately and report
/// asynchronously through the delegate.
pub trait Transport: Send + Sync {
    fn start(&self, request: TransferRequest, delegate: Arc<dyn TransferDelegate>);
}
