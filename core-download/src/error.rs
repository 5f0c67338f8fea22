use bridge_traits::error::BridgeError;
use core_library::{LibraryError, PlacementError};
use thiserror::Error;

/// Failure of a single transfer. Recorded on the item as its error message;
/// there is no automatic retry.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransferError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("Server responded with HTTP {status}")]
    Http { status: u16 },

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Transfer ended early: received {received} of {expected} bytes")]
    Truncated { received: u64, expected: u64 },

    #[error("Transfer canceled")]
    Canceled,
}

impl From<BridgeError> for TransferError {
    fn from(error: BridgeError) -> Self {
        match error {
            BridgeError::HttpStatus { status, .. } => TransferError::Http { status },
            BridgeError::Io(e) => TransferError::Storage(e.to_string()),
            other => TransferError::Network(other.to_string()),
        }
    }
}

#[derive(Error, Debug)]
pub enum DownloadError {
    #[error("Library error: {0}")]
    Library(#[from] LibraryError),

    #[error("Placement error: {0}")]
    Placement(#[from] PlacementError),

    #[error("Transfer error: {0}")]
    Transfer(#[from] TransferError),

    #[error("Bridge error: {0}")]
    Bridge(#[from] BridgeError),

    #[error("Invalid request: {field} - {message}")]
    InvalidRequest { field: String, message: String },
}

pub type Result<T> = std::result::Result<T, DownloadError>;
