use bridge_traits::error::BridgeError;
use thiserror::Error;

use crate::models::DownloadStatus;

#[derive(Error, Debug)]
pub enum LibraryError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Bridge error: {0}")]
    Bridge(#[from] BridgeError),

    #[error("Entity not found: {entity_type} with id {id}")]
    NotFound { entity_type: String, id: String },

    #[error("Invalid input: {field} - {message}")]
    InvalidInput { field: String, message: String },

    #[error("Invalid status transition for item {id}: {from} -> {to}")]
    InvalidTransition {
        id: String,
        from: DownloadStatus,
        to: DownloadStatus,
    },

    #[error("Migration failed: {0}")]
    Migration(String),

    #[error("Placement failed: {0}")]
    Placement(#[from] PlacementError),
}

/// Failures while choosing or resolving an on-disk location.
#[derive(Error, Debug)]
pub enum PlacementError {
    #[error("No free file name for '{base}' after {attempts} attempts")]
    NameExhausted { base: String, attempts: u32 },

    #[error("Stored path must be relative to the media root: {0}")]
    InvalidPath(String),

    #[error("Path is outside the media root: {0}")]
    OutsideRoot(String),

    #[error("File system error: {0}")]
    FileSystem(#[from] BridgeError),
}

pub type Result<T> = std::result::Result<T, LibraryError>;
