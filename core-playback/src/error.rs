//! # Playback Error Types
//!
//! Errors returned by playback operations. Engine failures are not errors:
//! an unplayable source shows up as `is_playing() == false` and as a
//! [`PlaybackEvent::Error`](core_runtime::events::PlaybackEvent::Error).

use bridge_traits::error::BridgeError;
use thiserror::Error;

/// Errors that can occur during playback operations.
#[derive(Error, Debug)]
pub enum PlaybackError {
    // ========================================================================
    // Playlist Errors
    // ========================================================================
    /// Requested entry does not exist in the current playlist.
    #[error("Playlist index {index} out of range (playlist has {len} entries)")]
    IndexOutOfRange { index: usize, len: usize },

    /// Attempted operation when no source is loaded.
    #[error("No media source loaded")]
    NoSource,

    // ========================================================================
    // Layer Errors
    // ========================================================================
    /// Platform bridge failure (audio session, lifecycle observer).
    #[error("Bridge error: {0}")]
    Bridge(#[from] BridgeError),
}

/// Result type for playback operations.
pub type Result<T> = std::result::Result<T, PlaybackError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bridge_failures_convert() {
        let error: PlaybackError = BridgeError::NotAvailable("audio session".to_string()).into();
        assert!(matches!(error, PlaybackError::Bridge(_)));
        assert_eq!(
            error.to_string(),
            "Bridge error: Bridge capability not available: audio session"
        );
    }

    #[test]
    fn test_index_error_names_playlist_length() {
        let error = PlaybackError::IndexOutOfRange { index: 4, len: 2 };
        assert_eq!(
            error.to_string(),
            "Playlist index 4 out of range (playlist has 2 entries)"
        );
    }
}
