//! # Playback Module
//!
//! Plays downloaded media through the platform's single media engine.
//!
//! ## Overview
//!
//! This module handles:
//! - The shared [`PlaybackSession`]: transport, seeking, now-playing
//!   publishing, remote commands, interruptions and route changes
//! - Playlist navigation with loop and shuffle
//! - The [`PlaylistReconciler`] keeping the playlist in step with the
//!   item store

pub mod config;
pub mod error;
pub mod playlist;
pub mod reconciler;
pub mod session;

pub use config::SessionConfig;
pub use error::{PlaybackError, Result};
pub use playlist::{Direction, LoopMode, PlaylistEntry};
pub use reconciler::{reconcile, PlaybackAnchor, PlaylistReconciler, PlaylistSource, Reconciliation};
pub use session::{PlaybackSession, PlaybackState};
