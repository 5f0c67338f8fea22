//! # Download Library Module
//!
//! Owns the canonical download database and the on-disk media layout.
//!
//! ## Overview
//!
//! This module manages:
//! - SQLite database schema and migrations
//! - The download item repository and the serialized [`ItemStore`] write path
//! - Live queries delivering index diffs to observers
//! - File placement under per-kind directories of the media root

pub mod db;
pub mod error;
pub mod live_query;
pub mod models;
pub mod placement;
pub mod repositories;
pub mod store;

pub use error::{LibraryError, PlacementError, Result};
pub use live_query::{ChangeKind, ChangeSet, IndexDiff, LiveQuery};
pub use models::{DownloadItem, DownloadStatus, ItemFilter, ItemId, MediaKind, SortOrder};
pub use placement::FilePlacement;
pub use store::ItemStore;
