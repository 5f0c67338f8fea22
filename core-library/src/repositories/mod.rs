//! # Repository Pattern Implementation
//!
//! Repository traits and SQLite implementations for data access.
//!
//! ## Architecture
//!
//! - Traits define the interface for each repository
//! - SQLite implementations use sqlx for async database access
//! - All operations return `Result<T>` for error handling
//!
//! ## Available Repositories
//!
//! - `DownloadItemRepository` - Download records with status and progress

pub mod download_item;

pub use download_item::{DownloadItemRepository, SqliteDownloadItemRepository};
