//! # Core Configuration Module
//!
//! Provides configuration management for the offline media core.
//!
//! ## Overview
//!
//! The configuration system uses a builder pattern to construct a `CoreConfig`
//! instance that holds all bridges and settings the core needs. It enforces
//! fail-fast validation so a misconfigured host learns about it at startup,
//! not in the middle of a download.
//!
//! ## Required Settings
//!
//! - `media_root` - Well-known root every stored `localPath` is relative to
//! - `database_path` - SQLite file backing the item store
//!
//! ## Optional Dependencies (with platform defaults)
//!
//! - `HttpClient` - Streaming downloads (desktop default: reqwest)
//! - `FileSystemAccess` - File I/O (desktop default: tokio fs)
//! - `LifecycleObserver` - App lifecycle (optional)
//!
//! When the `desktop-shims` feature is enabled, desktop-ready defaults for
//! `HttpClient` and `FileSystemAccess` are injected if not provided.
//!
//! ## Usage
//!
//! ```ignore
//! use core_runtime::config::CoreConfig;
//!
//! let config = CoreConfig::builder()
//!     .media_root("/path/to/Documents")
//!     .database_path("/path/to/Library/items.db")
//!     .max_concurrent_transfers(4)
//!     .build()
//!     .expect("Failed to build config");
//! ```
//!
//! ## Error Handling
//!
//! ```should_panic
//! use core_runtime::config::CoreConfig;
//!
//! // Panics with an actionable error message: no media root.
//! let config = CoreConfig::builder()
//!     .database_path("/path/to/items.db")
//!     .build()
//!     .expect("Should fail - missing media root");
//! ```

use crate::error::{Error, Result};
use crate::events::DEFAULT_EVENT_BUFFER_SIZE;
use bridge_traits::{FileSystemAccess, HttpClient, LifecycleObserver};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Name of the transfer scratch directory created under the media root when
/// no explicit temp directory is configured.
pub const DEFAULT_TEMP_DIR_NAME: &str = ".transfers";

/// Default number of transfers allowed to move bytes at once.
pub const DEFAULT_MAX_CONCURRENT_TRANSFERS: usize = 3;

const MAX_CONCURRENT_TRANSFERS_LIMIT: usize = 16;

/// Core configuration for the offline media core.
///
/// Use [`CoreConfigBuilder`] to construct instances.
#[derive(Clone)]
pub struct CoreConfig {
    /// Root directory that stored relative paths resolve against
    pub media_root: PathBuf,

    /// Path to the SQLite database file
    pub database_path: PathBuf,

    /// Scratch directory for in-flight transfer bodies
    pub temp_dir: PathBuf,

    /// HTTP client for downloads (optional with desktop default)
    pub http_client: Option<Arc<dyn HttpClient>>,

    /// File system access abstraction (optional with desktop default)
    pub file_system: Option<Arc<dyn FileSystemAccess>>,

    /// App lifecycle observer (optional)
    pub lifecycle_observer: Option<Arc<dyn LifecycleObserver>>,

    /// Maximum number of transfers moving bytes at once
    pub max_concurrent_transfers: usize,

    /// Event bus channel capacity
    pub event_buffer_size: usize,

    /// Features flags
    pub features: FeatureFlags,
}

impl std::fmt::Debug for CoreConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CoreConfig")
            .field("media_root", &self.media_root)
            .field("database_path", &self.database_path)
            .field("temp_dir", &self.temp_dir)
            .field(
                "http_client",
                &self.http_client.as_ref().map(|_| "HttpClient { ... }"),
            )
            .field(
                "file_system",
                &self
                    .file_system
                    .as_ref()
                    .map(|_| "FileSystemAccess { ... }"),
            )
            .field(
                "lifecycle_observer",
                &self
                    .lifecycle_observer
                    .as_ref()
                    .map(|_| "LifecycleObserver { ... }"),
            )
            .field("max_concurrent_transfers", &self.max_concurrent_transfers)
            .field("event_buffer_size", &self.event_buffer_size)
            .field("features", &self.features)
            .finish()
    }
}

/// Feature flags control optional startup behavior.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FeatureFlags {
    /// Mark items left Queued/Running by a previous process as failed on startup
    pub recover_orphans_on_start: bool,

    /// Delete leftover transfer bodies from the temp directory on startup
    pub sweep_temp_on_start: bool,
}

impl Default for FeatureFlags {
    fn default() -> Self {
        Self {
            recover_orphans_on_start: true,
            sweep_temp_on_start: true,
        }
    }
}

impl CoreConfig {
    /// Creates a new builder for constructing a `CoreConfig`.
    pub fn builder() -> CoreConfigBuilder {
        CoreConfigBuilder::default()
    }

    /// Validates the configuration and returns an error if invalid.
    ///
    /// This checks:
    /// - Paths are not empty
    /// - The media root is absolute
    /// - The temp directory is not the media root or one of its kind directories
    /// - Concurrency and buffer sizes are in range
    pub fn validate(&self) -> Result<()> {
        if self.media_root.as_os_str().is_empty() {
            return Err(Error::Config("Media root cannot be empty".to_string()));
        }

        if !self.media_root.is_absolute() {
            return Err(Error::Config(format!(
                "Media root must be an absolute path, got {:?}",
                self.media_root
            )));
        }

        if self.database_path.as_os_str().is_empty() {
            return Err(Error::Config("Database path cannot be empty".to_string()));
        }

        if self.temp_dir.as_os_str().is_empty() {
            return Err(Error::Config("Temp directory cannot be empty".to_string()));
        }

        if self.temp_dir == self.media_root {
            return Err(Error::Config(
                "Temp directory must differ from the media root; \
                 leftover transfer bodies are swept on startup."
                    .to_string(),
            ));
        }

        if self.max_concurrent_transfers == 0 {
            return Err(Error::Config(
                "max_concurrent_transfers must be greater than 0".to_string(),
            ));
        }

        if self.max_concurrent_transfers > MAX_CONCURRENT_TRANSFERS_LIMIT {
            return Err(Error::Config(format!(
                "max_concurrent_transfers exceeds maximum of {}",
                MAX_CONCURRENT_TRANSFERS_LIMIT
            )));
        }

        if self.event_buffer_size == 0 {
            return Err(Error::Config(
                "Event buffer size must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }
}

#[cfg(not(feature = "desktop-shims"))]
fn http_client_missing_error() -> Error {
    Error::CapabilityMissing {
        capability: "HttpClient".to_string(),
        message: "No HTTP client implementation provided. \
                 Desktop: ensure the 'desktop-shims' feature is enabled to use the default ReqwestHttpClient. \
                 Mobile: inject a URLSession/OkHttp-backed adapter."
            .to_string(),
    }
}

#[cfg(not(feature = "desktop-shims"))]
fn file_system_missing_error() -> Error {
    Error::CapabilityMissing {
        capability: "FileSystemAccess".to_string(),
        message: "No FileSystemAccess implementation provided. \
                 Desktop: ensure the 'desktop-shims' feature is enabled to use the default TokioFileSystem. \
                 Mobile: inject a sandbox-aware file system adapter."
            .to_string(),
    }
}

#[cfg(feature = "desktop-shims")]
fn provide_default_http_client() -> Result<Arc<dyn HttpClient>> {
    use bridge_desktop::ReqwestHttpClient;

    let client = ReqwestHttpClient::new()
        .map_err(|e| Error::Internal(format!("Failed to create default HttpClient: {}", e)))?;
    Ok(Arc::new(client))
}

#[cfg(not(feature = "desktop-shims"))]
fn provide_default_http_client() -> Result<Arc<dyn HttpClient>> {
    Err(http_client_missing_error())
}

#[cfg(feature = "desktop-shims")]
fn provide_default_file_system(media_root: &Path, temp_dir: &Path) -> Result<Arc<dyn FileSystemAccess>> {
    use bridge_desktop::TokioFileSystem;

    Ok(Arc::new(TokioFileSystem::with_directories(
        temp_dir.to_path_buf(),
        media_root.to_path_buf(),
    )))
}

#[cfg(not(feature = "desktop-shims"))]
fn provide_default_file_system(
    _media_root: &Path,
    _temp_dir: &Path,
) -> Result<Arc<dyn FileSystemAccess>> {
    Err(file_system_missing_error())
}

/// Builder for constructing [`CoreConfig`] instances.
#[derive(Default)]
pub struct CoreConfigBuilder {
    media_root: Option<PathBuf>,
    database_path: Option<PathBuf>,
    temp_dir: Option<PathBuf>,
    http_client: Option<Arc<dyn HttpClient>>,
    file_system: Option<Arc<dyn FileSystemAccess>>,
    lifecycle_observer: Option<Arc<dyn LifecycleObserver>>,
    max_concurrent_transfers: Option<usize>,
    event_buffer_size: Option<usize>,
    features: FeatureFlags,
}

impl CoreConfigBuilder {
    /// Sets the media root (required).
    ///
    /// Every stored `localPath` is relative to this directory, so pass the
    /// location as it exists for the current install, not a cached one.
    ///
    /// ```
    /// use core_runtime::config::CoreConfig;
    ///
    /// let builder = CoreConfig::builder()
    ///     .media_root("/var/mobile/Containers/Data/Application/X/Documents");
    /// ```
    pub fn media_root<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.media_root = Some(path.into());
        self
    }

    /// Sets the database path (required).
    pub fn database_path<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.database_path = Some(path.into());
        self
    }

    /// Sets the transfer scratch directory.
    ///
    /// Default: `<media_root>/.transfers`
    pub fn temp_dir<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.temp_dir = Some(path.into());
        self
    }

    /// Sets the HTTP client implementation.
    ///
    /// If not provided, the desktop default (reqwest-based) will be used when
    /// the `desktop-shims` feature is enabled.
    pub fn http_client(mut self, client: Arc<dyn HttpClient>) -> Self {
        self.http_client = Some(client);
        self
    }

    /// Sets the file system access implementation.
    ///
    /// If not provided, the desktop default (tokio fs-based) will be used when
    /// the `desktop-shims` feature is enabled.
    pub fn file_system(mut self, fs: Arc<dyn FileSystemAccess>) -> Self {
        self.file_system = Some(fs);
        self
    }

    /// Sets the lifecycle observer implementation (optional).
    pub fn lifecycle_observer(mut self, observer: Arc<dyn LifecycleObserver>) -> Self {
        self.lifecycle_observer = Some(observer);
        self
    }

    /// Sets how many transfers may move bytes at once.
    ///
    /// Default: 3. Valid range: 1..=16.
    pub fn max_concurrent_transfers(mut self, count: usize) -> Self {
        self.max_concurrent_transfers = Some(count);
        self
    }

    /// Sets the event bus capacity.
    pub fn event_buffer_size(mut self, size: usize) -> Self {
        self.event_buffer_size = Some(size);
        self
    }

    /// Enables or disables orphan recovery on startup.
    ///
    /// Default: true
    pub fn recover_orphans_on_start(mut self, enabled: bool) -> Self {
        self.features.recover_orphans_on_start = enabled;
        self
    }

    /// Enables or disables the temp directory sweep on startup.
    ///
    /// Default: true
    pub fn sweep_temp_on_start(mut self, enabled: bool) -> Self {
        self.features.sweep_temp_on_start = enabled;
        self
    }

    /// Sets all feature flags at once.
    pub fn features(mut self, features: FeatureFlags) -> Self {
        self.features = features;
        self
    }

    /// Builds the final `CoreConfig` instance.
    ///
    /// Returns an error if:
    /// - Required settings are missing (media root, database path)
    /// - A bridge is missing and no platform default is compiled in
    /// - Configuration values are invalid
    pub fn build(self) -> Result<CoreConfig> {
        let media_root = self.media_root.ok_or_else(|| {
            Error::Config("Media root is required. Use .media_root() to set it.".to_string())
        })?;

        let database_path = self.database_path.ok_or_else(|| {
            Error::Config("Database path is required. Use .database_path() to set it.".to_string())
        })?;

        let temp_dir = self
            .temp_dir
            .unwrap_or_else(|| media_root.join(DEFAULT_TEMP_DIR_NAME));

        let http_client = match self.http_client {
            Some(client) => client,
            None => provide_default_http_client()?,
        };

        let file_system = match self.file_system {
            Some(fs) => fs,
            None => provide_default_file_system(&media_root, &temp_dir)?,
        };

        let config = CoreConfig {
            media_root,
            database_path,
            temp_dir,
            http_client: Some(http_client),
            file_system: Some(file_system),
            lifecycle_observer: self.lifecycle_observer,
            max_concurrent_transfers: self
                .max_concurrent_transfers
                .unwrap_or(DEFAULT_MAX_CONCURRENT_TRANSFERS),
            event_buffer_size: self.event_buffer_size.unwrap_or(DEFAULT_EVENT_BUFFER_SIZE),
            features: self.features,
        };

        config.validate()?;

        Ok(config)
    }
}
