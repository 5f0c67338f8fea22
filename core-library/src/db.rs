//! # Store Database
//!
//! Opens the SQLite database behind [`ItemStore`](crate::ItemStore) and
//! brings its schema up to date.
//!
//! File databases run in WAL mode so live-query reads never wait on the
//! store's single writer. An in-memory database holds exactly one
//! connection, since every connection to `:memory:` opens a separate
//! database.

use crate::{LibraryError, Result};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::{Pool, Sqlite};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info, warn};

const DEFAULT_MAX_CONNECTIONS: u32 = 4;
const DEFAULT_ACQUIRE_TIMEOUT: Duration = Duration::from_secs(30);

/// Where the store lives and how large its pool may grow.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatabaseConfig {
    /// `None` for an in-memory database
    path: Option<PathBuf>,
    max_connections: u32,
    acquire_timeout: Duration,
}

impl DatabaseConfig {
    /// File database at `path`, created if missing.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: Some(path.into()),
            max_connections: DEFAULT_MAX_CONNECTIONS,
            acquire_timeout: DEFAULT_ACQUIRE_TIMEOUT,
        }
    }

    pub fn in_memory() -> Self {
        Self {
            path: None,
            max_connections: 1,
            acquire_timeout: DEFAULT_ACQUIRE_TIMEOUT,
        }
    }

    /// Upper bound on pooled connections. Ignored for in-memory databases.
    pub fn max_connections(mut self, max: u32) -> Self {
        if self.path.is_some() {
            self.max_connections = max.max(1);
        }
        self
    }

    /// How long a query waits for a free connection.
    pub fn acquire_timeout(mut self, timeout: Duration) -> Self {
        self.acquire_timeout = timeout;
        self
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    fn connect_options(&self) -> SqliteConnectOptions {
        let options = match &self.path {
            Some(path) => SqliteConnectOptions::new()
                .filename(path)
                .create_if_missing(true)
                .journal_mode(SqliteJournalMode::Wal),
            None => SqliteConnectOptions::new().in_memory(true),
        };
        options.synchronous(SqliteSynchronous::Normal)
    }
}

/// Open the database described by `config` and apply pending migrations.
///
/// # Errors
/// Returns error if the database cannot be opened or a migration fails.
pub async fn create_pool(config: DatabaseConfig) -> Result<Pool<Sqlite>> {
    let pool = SqlitePoolOptions::new()
        .max_connections(config.max_connections)
        .acquire_timeout(config.acquire_timeout)
        .connect_with(config.connect_options())
        .await
        .map_err(|e| {
            warn!(error = %e, "Failed to open store database");
            LibraryError::Database(e)
        })?;

    sqlx::migrate!("./migrations").run(&pool).await.map_err(|e| {
        warn!(error = %e, "Store migration failed");
        LibraryError::Migration(e.to_string())
    })?;

    match config.path() {
        Some(path) => info!(
            database = %path.display(),
            max_connections = config.max_connections,
            "Store database ready"
        ),
        None => debug!("In-memory store database ready"),
    }
    Ok(pool)
}

/// Migrated in-memory database for tests.
pub async fn create_test_pool() -> Result<Pool<Sqlite>> {
    create_pool(DatabaseConfig::in_memory()).await
}
