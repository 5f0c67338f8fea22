//! Download item repository trait and SQLite implementation

use crate::error::{LibraryError, Result};
use crate::models::{DownloadItem, DownloadStatus, ItemFilter, ItemId, MediaKind, SortOrder};
use async_trait::async_trait;
use sqlx::{FromRow, QueryBuilder, Sqlite, SqlitePool};
use std::time::Duration;

const ITEM_COLUMNS: &str = "id, title, source_url, thumb_url, local_path, status, progress, \
     file_size, created_at, error_message, media_kind, duration_ms, format";

/// Raw data access for download records.
///
/// Implementations do not serialize writers; callers go through
/// [`ItemStore`](crate::store::ItemStore), which owns the single write path.
#[async_trait]
pub trait DownloadItemRepository: Send + Sync {
    /// Find an item by its ID
    async fn find_by_id(&self, id: ItemId) -> Result<Option<DownloadItem>>;

    /// All items matching `filter`, in `sort` order
    async fn query(&self, filter: ItemFilter, sort: SortOrder) -> Result<Vec<DownloadItem>>;

    /// Number of items matching `filter`
    async fn count(&self, filter: ItemFilter) -> Result<u64>;

    /// Insert the item, or replace every mutable column if the id exists.
    ///
    /// Insertion order (used as the sort tiebreaker) is kept on replace.
    async fn upsert(&self, item: &DownloadItem) -> Result<()>;

    /// Delete the given ids in one transaction.
    ///
    /// # Returns
    /// Number of rows removed
    async fn delete_many(&self, ids: &[ItemId]) -> Result<u64>;

    /// Delete every row
    async fn delete_all(&self) -> Result<u64>;

    /// Move the given ids to `Failed` with `message`, in one transaction.
    /// Rows already terminal are left alone.
    async fn mark_failed(&self, ids: &[ItemId], message: &str) -> Result<u64>;
}

/// Row shape of the `download_items` table.
#[derive(Debug, FromRow)]
struct DownloadItemRow {
    id: String,
    title: String,
    source_url: String,
    thumb_url: Option<String>,
    local_path: Option<String>,
    status: String,
    progress: f64,
    file_size: i64,
    created_at: i64,
    error_message: Option<String>,
    media_kind: String,
    duration_ms: Option<i64>,
    format: Option<String>,
}

impl TryFrom<DownloadItemRow> for DownloadItem {
    type Error = LibraryError;

    fn try_from(row: DownloadItemRow) -> Result<Self> {
        let invalid = |field: &str, message: String| LibraryError::InvalidInput {
            field: field.to_string(),
            message,
        };

        Ok(DownloadItem {
            id: ItemId::from_string(&row.id).map_err(|e| invalid("id", e.to_string()))?,
            title: row.title,
            source_url: row.source_url,
            thumb_url: row.thumb_url,
            local_path: row.local_path,
            status: row
                .status
                .parse::<DownloadStatus>()
                .map_err(|e| invalid("status", e))?,
            progress: row.progress,
            file_size: row.file_size.max(0) as u64,
            created_at: row.created_at,
            error_message: row.error_message,
            media_kind: row
                .media_kind
                .parse::<MediaKind>()
                .map_err(|e| invalid("media_kind", e))?,
            duration: row
                .duration_ms
                .filter(|ms| *ms >= 0)
                .map(|ms| Duration::from_millis(ms as u64)),
            format: row.format,
        })
    }
}

/// SQLite implementation of DownloadItemRepository
pub struct SqliteDownloadItemRepository {
    pool: SqlitePool,
}

impl SqliteDownloadItemRepository {
    /// Create a new SQLite download item repository
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    fn push_filter(builder: &mut QueryBuilder<'_, Sqlite>, filter: ItemFilter) {
        builder.push(" WHERE 1 = 1");
        if let Some(kind) = filter.kind {
            builder.push(" AND media_kind = ").push_bind(kind.as_str());
        }
        if let Some(status) = filter.status {
            builder.push(" AND status = ").push_bind(status.as_str());
        }
    }

    fn push_id_list(builder: &mut QueryBuilder<'_, Sqlite>, ids: &[ItemId]) {
        builder.push(" (");
        let mut separated = builder.separated(", ");
        for id in ids {
            separated.push_bind(id.to_string());
        }
        separated.push_unseparated(")");
    }
}

#[async_trait]
impl DownloadItemRepository for SqliteDownloadItemRepository {
    async fn find_by_id(&self, id: ItemId) -> Result<Option<DownloadItem>> {
        let sql = format!("SELECT {} FROM download_items WHERE id = ?", ITEM_COLUMNS);
        let row = sqlx::query_as::<_, DownloadItemRow>(&sql)
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await?;

        row.map(DownloadItem::try_from).transpose()
    }

    async fn query(&self, filter: ItemFilter, sort: SortOrder) -> Result<Vec<DownloadItem>> {
        let mut builder = QueryBuilder::<Sqlite>::new(format!(
            "SELECT {} FROM download_items",
            ITEM_COLUMNS
        ));
        Self::push_filter(&mut builder, filter);
        builder.push(" ORDER BY ").push(sort.order_by_clause());

        let rows = builder
            .build_query_as::<DownloadItemRow>()
            .fetch_all(&self.pool)
            .await?;

        rows.into_iter().map(DownloadItem::try_from).collect()
    }

    async fn count(&self, filter: ItemFilter) -> Result<u64> {
        let mut builder = QueryBuilder::<Sqlite>::new("SELECT COUNT(*) FROM download_items");
        Self::push_filter(&mut builder, filter);

        let (total,): (i64,) = builder.build_query_as().fetch_one(&self.pool).await?;
        Ok(total.max(0) as u64)
    }

    async fn upsert(&self, item: &DownloadItem) -> Result<()> {
        item.validate().map_err(|msg| LibraryError::InvalidInput {
            field: "item".to_string(),
            message: msg,
        })?;

        sqlx::query(
            r#"
            INSERT INTO download_items (
                id, title, source_url, thumb_url, local_path,
                status, progress, file_size, created_at, error_message,
                media_kind, duration_ms, format
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                title = excluded.title,
                source_url = excluded.source_url,
                thumb_url = excluded.thumb_url,
                local_path = excluded.local_path,
                status = excluded.status,
                progress = excluded.progress,
                file_size = excluded.file_size,
                created_at = excluded.created_at,
                error_message = excluded.error_message,
                media_kind = excluded.media_kind,
                duration_ms = excluded.duration_ms,
                format = excluded.format
            "#,
        )
        .bind(item.id.to_string())
        .bind(&item.title)
        .bind(&item.source_url)
        .bind(&item.thumb_url)
        .bind(&item.local_path)
        .bind(item.status.as_str())
        .bind(item.progress)
        .bind(item.file_size as i64)
        .bind(item.created_at)
        .bind(&item.error_message)
        .bind(item.media_kind.as_str())
        .bind(item.duration.map(|d| d.as_millis() as i64))
        .bind(&item.format)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn delete_many(&self, ids: &[ItemId]) -> Result<u64> {
        if ids.is_empty() {
            return Ok(0);
        }

        let mut tx = self.pool.begin().await?;
        let mut removed = 0;
        // Chunked to stay under SQLite's bound-parameter limit.
        for chunk in ids.chunks(500) {
            let mut builder = QueryBuilder::<Sqlite>::new("DELETE FROM download_items WHERE id IN");
            Self::push_id_list(&mut builder, chunk);
            removed += builder.build().execute(&mut *tx).await?.rows_affected();
        }
        tx.commit().await?;

        Ok(removed)
    }

    async fn delete_all(&self) -> Result<u64> {
        let result = sqlx::query("DELETE FROM download_items")
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    async fn mark_failed(&self, ids: &[ItemId], message: &str) -> Result<u64> {
        if ids.is_empty() {
            return Ok(0);
        }

        let mut tx = self.pool.begin().await?;
        let mut updated = 0;
        for chunk in ids.chunks(500) {
            let mut builder = QueryBuilder::<Sqlite>::new("UPDATE download_items SET status = ");
            builder
                .push_bind(DownloadStatus::Failed.as_str())
                .push(", error_message = ")
                .push_bind(message.to_string())
                .push(", local_path = NULL WHERE status IN ('queued', 'running') AND id IN");
            Self::push_id_list(&mut builder, chunk);
            updated += builder.build().execute(&mut *tx).await?.rows_affected();
        }
        tx.commit().await?;

        Ok(updated)
    }
}
