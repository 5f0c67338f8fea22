//! # Persistent Item Store
//!
//! The single source of truth for download records. Every write goes through
//! one async mutex, so concurrent writers (several transfers reporting at
//! once) never interleave partial writes. After each committed write the
//! store bumps a revision counter; [`LiveQuery`] observers re-query and
//! receive index diffs on their next scheduling turn.
//!
//! Deleting a record also removes its backing file. File removal is
//! best-effort and never rolls back the database transaction.

use crate::error::{LibraryError, Result};
use crate::live_query::LiveQuery;
use crate::models::{DownloadItem, DownloadStatus, ItemFilter, ItemId, MediaKind, SortOrder};
use crate::placement::FilePlacement;
use crate::repositories::{DownloadItemRepository, SqliteDownloadItemRepository};
use core_runtime::events::{CoreEvent, EventBus, LibraryEvent};
use sqlx::SqlitePool;
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::{watch, Mutex};
use tracing::{debug, info, instrument, warn};

/// Persistent, observable store of [`DownloadItem`]s.
pub struct ItemStore {
    repo: Arc<dyn DownloadItemRepository>,
    placement: FilePlacement,
    write_lock: Mutex<()>,
    revision: watch::Sender<u64>,
    event_bus: Option<EventBus>,
}

impl ItemStore {
    /// Create a store over a migrated SQLite pool.
    pub fn new(pool: SqlitePool, placement: FilePlacement) -> Self {
        Self::with_repository(Arc::new(SqliteDownloadItemRepository::new(pool)), placement)
    }

    /// Create a store over any repository implementation.
    pub fn with_repository(
        repo: Arc<dyn DownloadItemRepository>,
        placement: FilePlacement,
    ) -> Self {
        let (revision, _) = watch::channel(0);
        Self {
            repo,
            placement,
            write_lock: Mutex::new(()),
            revision,
            event_bus: None,
        }
    }

    /// Publish [`LibraryEvent`]s for committed writes.
    pub fn with_event_bus(mut self, event_bus: EventBus) -> Self {
        self.event_bus = Some(event_bus);
        self
    }

    pub fn placement(&self) -> &FilePlacement {
        &self.placement
    }

    // ------------------------------------------------------------------
    // Writes
    // ------------------------------------------------------------------

    /// Insert a new record or replace an existing one with the same id.
    ///
    /// Replacing is subject to the same status rules as [`update`](Self::update).
    #[instrument(skip(self, item), fields(item_id = %item.id))]
    pub async fn create_or_update(&self, item: DownloadItem) -> Result<DownloadItem> {
        let _guard = self.write_lock.lock().await;

        if let Some(existing) = self.repo.find_by_id(item.id).await? {
            check_transition(&existing, &item)?;
            if existing == item {
                return Ok(item);
            }
        }

        self.repo.upsert(&item).await?;
        self.commit();
        self.emit(LibraryEvent::ItemSaved {
            item_id: item.id.to_string(),
            status: item.status.to_string(),
        });
        debug!(status = %item.status, "Item saved");
        Ok(item)
    }

    /// Apply `mutation` to the stored record and persist the result.
    ///
    /// # Returns
    /// - `Ok(Some(item))` with the stored record after the mutation
    /// - `Ok(None)` if no record has this id (e.g. it was deleted while a
    ///   transfer was still reporting)
    ///
    /// A mutation that leaves the record unchanged writes nothing and
    /// notifies no one.
    ///
    /// # Errors
    /// Returns error if:
    /// - The mutation changes the id
    /// - The status change is not allowed
    /// - Progress regresses while the item is running
    /// - The record fails validation or the write fails
    pub async fn update<F>(&self, id: ItemId, mutation: F) -> Result<Option<DownloadItem>>
    where
        F: FnOnce(&mut DownloadItem) + Send,
    {
        let _guard = self.write_lock.lock().await;

        let Some(existing) = self.repo.find_by_id(id).await? else {
            debug!(item_id = %id, "Update skipped; item no longer exists");
            return Ok(None);
        };

        let mut updated = existing.clone();
        mutation(&mut updated);

        if updated == existing {
            return Ok(Some(existing));
        }
        check_transition(&existing, &updated)?;

        self.repo.upsert(&updated).await?;
        self.commit();
        if updated.status != existing.status {
            self.emit(LibraryEvent::ItemSaved {
                item_id: id.to_string(),
                status: updated.status.to_string(),
            });
        }
        Ok(Some(updated))
    }

    /// Change an item's title.
    #[instrument(skip(self, title), fields(item_id = %id))]
    pub async fn rename(&self, id: ItemId, title: &str) -> Result<DownloadItem> {
        let title = title.trim().to_string();
        if title.is_empty() {
            return Err(LibraryError::InvalidInput {
                field: "title".to_string(),
                message: "Title cannot be empty".to_string(),
            });
        }

        let new_title = title.clone();
        let item = self
            .update(id, move |item| item.title = new_title)
            .await?
            .ok_or_else(|| LibraryError::NotFound {
                entity_type: "DownloadItem".to_string(),
                id: id.to_string(),
            })?;

        self.emit(LibraryEvent::ItemRenamed {
            item_id: id.to_string(),
            title,
        });
        Ok(item)
    }

    /// Delete one item and its backing file.
    pub async fn delete(&self, item: &DownloadItem) -> Result<()> {
        self.delete_many(std::slice::from_ref(item)).await?;
        Ok(())
    }

    /// Delete items in one transaction, then remove their files.
    ///
    /// If the transaction fails nothing is deleted. File removal happens
    /// after commit; failures there are logged and do not resurrect records.
    ///
    /// # Returns
    /// Number of records removed
    #[instrument(skip(self, items), fields(count = items.len()))]
    pub async fn delete_many(&self, items: &[DownloadItem]) -> Result<u64> {
        let _guard = self.write_lock.lock().await;

        // The stored record is authoritative for the file location; callers
        // may hold a snapshot taken before completion.
        let mut ids = Vec::with_capacity(items.len());
        let mut paths = Vec::new();
        for item in items {
            if let Some(current) = self.repo.find_by_id(item.id).await? {
                ids.push(current.id);
                paths.extend(current.local_path);
            }
        }

        let removed = self.repo.delete_many(&ids).await?;
        if removed == 0 {
            return Ok(0);
        }
        self.commit();
        self.remove_files(&paths).await;

        info!(removed, "Items deleted");
        self.emit(LibraryEvent::ItemsDeleted {
            item_ids: ids.iter().map(ToString::to_string).collect(),
        });
        Ok(removed)
    }

    /// Delete every item and every backing file.
    #[instrument(skip(self))]
    pub async fn delete_all(&self) -> Result<u64> {
        let _guard = self.write_lock.lock().await;

        let items = self.repo.query(ItemFilter::all(), SortOrder::default()).await?;
        let removed = self.repo.delete_all().await?;
        if removed == 0 {
            return Ok(0);
        }
        self.commit();

        let paths: Vec<String> = items.iter().filter_map(|i| i.local_path.clone()).collect();
        self.remove_files(&paths).await;

        info!(removed, "All items deleted");
        self.emit(LibraryEvent::ItemsDeleted {
            item_ids: items.iter().map(|i| i.id.to_string()).collect(),
        });
        Ok(removed)
    }

    /// Mark every queued or running item not in `live` as failed.
    ///
    /// Used at startup, when no transfer from a previous process can still
    /// be reporting.
    #[instrument(skip(self, live))]
    pub async fn mark_orphans_failed(&self, live: &HashSet<ItemId>, message: &str) -> Result<u64> {
        let _guard = self.write_lock.lock().await;

        let mut orphans = Vec::new();
        for status in [DownloadStatus::Queued, DownloadStatus::Running] {
            let items = self
                .repo
                .query(ItemFilter::all().with_status(status), SortOrder::default())
                .await?;
            orphans.extend(items.into_iter().map(|i| i.id).filter(|id| !live.contains(id)));
        }

        let count = self.repo.mark_failed(&orphans, message).await?;
        if count > 0 {
            self.commit();
            warn!(count, "Marked interrupted downloads as failed");
            self.emit(LibraryEvent::OrphansRecovered { count });
        }
        Ok(count)
    }

    // ------------------------------------------------------------------
    // Reads
    // ------------------------------------------------------------------

    pub async fn find_by_id(&self, id: ItemId) -> Result<Option<DownloadItem>> {
        self.repo.find_by_id(id).await
    }

    pub async fn fetch(&self, filter: ItemFilter, sort: SortOrder) -> Result<Vec<DownloadItem>> {
        self.repo.query(filter, sort).await
    }

    pub async fn fetch_all(&self, sort: SortOrder) -> Result<Vec<DownloadItem>> {
        self.repo.query(ItemFilter::all(), sort).await
    }

    pub async fn fetch_by_kind(&self, kind: MediaKind, sort: SortOrder) -> Result<Vec<DownloadItem>> {
        self.repo.query(ItemFilter::kind(kind), sort).await
    }

    pub async fn find_by_status(&self, status: DownloadStatus) -> Result<Vec<DownloadItem>> {
        self.repo
            .query(ItemFilter::all().with_status(status), SortOrder::default())
            .await
    }

    pub async fn count(&self, filter: ItemFilter) -> Result<u64> {
        self.repo.count(filter).await
    }

    /// Observe the items matching `filter` in `sort` order.
    ///
    /// Must be called within a Tokio runtime. The observer stops when the
    /// returned handle is dropped.
    pub fn observe(&self, filter: ItemFilter, sort: SortOrder) -> LiveQuery {
        LiveQuery::spawn(self.repo.clone(), self.revision.subscribe(), filter, sort)
    }

    // ------------------------------------------------------------------
    // Internals
    // ------------------------------------------------------------------

    fn commit(&self) {
        self.revision.send_modify(|revision| *revision += 1);
    }

    fn emit(&self, event: LibraryEvent) {
        if let Some(bus) = &self.event_bus {
            bus.emit(CoreEvent::Library(event)).ok();
        }
    }

    async fn remove_files(&self, paths: &[String]) {
        for path in paths {
            if let Err(e) = self.placement.remove(path).await {
                warn!(
                    file = %core_runtime::logging::strip_path(path),
                    error = %e,
                    "Failed to remove backing file"
                );
            }
        }
    }
}

fn check_transition(existing: &DownloadItem, updated: &DownloadItem) -> Result<()> {
    if updated.id != existing.id {
        return Err(LibraryError::InvalidInput {
            field: "id".to_string(),
            message: "Item id is immutable".to_string(),
        });
    }

    if !existing.status.can_transition_to(updated.status) {
        return Err(LibraryError::InvalidTransition {
            id: existing.id.to_string(),
            from: existing.status,
            to: updated.status,
        });
    }

    if existing.status == DownloadStatus::Running
        && updated.status == DownloadStatus::Running
        && updated.progress < existing.progress
    {
        return Err(LibraryError::InvalidInput {
            field: "progress".to_string(),
            message: format!(
                "Progress cannot regress from {} to {}",
                existing.progress, updated.progress
            ),
        });
    }

    Ok(())
}

impl std::fmt::Debug for ItemStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ItemStore")
            .field("placement", &self.placement)
            .field("revision", &*self.revision.borrow())
            .finish_non_exhaustive()
    }
}
