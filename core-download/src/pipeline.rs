//! # Download Pipeline
//!
//! Turns producer requests into persisted, progress-tracked transfers.
//!
//! ## State machine
//!
//! ```text
//! enqueue ──> Queued ──on_started──> Running ──on_complete──> Completed
//!               │                      ├──────on_failure──> Failed
//!               └───────cancel─────────┴──────cancel──────> Canceled
//! ```
//!
//! Each transfer owns one registry entry mapping its [`TransferId`] to the
//! item it feeds. Entries are removed on completion, failure or cancel, so
//! late callbacks find nothing and become no-ops. All writes go through
//! [`ItemStore::update`], which serializes concurrent transfers.
//!
//! ## Progress
//!
//! Progress is quantized to whole percent. Callbacks that do not reach a new
//! bucket are dropped before touching the store. While running, progress is
//! capped at 99% so that 100% always coincides with `Completed`.

use crate::error::{DownloadError, Result, TransferError};
use crate::naming;
use crate::transport::{CompletedTransfer, TransferDelegate, TransferId, TransferRequest, Transport};
use async_trait::async_trait;
use bridge_traits::storage::FileSystemAccess;
use bridge_traits::time::{Clock, SystemClock};
use core_library::{DownloadItem, DownloadStatus, ItemId, ItemStore, MediaKind};
use core_runtime::events::{CoreEvent, DownloadEvent, EventBus};
use core_runtime::logging::redact_url;
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

/// Message recorded on items whose transfer did not survive a restart.
pub const INTERRUPTED_MESSAGE: &str = "Download interrupted before it finished";

const TEMP_EXTENSION: &str = "part";

/// Pipeline settings.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Directory holding in-flight transfer bodies
    pub temp_dir: PathBuf,
}

impl PipelineConfig {
    pub fn new(temp_dir: impl Into<PathBuf>) -> Self {
        Self {
            temp_dir: temp_dir.into(),
        }
    }
}

/// Producer input for [`DownloadPipeline::enqueue`]. Treated as untrusted.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EnqueueRequest {
    pub url: String,
    pub title: String,
    pub thumb_url: Option<String>,
    pub duration: Option<Duration>,
    /// Overrides the kind inferred from the URL.
    pub kind: Option<MediaKind>,
}

impl EnqueueRequest {
    pub fn new(url: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            title: title.into(),
            ..Default::default()
        }
    }

    pub fn thumb_url(mut self, thumb_url: impl Into<String>) -> Self {
        self.thumb_url = Some(thumb_url.into());
        self
    }

    pub fn duration_seconds(mut self, seconds: f64) -> Self {
        if seconds.is_finite() && seconds >= 0.0 {
            self.duration = Some(Duration::from_secs_f64(seconds));
        }
        self
    }

    pub fn kind(mut self, kind: MediaKind) -> Self {
        self.kind = Some(kind);
        self
    }
}

/// Snapshot of one live transfer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActiveTransfer {
    pub transfer_id: TransferId,
    pub item_id: ItemId,
    /// Last percent bucket written, if any
    pub percent: Option<u8>,
}

type DrainHandler = Box<dyn FnOnce() + Send>;

struct TransferHandle {
    item_id: ItemId,
    temp_path: PathBuf,
    cancel: CancellationToken,
    last_percent: Option<u8>,
}

#[derive(Default)]
struct Registry {
    transfers: HashMap<TransferId, TransferHandle>,
    drain_handler: Option<DrainHandler>,
}

/// Background-capable transfer manager.
///
/// Cloning is cheap; clones share the same registry.
#[derive(Clone)]
pub struct DownloadPipeline {
    inner: Arc<PipelineInner>,
}

struct PipelineInner {
    store: Arc<ItemStore>,
    transport: Arc<dyn Transport>,
    fs: Arc<dyn FileSystemAccess>,
    clock: Arc<dyn Clock>,
    config: PipelineConfig,
    registry: Mutex<Registry>,
    next_transfer_id: AtomicU64,
    event_bus: Option<EventBus>,
}

impl DownloadPipeline {
    pub fn new(
        store: Arc<ItemStore>,
        transport: Arc<dyn Transport>,
        fs: Arc<dyn FileSystemAccess>,
        config: PipelineConfig,
    ) -> Self {
        Self::build(PipelineParts {
            store,
            transport,
            fs,
            clock: Arc::new(SystemClock),
            config,
            event_bus: None,
        })
    }

    /// Use `clock` for item creation times.
    pub fn with_clock(self, clock: Arc<dyn Clock>) -> Self {
        Self::build(PipelineParts {
            clock,
            ..self.into_parts()
        })
    }

    /// Publish [`DownloadEvent`]s on `event_bus`.
    pub fn with_event_bus(self, event_bus: EventBus) -> Self {
        Self::build(PipelineParts {
            event_bus: Some(event_bus),
            ..self.into_parts()
        })
    }

    fn build(parts: PipelineParts) -> Self {
        Self {
            inner: Arc::new(PipelineInner {
                store: parts.store,
                transport: parts.transport,
                fs: parts.fs,
                clock: parts.clock,
                config: parts.config,
                registry: Mutex::new(Registry::default()),
                next_transfer_id: AtomicU64::new(1),
                event_bus: parts.event_bus,
            }),
        }
    }

    fn into_parts(self) -> PipelineParts {
        let inner = &self.inner;
        PipelineParts {
            store: inner.store.clone(),
            transport: inner.transport.clone(),
            fs: inner.fs.clone(),
            clock: inner.clock.clone(),
            config: inner.config.clone(),
            event_bus: inner.event_bus.clone(),
        }
    }

    pub fn store(&self) -> &Arc<ItemStore> {
        &self.inner.store
    }

    /// Record a new item and start its transfer.
    ///
    /// Identical requests are never deduplicated; each call yields its own
    /// item and transfer.
    ///
    /// # Errors
    /// Returns error if:
    /// - The URL is not an absolute `http`/`https` URL
    /// - The item cannot be persisted
    #[instrument(skip(self, request), fields(url = %redact_url(&request.url)))]
    pub async fn enqueue(&self, request: EnqueueRequest) -> Result<ItemId> {
        let url = validate_url(&request.url)?;
        let kind = request
            .kind
            .or_else(|| naming::infer_kind(&url))
            .unwrap_or(MediaKind::Video);
        let title = match request.title.trim() {
            "" => naming::title_from_url(&url).unwrap_or_else(|| "Download".to_string()),
            trimmed => trimmed.to_string(),
        };

        let item = DownloadItem::new(title, url.clone(), kind, self.inner.clock.unix_timestamp_millis())
            .with_thumb_url(request.thumb_url.filter(|t| !t.trim().is_empty()))
            .with_duration(request.duration);
        let item = self.inner.store.create_or_update(item).await?;

        let transfer_id = TransferId(self.inner.next_transfer_id.fetch_add(1, Ordering::Relaxed));
        let temp_path = self
            .inner
            .config
            .temp_dir
            .join(format!("{}.{}", item.id, TEMP_EXTENSION));
        let cancel = CancellationToken::new();

        self.inner.registry.lock().transfers.insert(
            transfer_id,
            TransferHandle {
                item_id: item.id,
                temp_path: temp_path.clone(),
                cancel: cancel.clone(),
                last_percent: None,
            },
        );

        info!(item_id = %item.id, transfer_id = %transfer_id, kind = %kind, "Download enqueued");
        self.inner.emit(DownloadEvent::Queued {
            item_id: item.id.to_string(),
            title: item.title.clone(),
        });

        if let Err(e) = self.inner.fs.create_dir_all(&self.inner.config.temp_dir).await {
            self.inner
                .on_failure(transfer_id, TransferError::Storage(e.to_string()))
                .await;
            return Ok(item.id);
        }

        let delegate: Arc<dyn TransferDelegate> = self.inner.clone();
        self.inner.transport.start(
            TransferRequest {
                id: transfer_id,
                url,
                temp_path,
                cancel,
            },
            delegate,
        );

        Ok(item.id)
    }

    /// Cancel the item's transfer, delete its partial file and mark it
    /// `Canceled`.
    ///
    /// # Returns
    /// `true` if the item was in flight and is now canceled
    #[instrument(skip(self), fields(item_id = %item_id))]
    pub async fn cancel(&self, item_id: ItemId) -> Result<bool> {
        let handle = {
            let mut registry = self.inner.registry.lock();
            let transfer_id = registry
                .transfers
                .iter()
                .find(|(_, handle)| handle.item_id == item_id)
                .map(|(id, _)| *id);
            transfer_id.and_then(|id| registry.transfers.remove(&id))
        };

        let temp_path = match &handle {
            Some(handle) => {
                handle.cancel.cancel();
                handle.temp_path.clone()
            }
            None => self.inner.temp_path_for(item_id),
        };
        self.inner.discard(&temp_path).await;

        let mut canceled = false;
        self.inner
            .store
            .update(item_id, |item| {
                if item.status.is_in_flight() {
                    item.status = DownloadStatus::Canceled;
                    item.error_message = None;
                    canceled = true;
                }
            })
            .await?;

        if canceled {
            info!("Download canceled");
            self.inner.emit(DownloadEvent::Canceled {
                item_id: item_id.to_string(),
            });
        }
        if handle.is_some() {
            self.inner.check_drained();
        }
        Ok(canceled)
    }

    /// Snapshot of live transfers.
    pub fn active_transfers(&self) -> Vec<ActiveTransfer> {
        let registry = self.inner.registry.lock();
        let mut transfers: Vec<_> = registry
            .transfers
            .iter()
            .map(|(id, handle)| ActiveTransfer {
                transfer_id: *id,
                item_id: handle.item_id,
                percent: handle.last_percent,
            })
            .collect();
        transfers.sort_by_key(|t| t.transfer_id);
        transfers
    }

    /// Store the host's background completion handler.
    ///
    /// The handler runs exactly once, as soon as no transfer is live
    /// (immediately if none is). A handler stored later replaces one that
    /// has not fired yet.
    pub fn handle_background_events<F>(&self, handler: F)
    where
        F: FnOnce() + Send + 'static,
    {
        let replaced = {
            let mut registry = self.inner.registry.lock();
            registry.drain_handler.replace(Box::new(handler)).is_some()
        };
        if replaced {
            warn!("Replaced a background completion handler that had not fired");
        }
        self.inner.check_drained();
    }

    /// Mark items left queued or running by a previous process as failed.
    ///
    /// Live transfers of this process are left alone.
    #[instrument(skip(self))]
    pub async fn recover_orphans(&self) -> Result<u64> {
        let live = self.inner.live_items();
        let recovered = self
            .inner
            .store
            .mark_orphans_failed(&live, INTERRUPTED_MESSAGE)
            .await?;

        if recovered > 0 {
            info!(recovered, "Recovered interrupted downloads");
        }
        Ok(recovered)
    }

    /// Delete temp files that belong to no live transfer.
    ///
    /// # Returns
    /// Number of files removed
    #[instrument(skip(self))]
    pub async fn sweep_temp_dir(&self) -> Result<u64> {
        let temp_dir = &self.inner.config.temp_dir;
        if !self.inner.fs.exists(temp_dir).await? {
            return Ok(0);
        }

        let live_names: HashSet<String> = self
            .inner
            .live_items()
            .iter()
            .map(|id| format!("{}.{}", id, TEMP_EXTENSION))
            .collect();

        let mut removed = 0;
        for path in self.inner.fs.list_directory(temp_dir).await? {
            let is_partial = path.extension().is_some_and(|ext| ext == TEMP_EXTENSION);
            let is_live = path
                .file_name()
                .is_some_and(|name| live_names.contains(name.to_string_lossy().as_ref()));
            if is_partial && !is_live {
                self.inner.discard(&path).await;
                removed += 1;
            }
        }

        if removed > 0 {
            debug!(removed, "Removed stale transfer files");
        }
        Ok(removed)
    }
}

struct PipelineParts {
    store: Arc<ItemStore>,
    transport: Arc<dyn Transport>,
    fs: Arc<dyn FileSystemAccess>,
    clock: Arc<dyn Clock>,
    config: PipelineConfig,
    event_bus: Option<EventBus>,
}

impl std::fmt::Debug for DownloadPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DownloadPipeline")
            .field("config", &self.inner.config)
            .field("active_transfers", &self.inner.registry.lock().transfers.len())
            .finish_non_exhaustive()
    }
}

fn validate_url(raw: &str) -> Result<String> {
    let invalid = |message: &str| DownloadError::InvalidRequest {
        field: "url".to_string(),
        message: message.to_string(),
    };

    let parsed = url::Url::parse(raw.trim()).map_err(|e| invalid(&e.to_string()))?;
    match parsed.scheme() {
        "http" | "https" => {}
        other => return Err(invalid(&format!("Unsupported scheme '{}'", other))),
    }
    if parsed.host_str().is_none_or(str::is_empty) {
        return Err(invalid("URL has no host"));
    }
    Ok(parsed.to_string())
}

/// Whole-percent bucket for `written / expected`, capped at 99.
fn progress_bucket(written: u64, expected: u64) -> u8 {
    let percent = (written.min(expected) as u128 * 100 / expected as u128) as u8;
    percent.min(99)
}

impl PipelineInner {
    fn item_for(&self, transfer_id: TransferId) -> Option<ItemId> {
        self.registry
            .lock()
            .transfers
            .get(&transfer_id)
            .map(|handle| handle.item_id)
    }

    fn live_items(&self) -> HashSet<ItemId> {
        self.registry
            .lock()
            .transfers
            .values()
            .map(|handle| handle.item_id)
            .collect()
    }

    fn temp_path_for(&self, item_id: ItemId) -> PathBuf {
        self.config
            .temp_dir
            .join(format!("{}.{}", item_id, TEMP_EXTENSION))
    }

    fn emit(&self, event: DownloadEvent) {
        if let Some(bus) = &self.event_bus {
            bus.emit(CoreEvent::Download(event)).ok();
        }
    }

    /// Fire the background handler if nothing is live.
    fn check_drained(&self) {
        let handler = {
            let mut registry = self.registry.lock();
            if registry.transfers.is_empty() {
                registry.drain_handler.take()
            } else {
                None
            }
        };

        if let Some(handler) = handler {
            info!("All transfers finished; running background completion handler");
            handler();
            self.emit(DownloadEvent::BackgroundDrained);
        }
    }

    async fn discard(&self, path: &Path) {
        if let Err(e) = self.fs.delete_file(path).await {
            if !e.is_not_found() {
                warn!(error = %e, "Failed to remove transfer file");
            }
        }
    }

    /// Mark the item failed unless it already reached a terminal status.
    async fn record_failure(&self, item_id: ItemId, message: String) {
        let result = self
            .store
            .update(item_id, |item| {
                if !item.status.is_terminal() {
                    item.status = DownloadStatus::Failed;
                    item.error_message = Some(message.clone());
                    item.local_path = None;
                }
            })
            .await;

        match result {
            Ok(Some(item)) if item.status == DownloadStatus::Failed => {
                self.emit(DownloadEvent::Failed {
                    item_id: item_id.to_string(),
                    message,
                });
            }
            Ok(_) => {}
            Err(e) => error!(item_id = %item_id, error = %e, "Failed to record download failure"),
        }
    }

    async fn place(&self, item: &DownloadItem, completed: &CompletedTransfer) -> Result<DownloadItem> {
        let placement = self.store.placement();
        let name = naming::derive_file_name(
            &item.title,
            completed.suggested_filename.as_deref(),
            completed.mime_type.as_deref(),
            &item.source_url,
            item.media_kind,
        );

        let destination = placement
            .claim(item.media_kind, &name.base, &name.extension)
            .await?;

        let placed = self.finish_placement(item.id, &completed.temp_location, &destination, &name.extension);
        match placed.await {
            Ok(Some(item)) => Ok(item),
            Ok(None) => {
                // Deleted while the file was being placed.
                self.discard(&destination).await;
                Err(DownloadError::InvalidRequest {
                    field: "item_id".to_string(),
                    message: format!("Item {} was deleted during placement", item.id),
                })
            }
            Err(e) => {
                self.discard(&destination).await;
                Err(e)
            }
        }
    }

    async fn finish_placement(
        &self,
        item_id: ItemId,
        temp: &Path,
        destination: &Path,
        extension: &str,
    ) -> Result<Option<DownloadItem>> {
        let placement = self.store.placement();
        self.fs.move_file(temp, destination).await?;
        let file_size = placement.file_size(destination).await?;
        let relative = placement.relative_path(destination)?;
        let format = (!extension.is_empty()).then(|| extension.to_string());

        let updated = self
            .store
            .update(item_id, move |item| {
                item.status = DownloadStatus::Completed;
                item.progress = 1.0;
                item.local_path = Some(relative);
                item.file_size = file_size;
                item.error_message = None;
                item.format = format;
            })
            .await?;
        Ok(updated)
    }
}

#[async_trait]
impl TransferDelegate for PipelineInner {
    async fn on_started(&self, id: TransferId) {
        let Some(item_id) = self.item_for(id) else {
            debug!(transfer_id = %id, "Start for unknown transfer ignored");
            return;
        };

        let result = self
            .store
            .update(item_id, |item| {
                if item.status == DownloadStatus::Queued {
                    item.status = DownloadStatus::Running;
                }
            })
            .await;

        match result {
            Ok(Some(_)) => {
                debug!(transfer_id = %id, item_id = %item_id, "Transfer started");
                self.emit(DownloadEvent::Started {
                    item_id: item_id.to_string(),
                });
            }
            Ok(None) => debug!(transfer_id = %id, "Item deleted before start"),
            Err(e) => warn!(transfer_id = %id, error = %e, "Failed to mark transfer running"),
        }
    }

    async fn on_progress(&self, id: TransferId, written: u64, expected: Option<u64>) {
        let bucket = expected.filter(|e| *e > 0).map(|e| progress_bucket(written, e));

        // Claim the bucket under the registry lock; stale or repeated
        // buckets never reach the store.
        let item_id = {
            let mut registry = self.registry.lock();
            let Some(handle) = registry.transfers.get_mut(&id) else {
                return;
            };
            match (bucket, handle.last_percent) {
                (Some(new), Some(last)) if new <= last => return,
                (None, Some(_)) => return,
                (Some(new), _) => handle.last_percent = Some(new),
                (None, None) => handle.last_percent = Some(0),
            }
            handle.item_id
        };

        let fraction = bucket.map(|b| f64::from(b) / 100.0).unwrap_or(0.0);
        let result = self
            .store
            .update(item_id, |item| {
                if item.status.is_in_flight() {
                    item.status = DownloadStatus::Running;
                    item.progress = item.progress.max(fraction.clamp(0.0, 1.0));
                }
            })
            .await;

        match result {
            Ok(Some(item)) if item.status == DownloadStatus::Running => {
                if let Some(percent) = bucket {
                    self.emit(DownloadEvent::Progress {
                        item_id: item_id.to_string(),
                        percent,
                    });
                }
            }
            Ok(_) => {}
            Err(e) => warn!(transfer_id = %id, error = %e, "Failed to store progress"),
        }
    }

    #[instrument(skip(self, completed), fields(transfer_id = %id))]
    async fn on_complete(&self, id: TransferId, completed: CompletedTransfer) {
        let handle = self.registry.lock().transfers.remove(&id);
        let Some(handle) = handle else {
            debug!("Completion for unknown transfer ignored");
            self.discard(&completed.temp_location).await;
            return;
        };
        let item_id = handle.item_id;

        let item = match self.store.find_by_id(item_id).await {
            Ok(Some(item)) if !item.status.is_terminal() => item,
            Ok(_) => {
                debug!(item_id = %item_id, "Item gone or finished; dropping body");
                self.discard(&completed.temp_location).await;
                self.check_drained();
                return;
            }
            Err(e) => {
                error!(item_id = %item_id, error = %e, "Failed to load item for completion");
                self.discard(&completed.temp_location).await;
                self.record_failure(item_id, e.to_string()).await;
                self.check_drained();
                return;
            }
        };

        match self.place(&item, &completed).await {
            Ok(placed) => {
                let local_path = placed.local_path.clone().unwrap_or_default();
                info!(
                    item_id = %item_id,
                    file = %core_runtime::logging::strip_path(&local_path),
                    size = placed.file_size,
                    "Download completed"
                );
                self.emit(DownloadEvent::Completed {
                    item_id: item_id.to_string(),
                    local_path,
                    file_size: placed.file_size,
                });
            }
            Err(e) => {
                warn!(item_id = %item_id, error = %e, "Placing downloaded file failed");
                self.discard(&completed.temp_location).await;
                self.record_failure(item_id, e.to_string()).await;
            }
        }
        self.check_drained();
    }

    #[instrument(skip(self), fields(transfer_id = %id))]
    async fn on_failure(&self, id: TransferId, error: TransferError) {
        let handle = self.registry.lock().transfers.remove(&id);
        let Some(handle) = handle else {
            debug!(error = %error, "Failure for unknown transfer ignored");
            return;
        };

        self.discard(&handle.temp_path).await;
        warn!(item_id = %handle.item_id, error = %error, "Download failed");
        self.record_failure(handle.item_id, error.to_string()).await;
        self.check_drained();
    }
}
