//! Core service façade and bootstrap helpers.
//!
//! This crate wires host-provided bridge implementations (HTTP, filesystem,
//! lifecycle, playback surfaces) into the offline media core. Desktop apps
//! typically enable the `desktop-shims` feature (which depends on
//! `bridge-desktop`) so that [`CoreConfig`] can fall back to the desktop
//! HTTP client and filesystem.
//!
//! ```rust,ignore
//! use core_service::{CoreConfig, CoreService, EnqueueRequest};
//!
//! let config = CoreConfig::builder()
//!     .media_root("/data/media")
//!     .database_path("/data/media/library.db")
//!     .build()?;
//!
//! let core = CoreService::bootstrap(config).await?;
//! core.downloads()
//!     .enqueue(EnqueueRequest::new("https://example.com/clip.mp4", "Clip"))
//!     .await?;
//! ```

pub mod error;

pub use error::{CoreError, Result};

pub use core_download::{ActiveTransfer, DownloadPipeline, EnqueueRequest};
pub use core_library::{
    ChangeSet, DownloadItem, DownloadStatus, ItemFilter, ItemId, ItemStore, MediaKind, SortOrder,
};
pub use core_playback::{
    LoopMode, PlaybackSession, PlaybackState, PlaylistReconciler, PlaylistSource, SessionConfig,
};
pub use core_runtime::config::{CoreConfig, FeatureFlags};
pub use core_runtime::events::{CoreEvent, EventBus};

#[cfg(feature = "desktop-shims")]
pub use bridge_desktop;

use bridge_traits::background::LifecycleObserver;
use bridge_traits::playback::{AudioSession, MediaEngine, NowPlayingCenter, RemoteCommandCenter};
use core_download::{HttpTransport, PipelineConfig};
use core_library::db::{create_pool, DatabaseConfig};
use core_library::FilePlacement;
use std::sync::Arc;
use tokio::sync::broadcast::Receiver;
use tokio::task::JoinHandle;
use tracing::{info, instrument, warn};

/// Primary façade exposed to host applications.
///
/// Cheap to clone; clones share the store, the pipeline and the event bus.
#[derive(Clone)]
pub struct CoreService {
    inner: Arc<ServiceInner>,
}

struct ServiceInner {
    store: Arc<ItemStore>,
    pipeline: DownloadPipeline,
    events: EventBus,
    lifecycle_observer: Option<Arc<dyn LifecycleObserver>>,
}

/// Host playback surfaces a [`PlaybackSession`] drives.
pub struct PlaybackBridges {
    pub engine: Arc<dyn MediaEngine>,
    pub audio: Arc<dyn AudioSession>,
    pub now_playing: Arc<dyn NowPlayingCenter>,
    pub remote: Arc<dyn RemoteCommandCenter>,
}

/// A playback session following the store.
///
/// Dropping the handle stops the reconciler and the background watchers.
/// The session itself stays usable through any outstanding `Arc`.
pub struct PlaybackHandle {
    session: Arc<PlaybackSession>,
    reconciler: PlaylistReconciler,
    watchers: Vec<JoinHandle<()>>,
}

impl PlaybackHandle {
    pub fn session(&self) -> &Arc<PlaybackSession> {
        &self.session
    }

    pub fn is_attached(&self) -> bool {
        self.reconciler.is_attached()
    }
}

impl Drop for PlaybackHandle {
    fn drop(&mut self) {
        for watcher in &self.watchers {
            watcher.abort();
        }
    }
}

impl CoreService {
    /// Open the store and start the download pipeline described by `config`.
    ///
    /// With the corresponding feature flags set, items left Queued or
    /// Running by a previous process are marked Failed and stale transfer
    /// files are removed before the service is returned.
    ///
    /// # Errors
    /// Returns error if:
    /// - The configuration is invalid or a bridge is missing
    /// - The database cannot be opened or migrated
    /// - Startup recovery fails
    #[instrument(skip_all, fields(media_root = %config.media_root.display()))]
    pub async fn bootstrap(config: CoreConfig) -> Result<Self> {
        config.validate()?;

        let http_client = config.http_client.clone().ok_or_else(|| missing("HttpClient"))?;
        let fs = config.file_system.clone().ok_or_else(|| missing("FileSystemAccess"))?;

        let pool = create_pool(DatabaseConfig::new(&config.database_path)).await?;
        let events = EventBus::new(config.event_buffer_size);

        let placement = FilePlacement::new(config.media_root.clone(), fs.clone());
        let store = Arc::new(ItemStore::new(pool, placement).with_event_bus(events.clone()));

        let transport = HttpTransport::new(http_client, fs.clone(), config.max_concurrent_transfers);
        let pipeline = DownloadPipeline::new(
            store.clone(),
            Arc::new(transport),
            fs,
            PipelineConfig::new(config.temp_dir.clone()),
        )
        .with_event_bus(events.clone());

        if config.features.recover_orphans_on_start {
            let recovered = pipeline.recover_orphans().await?;
            if recovered > 0 {
                warn!(count = recovered, "Marked interrupted downloads as failed");
            }
        }
        if config.features.sweep_temp_on_start {
            pipeline.sweep_temp_dir().await?;
        }

        info!(
            max_concurrent_transfers = config.max_concurrent_transfers,
            "Core service started"
        );

        Ok(Self {
            inner: Arc::new(ServiceInner {
                store,
                pipeline,
                events,
                lifecycle_observer: config.lifecycle_observer,
            }),
        })
    }

    pub fn store(&self) -> &Arc<ItemStore> {
        &self.inner.store
    }

    pub fn downloads(&self) -> &DownloadPipeline {
        &self.inner.pipeline
    }

    pub fn events(&self) -> &EventBus {
        &self.inner.events
    }

    pub fn subscribe(&self) -> Receiver<CoreEvent> {
        self.inner.events.subscribe()
    }

    /// Build a playback session over `bridges` and keep its playlist in
    /// step with the completed items `source` selects.
    ///
    /// The session follows audio-session interruptions and, when the
    /// configuration carries a lifecycle observer, foreground/background
    /// changes.
    ///
    /// Must be called within a Tokio runtime.
    pub async fn attach_playback(
        &self,
        bridges: PlaybackBridges,
        session_config: SessionConfig,
        source: PlaylistSource,
    ) -> Result<PlaybackHandle> {
        let session = Arc::new(
            PlaybackSession::new(
                bridges.engine,
                bridges.audio,
                bridges.now_playing,
                bridges.remote,
                session_config,
            )
            .with_event_bus(self.inner.events.clone()),
        );

        let mut watchers = vec![session.watch_audio_events().await?];
        if let Some(observer) = &self.inner.lifecycle_observer {
            watchers.push(session.watch_lifecycle(observer.clone()).await?);
        }

        let reconciler = PlaylistReconciler::attach(&self.inner.store, session.clone(), source);

        Ok(PlaybackHandle {
            session,
            reconciler,
            watchers,
        })
    }
}

fn missing(capability: &str) -> CoreError {
    CoreError::CapabilityMissing {
        capability: capability.to_string(),
        message: "No implementation was configured and no platform default is available"
            .to_string(),
    }
}
