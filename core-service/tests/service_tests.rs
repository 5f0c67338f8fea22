use async_trait::async_trait;
use bridge_desktop::TokioFileSystem;
use bridge_traits::error::Result as BridgeResult;
use bridge_traits::http::{DownloadResponse, HttpClient, HttpRequest};
use bridge_traits::playback::{
    AudioSession, AudioSessionEvent, AudioSessionEventStream, MediaEngine, MediaSource,
    NowPlayingCenter, NowPlayingInfo, RemoteCommandCenter, RemoteCommandKind,
};
use core_download::INTERRUPTED_MESSAGE;
use core_runtime::events::{DownloadEvent, PlaybackEvent};
use core_service::{
    CoreConfig, CoreEvent, CoreService, DownloadItem, DownloadStatus, EnqueueRequest, MediaKind,
    PlaybackBridges, PlaylistSource, SessionConfig,
};
use parking_lot::Mutex;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tokio::sync::broadcast::Receiver;

/// Serves the same body for every request.
struct StaticHttpClient {
    body: Vec<u8>,
    requests: AtomicUsize,
}

impl StaticHttpClient {
    fn new(body: &[u8]) -> Self {
        Self {
            body: body.to_vec(),
            requests: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl HttpClient for StaticHttpClient {
    async fn download(&self, _request: HttpRequest) -> BridgeResult<DownloadResponse> {
        self.requests.fetch_add(1, Ordering::SeqCst);
        Ok(DownloadResponse {
            status: 200,
            content_length: Some(self.body.len() as u64),
            suggested_filename: None,
            mime_type: None,
            body: Box::new(std::io::Cursor::new(self.body.clone())),
        })
    }
}

struct Env {
    dir: TempDir,
    http: Arc<StaticHttpClient>,
}

impl Env {
    fn new() -> Self {
        Self {
            dir: tempfile::tempdir().unwrap(),
            http: Arc::new(StaticHttpClient::new(b"media bytes")),
        }
    }

    fn media_root(&self) -> PathBuf {
        self.dir.path().join("media")
    }

    fn config(&self) -> core_service::CoreConfig {
        self.builder().build().unwrap()
    }

    fn builder(&self) -> core_runtime::config::CoreConfigBuilder {
        let fs = TokioFileSystem::with_directories(
            self.dir.path().join("cache"),
            self.dir.path().join("data"),
        );
        CoreConfig::builder()
            .media_root(self.media_root())
            .database_path(self.dir.path().join("library.db"))
            .http_client(self.http.clone())
            .file_system(Arc::new(fs))
    }
}

async fn next_completion(events: &mut Receiver<CoreEvent>) -> (String, u64) {
    tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            match events.recv().await.unwrap() {
                CoreEvent::Download(DownloadEvent::Completed {
                    local_path,
                    file_size,
                    ..
                }) => return (local_path, file_size),
                CoreEvent::Download(DownloadEvent::Failed { message, .. }) => {
                    panic!("download failed: {}", message)
                }
                _ => {}
            }
        }
    })
    .await
    .expect("download did not complete in time")
}

async fn eventually(mut condition: impl FnMut() -> bool) {
    tokio::time::timeout(Duration::from_secs(5), async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("condition not reached in time");
}

#[tokio::test]
async fn test_bootstrap_downloads_into_kind_directory() {
    let env = Env::new();
    let core = CoreService::bootstrap(env.config()).await.unwrap();
    let mut events = core.subscribe();

    let id = core
        .downloads()
        .enqueue(EnqueueRequest::new("https://example.com/media/clip.mp4", "Clip"))
        .await
        .unwrap();

    let (local_path, file_size) = next_completion(&mut events).await;
    assert_eq!(local_path, "videos/Clip.mp4");
    assert_eq!(file_size, 11);

    let item = core.store().find_by_id(id).await.unwrap().unwrap();
    assert_eq!(item.status, DownloadStatus::Completed);
    assert_eq!(
        std::fs::read(env.media_root().join("videos/Clip.mp4")).unwrap(),
        b"media bytes"
    );
    assert_eq!(env.http.requests.load(Ordering::SeqCst), 1);
    assert!(core.downloads().active_transfers().is_empty());
}

#[tokio::test]
async fn test_restart_fails_interrupted_items_and_sweeps_temp_files() {
    let env = Env::new();
    let config = env.config();
    let temp_dir = config.temp_dir.clone();

    let first = CoreService::bootstrap(config).await.unwrap();
    let orphan = first
        .store()
        .create_or_update(DownloadItem::new(
            "Half",
            "https://example.com/half.m4a",
            MediaKind::Audio,
            1,
        ))
        .await
        .unwrap();
    std::fs::create_dir_all(&temp_dir).unwrap();
    let stale = temp_dir.join(format!("{}.part", orphan.id));
    std::fs::write(&stale, b"partial").unwrap();
    drop(first);

    let second = CoreService::bootstrap(env.config()).await.unwrap();
    let item = second.store().find_by_id(orphan.id).await.unwrap().unwrap();

    assert_eq!(item.status, DownloadStatus::Failed);
    assert_eq!(item.error_message.as_deref(), Some(INTERRUPTED_MESSAGE));
    assert!(!stale.exists());
}

#[tokio::test]
async fn test_recovery_can_be_disabled() {
    let env = Env::new();
    let first = CoreService::bootstrap(env.config()).await.unwrap();
    let orphan = first
        .store()
        .create_or_update(DownloadItem::new(
            "Half",
            "https://example.com/half.m4a",
            MediaKind::Audio,
            1,
        ))
        .await
        .unwrap();
    drop(first);

    let config = env
        .builder()
        .recover_orphans_on_start(false)
        .sweep_temp_on_start(false)
        .build()
        .unwrap();
    let second = CoreService::bootstrap(config).await.unwrap();
    let item = second.store().find_by_id(orphan.id).await.unwrap().unwrap();

    assert_eq!(item.status, DownloadStatus::Queued);
}

#[tokio::test]
async fn test_relative_media_root_is_rejected() {
    let env = Env::new();
    let result = env.builder().media_root("relative/media").build();
    assert!(result.is_err());
}

#[derive(Default)]
struct SimpleEngine {
    source: Mutex<Option<MediaSource>>,
    rate: Mutex<f32>,
}

#[async_trait]
impl MediaEngine for SimpleEngine {
    fn replace_source(&self, source: Option<MediaSource>) {
        *self.source.lock() = source;
        *self.rate.lock() = 0.0;
    }

    fn current_source(&self) -> Option<String> {
        self.source.lock().as_ref().map(|s| s.url.clone())
    }

    fn play(&self) {
        *self.rate.lock() = 1.0;
    }

    fn pause(&self) {
        *self.rate.lock() = 0.0;
    }

    fn rate(&self) -> f32 {
        *self.rate.lock()
    }

    fn error(&self) -> Option<String> {
        None
    }

    fn position(&self) -> Duration {
        Duration::ZERO
    }

    fn duration(&self) -> Option<Duration> {
        None
    }

    async fn seek(&self, _position: Duration) -> bool {
        true
    }

    fn set_surface_attached(&self, _attached: bool) {}
}

struct QuietEvents;

#[async_trait]
impl AudioSessionEventStream for QuietEvents {
    async fn next(&mut self) -> Option<AudioSessionEvent> {
        std::future::pending().await
    }
}

struct QuietAudio;

#[async_trait]
impl AudioSession for QuietAudio {
    fn activate(&self) -> BridgeResult<()> {
        Ok(())
    }

    fn deactivate(&self) -> BridgeResult<()> {
        Ok(())
    }

    async fn subscribe_events(&self) -> BridgeResult<Box<dyn AudioSessionEventStream>> {
        Ok(Box::new(QuietEvents))
    }
}

struct QuietSurface;

impl NowPlayingCenter for QuietSurface {
    fn publish(&self, _info: NowPlayingInfo) {}
    fn clear(&self) {}
}

impl RemoteCommandCenter for QuietSurface {
    fn enable(&self, _commands: &[RemoteCommandKind], _skip_interval: Duration) -> BridgeResult<()> {
        Ok(())
    }

    fn disable_all(&self) {}
}

#[tokio::test]
async fn test_attached_playback_follows_completed_downloads() {
    let env = Env::new();
    let core = CoreService::bootstrap(env.config()).await.unwrap();
    let engine = Arc::new(SimpleEngine::default());
    let bridges = PlaybackBridges {
        engine: engine.clone(),
        audio: Arc::new(QuietAudio),
        now_playing: Arc::new(QuietSurface),
        remote: Arc::new(QuietSurface),
    };
    let playback = core
        .attach_playback(bridges, SessionConfig::default(), PlaylistSource::kind(MediaKind::Audio))
        .await
        .unwrap();
    assert!(playback.is_attached());

    let mut events = core.subscribe();
    core.downloads()
        .enqueue(EnqueueRequest::new("https://example.com/song.m4a", "Song"))
        .await
        .unwrap();
    next_completion(&mut events).await;

    let session = playback.session().clone();
    eventually(|| session.playlist().len() == 1).await;
    assert_eq!(session.playlist()[0].title, "Song");

    session.play_entry(0).unwrap();
    let expected = url::Url::from_file_path(env.media_root().join("audios/Song.m4a"))
        .unwrap()
        .to_string();
    assert_eq!(engine.current_source(), Some(expected.clone()));
    assert!(session.is_playing());

    let started = tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            if let CoreEvent::Playback(PlaybackEvent::Started { url, .. }) =
                events.recv().await.unwrap()
            {
                return url;
            }
        }
    })
    .await
    .unwrap();
    assert_eq!(started, expected);
}
