#![allow(dead_code)]

use async_trait::async_trait;
use bridge_traits::error::Result as BridgeResult;
use bridge_traits::playback::{
    AudioSession, AudioSessionEvent, AudioSessionEventStream, MediaEngine, MediaSource,
    NowPlayingCenter, NowPlayingInfo, RemoteCommandCenter, RemoteCommandKind,
};
use core_library::{ItemId, MediaKind};
use core_playback::{PlaybackSession, PlaylistEntry, SessionConfig};
use core_runtime::events::EventBus;
use mockall::mock;
use parking_lot::Mutex;
use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

mock! {
    pub NowPlaying {}
    impl NowPlayingCenter for NowPlaying {
        fn publish(&self, info: NowPlayingInfo);
        fn clear(&self);
    }
}

mock! {
    pub Remote {}
    impl RemoteCommandCenter for Remote {
        fn enable(&self, commands: &[RemoteCommandKind], skip_interval: Duration) -> BridgeResult<()>;
        fn disable_all(&self);
    }
}

/// Engine state as a host player would report it.
#[derive(Debug, Default)]
pub struct EngineState {
    pub source: Option<MediaSource>,
    pub rate: f32,
    pub position: Duration,
    pub duration: Option<Duration>,
    pub error: Option<String>,
    pub surface_attached: bool,
    pub replacements: usize,
    /// Target and rate at the moment each seek began
    pub seeks: Vec<(Duration, f32)>,
}

/// In-memory engine. Sources listed in `unplayable` load with an error.
#[derive(Default)]
pub struct FakeEngine {
    pub state: Mutex<EngineState>,
    pub unplayable: Mutex<HashSet<String>>,
    pub default_duration: Mutex<Option<Duration>>,
}

impl FakeEngine {
    pub fn with_duration(duration: Option<Duration>) -> Self {
        let engine = Self::default();
        *engine.default_duration.lock() = duration;
        engine
    }

    pub fn replacements(&self) -> usize {
        self.state.lock().replacements
    }

    pub fn set_position(&self, position: Duration) {
        self.state.lock().position = position;
    }
}

#[async_trait]
impl MediaEngine for FakeEngine {
    fn replace_source(&self, source: Option<MediaSource>) {
        let error = source
            .as_ref()
            .filter(|s| self.unplayable.lock().contains(&s.url))
            .map(|_| "unsupported media".to_string());
        let duration = source.as_ref().and(*self.default_duration.lock());

        let mut state = self.state.lock();
        state.source = source;
        state.rate = 0.0;
        state.position = Duration::ZERO;
        state.error = error;
        state.duration = duration;
        state.replacements += 1;
    }

    fn current_source(&self) -> Option<String> {
        self.state.lock().source.as_ref().map(|s| s.url.clone())
    }

    fn play(&self) {
        let mut state = self.state.lock();
        if state.source.is_some() {
            state.rate = 1.0;
        }
    }

    fn pause(&self) {
        self.state.lock().rate = 0.0;
    }

    fn rate(&self) -> f32 {
        self.state.lock().rate
    }

    fn error(&self) -> Option<String> {
        self.state.lock().error.clone()
    }

    fn position(&self) -> Duration {
        self.state.lock().position
    }

    fn duration(&self) -> Option<Duration> {
        self.state.lock().duration
    }

    async fn seek(&self, position: Duration) -> bool {
        {
            let mut state = self.state.lock();
            let rate = state.rate;
            state.seeks.push((position, rate));
        }
        tokio::task::yield_now().await;
        self.state.lock().position = position;
        true
    }

    fn set_surface_attached(&self, attached: bool) {
        self.state.lock().surface_attached = attached;
    }
}

struct ChannelEvents(mpsc::UnboundedReceiver<AudioSessionEvent>);

#[async_trait]
impl AudioSessionEventStream for ChannelEvents {
    async fn next(&mut self) -> Option<AudioSessionEvent> {
        self.0.recv().await
    }
}

/// Audio session that counts activations and forwards injected events.
pub struct FakeAudioSession {
    pub activations: AtomicUsize,
    pub deactivations: AtomicUsize,
    pub sender: mpsc::UnboundedSender<AudioSessionEvent>,
    receiver: Mutex<Option<mpsc::UnboundedReceiver<AudioSessionEvent>>>,
}

impl Default for FakeAudioSession {
    fn default() -> Self {
        let (sender, receiver) = mpsc::unbounded_channel();
        Self {
            activations: AtomicUsize::new(0),
            deactivations: AtomicUsize::new(0),
            sender,
            receiver: Mutex::new(Some(receiver)),
        }
    }
}

impl FakeAudioSession {
    pub fn activations(&self) -> usize {
        self.activations.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl AudioSession for FakeAudioSession {
    fn activate(&self) -> BridgeResult<()> {
        self.activations.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn deactivate(&self) -> BridgeResult<()> {
        self.deactivations.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn subscribe_events(&self) -> BridgeResult<Box<dyn AudioSessionEventStream>> {
        let receiver = self.receiver.lock().take().ok_or_else(|| {
            bridge_traits::BridgeError::OperationFailed("already subscribed".to_string())
        })?;
        Ok(Box::new(ChannelEvents(receiver)))
    }
}

/// A session wired to fakes, with everything published recorded.
pub struct Rig {
    pub engine: Arc<FakeEngine>,
    pub audio: Arc<FakeAudioSession>,
    pub published: Arc<Mutex<Vec<NowPlayingInfo>>>,
    pub clears: Arc<AtomicUsize>,
    pub bus: EventBus,
    pub session: Arc<PlaybackSession>,
}

impl Rig {
    pub fn last_published(&self) -> Option<NowPlayingInfo> {
        self.published.lock().last().cloned()
    }

    pub fn clears(&self) -> usize {
        self.clears.load(Ordering::SeqCst)
    }
}

pub fn permissive_remote() -> MockRemote {
    let mut remote = MockRemote::new();
    remote.expect_enable().returning(|_, _| Ok(()));
    remote.expect_disable_all().return_const(());
    remote
}

pub fn rig() -> Rig {
    rig_with(FakeEngine::with_duration(Some(Duration::from_secs(100))), permissive_remote())
}

pub fn rig_with(engine: FakeEngine, remote: MockRemote) -> Rig {
    let engine = Arc::new(engine);
    let audio = Arc::new(FakeAudioSession::default());
    let published = Arc::new(Mutex::new(Vec::new()));
    let clears = Arc::new(AtomicUsize::new(0));

    let mut now_playing = MockNowPlaying::new();
    let sink = published.clone();
    now_playing
        .expect_publish()
        .returning(move |info| sink.lock().push(info));
    let counter = clears.clone();
    now_playing.expect_clear().returning(move || {
        counter.fetch_add(1, Ordering::SeqCst);
    });

    let session = PlaybackSession::new(
        engine.clone(),
        audio.clone(),
        Arc::new(now_playing),
        Arc::new(remote),
        SessionConfig::default(),
    )
    .with_shuffle_seed(11);
    let bus = EventBus::new(64);
    let session = session.with_event_bus(bus.clone());

    Rig {
        engine,
        audio,
        published,
        clears,
        bus,
        session: Arc::new(session),
    }
}

pub fn entries(count: usize) -> Vec<PlaylistEntry> {
    (0..count)
        .map(|i| {
            PlaylistEntry::new(
                ItemId::new(),
                format!("Track {}", i),
                format!("file:///media/audios/track-{}.m4a", i),
                MediaKind::Audio,
            )
        })
        .collect()
}
