//! # Playback Session
//!
//! The process-wide "now playing" context. One session drives the single
//! [`MediaEngine`], keeps the system now-playing surface current and answers
//! remote commands by calling back into its own transport methods.
//!
//! ## State
//!
//! Engine state (rate, position, errors) is read through the engine on
//! demand. The session only owns what the engine does not know: the
//! playlist, the current index, loop and shuffle settings, and a pending
//! "start at" URL for a file that has not finished downloading yet.
//!
//! Nothing here writes to the item store. The playlist arrives through
//! [`PlaybackSession::apply_playlist`], usually from a
//! [`PlaylistReconciler`](crate::reconciler::PlaylistReconciler).
//!
//! ## Seeking
//!
//! Seeks pause the engine and resume only after the engine reports
//! completion. When seeks overlap, only the latest one resumes playback.

use crate::config::SessionConfig;
use crate::error::{PlaybackError, Result};
use crate::playlist::{position_of_url, step_index, Direction, LoopMode, PlaylistEntry};
use crate::reconciler::{reconcile, PlaybackAnchor, Reconciliation};
use bridge_traits::background::{LifecycleObserver, LifecycleState};
use bridge_traits::playback::{
    AudioSession, AudioSessionEvent, CommandStatus, MediaEngine, MediaSource, NowPlayingCenter,
    NowPlayingInfo, RemoteCommand, RemoteCommandCenter, RemoteCommandKind, RouteChangeReason,
};
use core_library::ItemId;
use core_runtime::events::{CoreEvent, EventBus, PlaybackEvent};
use core_runtime::logging::redact_url;
use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument, warn};

/// Snapshot of the session's observable state.
#[derive(Debug, Clone, PartialEq)]
pub struct PlaybackState {
    pub current_entry_index: Option<usize>,
    pub is_playing: bool,
    pub shuffle_enabled: bool,
    pub loop_mode: LoopMode,
    pub current_url: Option<String>,
    pub playlist_len: usize,
}

/// What the engine is loaded with.
#[derive(Debug, Clone, PartialEq)]
struct CurrentItem {
    item_id: Option<ItemId>,
    url: String,
    title: String,
    duration: Option<Duration>,
    has_video: bool,
}

impl CurrentItem {
    fn from_entry(entry: &PlaylistEntry) -> Self {
        Self {
            item_id: Some(entry.item_id),
            url: entry.url.clone(),
            title: entry.title.clone(),
            duration: entry.duration,
            has_video: entry.has_video(),
        }
    }
}

struct SessionState {
    playlist: Vec<PlaylistEntry>,
    index: Option<usize>,
    current: Option<CurrentItem>,
    pending_start_url: Option<String>,
    loop_mode: LoopMode,
    shuffle: bool,
    remote_enabled: bool,
    resume_after_interruption: bool,
    seek_generation: u64,
    resume_after_seek: bool,
    rng: StdRng,
}

impl SessionState {
    fn anchor(&self) -> PlaybackAnchor {
        PlaybackAnchor {
            item_id: self.current.as_ref().and_then(|c| c.item_id),
            url: self.current.as_ref().map(|c| c.url.clone()),
            index: self.index,
            pending_start_url: self.pending_start_url.clone(),
        }
    }

    /// Seeks still in flight no longer resume playback or report success.
    fn supersede_seeks(&mut self) {
        self.seek_generation += 1;
        self.resume_after_seek = false;
    }
}

/// Single shared playback controller.
pub struct PlaybackSession {
    engine: Arc<dyn MediaEngine>,
    audio: Arc<dyn AudioSession>,
    now_playing: Arc<dyn NowPlayingCenter>,
    remote: Arc<dyn RemoteCommandCenter>,
    config: SessionConfig,
    state: Mutex<SessionState>,
    event_bus: Option<EventBus>,
}

impl PlaybackSession {
    pub fn new(
        engine: Arc<dyn MediaEngine>,
        audio: Arc<dyn AudioSession>,
        now_playing: Arc<dyn NowPlayingCenter>,
        remote: Arc<dyn RemoteCommandCenter>,
        config: SessionConfig,
    ) -> Self {
        Self {
            engine,
            audio,
            now_playing,
            remote,
            config,
            state: Mutex::new(SessionState {
                playlist: Vec::new(),
                index: None,
                current: None,
                pending_start_url: None,
                loop_mode: LoopMode::Off,
                shuffle: false,
                remote_enabled: false,
                resume_after_interruption: false,
                seek_generation: 0,
                resume_after_seek: false,
                rng: StdRng::from_entropy(),
            }),
            event_bus: None,
        }
    }

    /// Publish [`PlaybackEvent`]s on `event_bus`.
    pub fn with_event_bus(mut self, event_bus: EventBus) -> Self {
        self.event_bus = Some(event_bus);
        self
    }

    /// Seed the shuffle generator, for reproducible shuffle order.
    pub fn with_shuffle_seed(mut self, seed: u64) -> Self {
        self.state.get_mut().rng = StdRng::seed_from_u64(seed);
        self
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    // ------------------------------------------------------------------
    // State
    // ------------------------------------------------------------------

    /// `true` only while the engine is actually advancing: rate above zero
    /// and no engine error.
    pub fn is_playing(&self) -> bool {
        self.engine.rate() > 0.0 && self.engine.error().is_none()
    }

    pub fn state(&self) -> PlaybackState {
        let is_playing = self.is_playing();
        let state = self.state.lock();
        PlaybackState {
            current_entry_index: state.index,
            is_playing,
            shuffle_enabled: state.shuffle,
            loop_mode: state.loop_mode,
            current_url: state.current.as_ref().map(|c| c.url.clone()),
            playlist_len: state.playlist.len(),
        }
    }

    pub fn playlist(&self) -> Vec<PlaylistEntry> {
        self.state.lock().playlist.clone()
    }

    pub fn current_url(&self) -> Option<String> {
        self.state.lock().current.as_ref().map(|c| c.url.clone())
    }

    pub fn pending_start_url(&self) -> Option<String> {
        self.state.lock().pending_start_url.clone()
    }

    pub fn loop_mode(&self) -> LoopMode {
        self.state.lock().loop_mode
    }

    pub fn set_loop_mode(&self, mode: LoopMode) {
        self.state.lock().loop_mode = mode;
        debug!(loop_mode = %mode, "Loop mode changed");
    }

    pub fn shuffle_enabled(&self) -> bool {
        self.state.lock().shuffle
    }

    pub fn set_shuffle(&self, enabled: bool) {
        self.state.lock().shuffle = enabled;
        debug!(shuffle = enabled, "Shuffle changed");
    }

    // ------------------------------------------------------------------
    // Transport
    // ------------------------------------------------------------------

    /// Play the playlist entry at `index`.
    ///
    /// If that entry's source is already loaded, playback resumes without
    /// replacing it.
    pub fn play_entry(&self, index: usize) -> Result<()> {
        let current = {
            let state = self.state.lock();
            let entry = state.playlist.get(index).ok_or(PlaybackError::IndexOutOfRange {
                index,
                len: state.playlist.len(),
            })?;
            CurrentItem::from_entry(entry)
        };
        self.load_and_play(current, Some(index));
        Ok(())
    }

    /// Play `url`. If it belongs to the playlist, that entry becomes
    /// current (first match); otherwise it plays outside the playlist.
    pub fn play_url(&self, url: &str, title: &str) {
        let (current, index) = {
            let state = self.state.lock();
            match position_of_url(&state.playlist, url) {
                Some(index) => (CurrentItem::from_entry(&state.playlist[index]), Some(index)),
                None => (
                    CurrentItem {
                        item_id: None,
                        url: url.to_string(),
                        title: title.to_string(),
                        duration: None,
                        has_video: false,
                    },
                    None,
                ),
            }
        };
        self.load_and_play(current, index);
    }

    /// Start at the entry playing `url`, now or once it appears.
    ///
    /// If `url` is not in the playlist yet (its download is still running)
    /// it is remembered, and the next playlist update containing it starts
    /// playback there.
    ///
    /// # Returns
    /// `true` if playback started immediately
    pub fn start_at(&self, url: &str) -> bool {
        let index = {
            let mut state = self.state.lock();
            let index = position_of_url(&state.playlist, url);
            if index.is_none() {
                state.pending_start_url = Some(url.to_string());
            }
            index
        };

        match index {
            Some(index) => self.play_entry(index).is_ok(),
            None => {
                debug!(url = %redact_url(url), "Start deferred until the entry is available");
                false
            }
        }
    }

    pub fn pause(&self) {
        self.engine.pause();
        self.publish_now_playing_with_rate(0.0);

        if let Some(url) = self.current_url() {
            self.emit(PlaybackEvent::Paused {
                url,
                position_ms: self.engine.position().as_millis() as u64,
            });
        }
    }

    /// Resume the loaded source.
    ///
    /// # Errors
    /// Returns [`PlaybackError::NoSource`] if nothing is loaded.
    pub fn resume(&self) -> Result<()> {
        let url = self.current_url().ok_or(PlaybackError::NoSource)?;
        self.activate_audio();
        self.engine.play();
        self.publish_now_playing();
        self.emit(PlaybackEvent::Resumed {
            url,
            position_ms: self.engine.position().as_millis() as u64,
        });
        Ok(())
    }

    pub fn toggle_play_pause(&self) -> Result<()> {
        if self.is_playing() {
            self.pause();
            Ok(())
        } else {
            self.resume()
        }
    }

    /// Seek to `position`, clamped into the playable range.
    ///
    /// Waits for the engine to report completion, then resumes if the
    /// session was playing when the seek began.
    ///
    /// # Returns
    /// `false` if the engine did not finish the seek, or a newer seek or a
    /// source change superseded it
    #[instrument(skip(self))]
    pub async fn seek_to(&self, position: Duration) -> Result<bool> {
        if self.current_url().is_none() {
            return Err(PlaybackError::NoSource);
        }
        let target = self.config.clamp_seek(position, self.engine.duration());

        let was_playing = self.is_playing();
        let generation = {
            let mut state = self.state.lock();
            state.seek_generation += 1;
            state.resume_after_seek |= was_playing;
            state.seek_generation
        };
        if was_playing {
            self.engine.pause();
        }

        let finished = self.engine.seek(target).await;

        let (current, resume) = {
            let mut state = self.state.lock();
            if state.seek_generation == generation {
                (true, std::mem::take(&mut state.resume_after_seek))
            } else {
                (false, false)
            }
        };
        if resume {
            self.engine.play();
        }
        self.publish_now_playing();

        debug!(
            target_ms = target.as_millis() as u64,
            finished,
            superseded = !current,
            resumed = resume,
            "Seek finished"
        );
        Ok(finished && current)
    }

    /// Seek relative to the current position. Negative values seek back.
    pub async fn seek_by(&self, delta_seconds: f64) -> Result<bool> {
        let current = self.engine.position().as_secs_f64();
        let target = current + delta_seconds;
        let target = if target.is_finite() && target > 0.0 {
            Duration::from_secs_f64(target)
        } else {
            Duration::ZERO
        };
        self.seek_to(target).await
    }

    pub async fn skip_forward(&self) -> Result<bool> {
        self.seek_by(self.config.skip_interval.as_secs_f64()).await
    }

    pub async fn skip_backward(&self) -> Result<bool> {
        self.seek_by(-self.config.skip_interval.as_secs_f64()).await
    }

    /// Move to the next entry per loop mode and shuffle.
    ///
    /// # Returns
    /// `false` at the end of the playlist with looping off, or if the
    /// playlist is empty
    pub async fn next(&self) -> bool {
        self.step(Direction::Forward).await
    }

    pub async fn previous(&self) -> bool {
        self.step(Direction::Backward).await
    }

    /// The engine reached the end of the current item.
    ///
    /// Advances like [`next`](Self::next); at the end of the playlist with
    /// looping off, playback stops on the last entry.
    pub async fn handle_item_finished(&self) -> bool {
        let advanced = self.step(Direction::Forward).await;
        if !advanced {
            debug!("Reached end of playlist");
            self.pause();
        }
        advanced
    }

    /// Clear the engine, the now-playing surface and remote commands.
    pub fn stop(&self) {
        self.engine.pause();
        self.engine.replace_source(None);
        {
            let mut state = self.state.lock();
            state.current = None;
            state.index = None;
            state.pending_start_url = None;
            state.remote_enabled = false;
            state.supersede_seeks();
        }
        self.now_playing.clear();
        self.remote.disable_all();
        self.deactivate_audio();
        self.emit(PlaybackEvent::Stopped);
    }

    // ------------------------------------------------------------------
    // Playlist reconciliation
    // ------------------------------------------------------------------

    /// Replace the playlist and resolve the current entry against it.
    ///
    /// - A pending start-at URL present in `entries` wins and plays.
    /// - If the current item is still present, only metadata refreshes; the
    ///   engine source is left alone.
    /// - If `entries` is empty, the engine source is cleared.
    /// - Otherwise the old index is clamped into range and plays.
    pub fn apply_playlist(&self, entries: Vec<PlaylistEntry>) -> Reconciliation {
        let outcome = {
            let mut state = self.state.lock();
            let outcome = reconcile(&state.anchor(), &entries);
            state.playlist = entries;

            match outcome {
                Reconciliation::Keep(index) => {
                    state.index = Some(index);
                    let refreshed = CurrentItem::from_entry(&state.playlist[index]);
                    if let Some(current) = state.current.as_mut() {
                        current.title = refreshed.title;
                        current.duration = refreshed.duration;
                        current.item_id = refreshed.item_id;
                    }
                }
                Reconciliation::Clear => {
                    state.index = None;
                    state.current = None;
                    state.supersede_seeks();
                }
                Reconciliation::Idle => {
                    state.index = None;
                }
                Reconciliation::StartAt(_) | Reconciliation::PlayAt(_) => {}
            }
            outcome
        };

        match outcome {
            Reconciliation::StartAt(index) | Reconciliation::PlayAt(index) => {
                if let Err(e) = self.play_entry(index) {
                    warn!(error = %e, "Reconciled entry could not be played");
                }
            }
            Reconciliation::Keep(_) => self.publish_now_playing(),
            Reconciliation::Clear => {
                info!("Playlist emptied; clearing playback");
                self.engine.replace_source(None);
                self.now_playing.clear();
                self.deactivate_audio();
                self.emit(PlaybackEvent::Stopped);
            }
            Reconciliation::Idle => {}
        }

        debug!(?outcome, "Playlist reconciled");
        outcome
    }

    // ------------------------------------------------------------------
    // Remote commands
    // ------------------------------------------------------------------

    /// Route a command from the remote control surface to the matching
    /// transport method.
    #[instrument(skip(self))]
    pub async fn handle_remote_command(&self, command: RemoteCommand) -> CommandStatus {
        let handled = match command {
            RemoteCommand::Play => self.resume().is_ok(),
            RemoteCommand::Pause => {
                let loaded = self.current_url().is_some();
                if loaded {
                    self.pause();
                }
                loaded
            }
            RemoteCommand::TogglePlayPause => self.toggle_play_pause().is_ok(),
            RemoteCommand::NextTrack => self.next().await,
            RemoteCommand::PreviousTrack => self.previous().await,
            RemoteCommand::SkipForward(interval) => {
                let interval = self.skip_or_default(interval);
                self.seek_by(interval.as_secs_f64()).await.is_ok()
            }
            RemoteCommand::SkipBackward(interval) => {
                let interval = self.skip_or_default(interval);
                self.seek_by(-interval.as_secs_f64()).await.is_ok()
            }
            RemoteCommand::ChangePlaybackPosition(position) => self.seek_to(position).await.is_ok(),
        };

        if handled {
            CommandStatus::Success
        } else {
            CommandStatus::Failure
        }
    }

    // ------------------------------------------------------------------
    // Audio session and lifecycle
    // ------------------------------------------------------------------

    /// React to an interruption or route change.
    pub fn handle_audio_event(&self, event: AudioSessionEvent) {
        match event {
            AudioSessionEvent::InterruptionBegan => {
                let was_playing = self.is_playing();
                self.state.lock().resume_after_interruption = was_playing;
                if was_playing {
                    self.engine.pause();
                }
                self.publish_now_playing_with_rate(0.0);
                info!(was_playing, "Audio interrupted");
            }
            AudioSessionEvent::InterruptionEnded { should_resume } => {
                let was_playing =
                    std::mem::take(&mut self.state.lock().resume_after_interruption);
                let resume = should_resume && was_playing && self.current_url().is_some();
                if resume {
                    self.activate_audio();
                    self.engine.play();
                    self.publish_now_playing();
                }
                info!(should_resume, resumed = resume, "Audio interruption ended");
                self.emit(PlaybackEvent::Interrupted { resumed: resume });
            }
            AudioSessionEvent::RouteChanged(RouteChangeReason::OldDeviceUnavailable) => {
                self.state.lock().resume_after_interruption = false;
                if self.is_playing() {
                    self.pause();
                }
                info!("Audio route lost; playback paused");
                self.emit(PlaybackEvent::RouteLost);
            }
            AudioSessionEvent::RouteChanged(reason) => {
                debug!(?reason, "Audio route changed");
            }
        }
    }

    /// Detach the video surface in the background, reattach in the
    /// foreground. Audio is unaffected.
    pub fn handle_lifecycle_change(&self, state: LifecycleState) {
        let attached = !state.is_backgrounded();
        self.engine.set_surface_attached(attached);
        debug!(?state, attached, "Video surface updated for lifecycle");
    }

    /// Follow the audio session's notifications until it closes its stream
    /// or the session is dropped.
    pub async fn watch_audio_events(self: &Arc<Self>) -> Result<JoinHandle<()>> {
        let mut events = self.audio.subscribe_events().await?;
        let session = Arc::downgrade(self);

        Ok(tokio::spawn(async move {
            while let Some(event) = events.next().await {
                let Some(session) = session.upgrade() else {
                    break;
                };
                session.handle_audio_event(event);
            }
            debug!("Audio session event stream ended");
        }))
    }

    /// Apply the observer's current state, then follow its changes.
    pub async fn watch_lifecycle(
        self: &Arc<Self>,
        observer: Arc<dyn LifecycleObserver>,
    ) -> Result<JoinHandle<()>> {
        let initial = observer.get_state().await?;
        self.handle_lifecycle_change(initial);

        let mut changes = observer.subscribe_changes().await?;
        let session = Arc::downgrade(self);

        Ok(tokio::spawn(async move {
            while let Some(state) = changes.next().await {
                let Some(session) = session.upgrade() else {
                    break;
                };
                session.handle_lifecycle_change(state);
            }
            debug!("Lifecycle stream ended");
        }))
    }

    // ------------------------------------------------------------------
    // Internals
    // ------------------------------------------------------------------

    fn load_and_play(&self, current: CurrentItem, index: Option<usize>) {
        let already_loaded = self.engine.current_source().as_deref() == Some(current.url.as_str());
        {
            let mut state = self.state.lock();
            state.index = index;
            state.current = Some(current.clone());
            state.pending_start_url = None;
            state.resume_after_interruption = false;
            if !already_loaded {
                state.supersede_seeks();
            }
        }

        if !already_loaded {
            self.engine.replace_source(Some(
                MediaSource::new(current.url.clone()).with_video(current.has_video),
            ));
        }
        self.activate_audio();
        self.engine.play();
        self.ensure_remote_commands();
        self.publish_now_playing();

        if let Some(message) = self.engine.error() {
            warn!(url = %redact_url(&current.url), error = %message, "Engine rejected source");
            self.emit(PlaybackEvent::Error {
                url: Some(current.url),
                message,
            });
            return;
        }

        if already_loaded {
            self.emit(PlaybackEvent::Resumed {
                url: current.url.clone(),
                position_ms: self.engine.position().as_millis() as u64,
            });
        } else {
            info!(url = %redact_url(&current.url), ?index, "Playback started");
            self.emit(PlaybackEvent::Started {
                url: current.url.clone(),
                title: current.title.clone(),
            });
        }
        if let Some(index) = index {
            self.emit(PlaybackEvent::EntryChanged {
                index,
                url: current.url,
            });
        }
    }

    async fn step(&self, direction: Direction) -> bool {
        let (target, current) = {
            let mut guard = self.state.lock();
            let state = &mut *guard;
            let target = step_index(
                state.index,
                state.playlist.len(),
                direction,
                state.loop_mode,
                state.shuffle,
                &mut state.rng,
            );
            (target, state.index)
        };

        match target {
            None => false,
            Some(index) if Some(index) == current => self.restart_current().await,
            Some(index) => self.play_entry(index).is_ok(),
        }
    }

    async fn restart_current(&self) -> bool {
        if self.current_url().is_none() {
            return false;
        }
        self.engine.seek(Duration::ZERO).await;
        self.activate_audio();
        self.engine.play();
        self.publish_now_playing();
        true
    }

    fn skip_or_default(&self, interval: Duration) -> Duration {
        if interval.is_zero() {
            self.config.skip_interval
        } else {
            interval
        }
    }

    fn activate_audio(&self) {
        if let Err(e) = self.audio.activate() {
            warn!(error = %e, "Failed to activate audio session");
        }
    }

    fn deactivate_audio(&self) {
        if let Err(e) = self.audio.deactivate() {
            warn!(error = %e, "Failed to deactivate audio session");
        }
    }

    fn ensure_remote_commands(&self) {
        let mut state = self.state.lock();
        if state.remote_enabled {
            return;
        }
        match self
            .remote
            .enable(&RemoteCommandKind::ALL, self.config.skip_interval)
        {
            Ok(()) => state.remote_enabled = true,
            Err(e) => warn!(error = %e, "Failed to register remote commands"),
        }
    }

    fn publish_now_playing(&self) {
        let rate = if self.is_playing() {
            self.engine.rate()
        } else {
            0.0
        };
        self.publish_now_playing_with_rate(rate);
    }

    fn publish_now_playing_with_rate(&self, rate: f32) {
        let Some(current) = self.state.lock().current.clone() else {
            return;
        };
        self.now_playing.publish(NowPlayingInfo {
            title: current.title,
            duration: self.engine.duration().or(current.duration),
            elapsed: self.engine.position(),
            rate,
        });
    }

    fn emit(&self, event: PlaybackEvent) {
        if let Some(bus) = &self.event_bus {
            bus.emit(CoreEvent::Playback(event)).ok();
        }
    }
}

impl std::fmt::Debug for PlaybackSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PlaybackSession")
            .field("config", &self.config)
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}
