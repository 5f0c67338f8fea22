//! Playback bridge traits and supporting types.
//!
//! These abstractions let the playback session drive the platform's single
//! media engine, its audio session, and the system now-playing / remote
//! control surface without knowing which OS it runs on. Host applications
//! provide concrete implementations.
//!
//! Engine state reads are synchronous; only seeking is asynchronous because
//! native players report seek completion through a callback.

use std::time::Duration;

use crate::error::Result;

/// Playable media handed to the engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaSource {
    /// Absolute URL (usually `file://`) of the asset.
    pub url: String,
    /// Whether the engine should render video frames for this source.
    pub has_video: bool,
}

impl MediaSource {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            has_video: false,
        }
    }

    pub fn with_video(mut self, has_video: bool) -> Self {
        self.has_video = has_video;
        self
    }
}

/// The platform's media player (AVPlayer, ExoPlayer, GStreamer pipeline, ...).
///
/// There is exactly one engine per process. All methods other than
/// [`seek`](MediaEngine::seek) must return immediately.
#[async_trait::async_trait]
pub trait MediaEngine: Send + Sync {
    /// Replace the current item. `None` clears the engine.
    fn replace_source(&self, source: Option<MediaSource>);

    /// URL of the item currently loaded, if any.
    fn current_source(&self) -> Option<String>;

    /// Start or resume at the default rate.
    fn play(&self);

    /// Pause, keeping the current position.
    fn pause(&self);

    /// Current playback rate. `0.0` when paused or stalled.
    fn rate(&self) -> f32;

    /// Error reported by the engine for the current item, if any.
    fn error(&self) -> Option<String>;

    /// Current position within the item.
    fn position(&self) -> Duration;

    /// Item duration. `None` while unknown or for indefinite (live) sources.
    fn duration(&self) -> Option<Duration>;

    /// Seek to `position`. Resolves once the engine reports completion;
    /// `false` means the seek was interrupted by a newer seek or item change.
    async fn seek(&self, position: Duration) -> bool;

    /// Attach or detach the visual output surface. Audio is unaffected.
    fn set_surface_attached(&self, attached: bool);
}

/// Reason the audio route changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteChangeReason {
    /// Headphones or a Bluetooth device became available.
    NewDeviceAvailable,
    /// The device audio was playing through went away.
    OldDeviceUnavailable,
    /// Any other route change (category change, override, ...).
    Other,
}

/// Notifications delivered by the platform audio session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AudioSessionEvent {
    /// Another audio client (phone call, alarm) took over output.
    InterruptionBegan,
    /// The interruption finished. `should_resume` mirrors the platform hint.
    InterruptionEnded { should_resume: bool },
    /// The output route changed.
    RouteChanged(RouteChangeReason),
}

/// Stream of audio session notifications.
#[async_trait::async_trait]
pub trait AudioSessionEventStream: Send {
    /// Returns `None` when the stream is closed.
    async fn next(&mut self) -> Option<AudioSessionEvent>;
}

/// Process-wide audio session (AVAudioSession, AudioFocus, ...).
#[async_trait::async_trait]
pub trait AudioSession: Send + Sync {
    /// Configure for playback and make the session active.
    fn activate(&self) -> Result<()>;

    /// Release audio output so other apps can resume.
    fn deactivate(&self) -> Result<()>;

    /// Subscribe to interruption and route change notifications.
    async fn subscribe_events(&self) -> Result<Box<dyn AudioSessionEventStream>>;
}

/// Metadata shown on the lock screen / system media controls.
#[derive(Debug, Clone, PartialEq)]
pub struct NowPlayingInfo {
    pub title: String,
    /// `None` for indefinite sources.
    pub duration: Option<Duration>,
    pub elapsed: Duration,
    /// `0.0` while paused.
    pub rate: f32,
}

/// System now-playing surface.
pub trait NowPlayingCenter: Send + Sync {
    /// Replace the published metadata.
    fn publish(&self, info: NowPlayingInfo);

    /// Remove any published metadata.
    fn clear(&self);
}

/// Command kinds that can be registered with the remote control surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RemoteCommandKind {
    Play,
    Pause,
    TogglePlayPause,
    NextTrack,
    PreviousTrack,
    SkipForward,
    SkipBackward,
    ChangePlaybackPosition,
}

impl RemoteCommandKind {
    /// Every command the playback session handles.
    pub const ALL: [RemoteCommandKind; 8] = [
        RemoteCommandKind::Play,
        RemoteCommandKind::Pause,
        RemoteCommandKind::TogglePlayPause,
        RemoteCommandKind::NextTrack,
        RemoteCommandKind::PreviousTrack,
        RemoteCommandKind::SkipForward,
        RemoteCommandKind::SkipBackward,
        RemoteCommandKind::ChangePlaybackPosition,
    ];
}

/// Command received from headsets, lock screen, car displays, ...
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RemoteCommand {
    Play,
    Pause,
    TogglePlayPause,
    NextTrack,
    PreviousTrack,
    SkipForward(Duration),
    SkipBackward(Duration),
    ChangePlaybackPosition(Duration),
}

impl RemoteCommand {
    pub fn kind(&self) -> RemoteCommandKind {
        match self {
            RemoteCommand::Play => RemoteCommandKind::Play,
            RemoteCommand::Pause => RemoteCommandKind::Pause,
            RemoteCommand::TogglePlayPause => RemoteCommandKind::TogglePlayPause,
            RemoteCommand::NextTrack => RemoteCommandKind::NextTrack,
            RemoteCommand::PreviousTrack => RemoteCommandKind::PreviousTrack,
            RemoteCommand::SkipForward(_) => RemoteCommandKind::SkipForward,
            RemoteCommand::SkipBackward(_) => RemoteCommandKind::SkipBackward,
            RemoteCommand::ChangePlaybackPosition(_) => RemoteCommandKind::ChangePlaybackPosition,
        }
    }
}

/// Result reported back to the remote control surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandStatus {
    Success,
    Failure,
}

/// Registration side of the remote control surface.
///
/// The host routes incoming commands to the playback session; this trait only
/// tells the platform which buttons to enable.
pub trait RemoteCommandCenter: Send + Sync {
    /// Enable the given commands. `skip_interval` configures the skip buttons.
    fn enable(&self, commands: &[RemoteCommandKind], skip_interval: Duration) -> Result<()>;

    /// Disable every command.
    fn disable_all(&self);
}
