//! # Host Bridge Traits
//!
//! Platform abstraction traits that must be implemented by each host platform.
//!
//! ## Overview
//!
//! This crate defines the contract between the offline media core and the
//! platform-specific pieces it cannot own: the network stack, the sandboxed
//! filesystem, the native media engine, the audio session, and the system
//! now-playing surface.
//!
//! ## Traits
//!
//! ### Networking & I/O
//! - [`HttpClient`](http::HttpClient) - Streaming HTTP downloads
//! - [`FileSystemAccess`](storage::FileSystemAccess) - File I/O, atomic name claims, moves
//!
//! ### Playback Integration
//! - [`MediaEngine`](playback::MediaEngine) - The single native player
//! - [`AudioSession`](playback::AudioSession) - Audio output activation, interruptions, route changes
//! - [`NowPlayingCenter`](playback::NowPlayingCenter) - Lock screen / system media metadata
//! - [`RemoteCommandCenter`](playback::RemoteCommandCenter) - Headset and lock screen controls
//!
//! ### Platform Integration
//! - [`LifecycleObserver`](background::LifecycleObserver) - App foreground/background transitions
//!
//! ### Utilities
//! - [`Clock`](time::Clock) - Time source for deterministic testing
//! - [`LoggerSink`](time::LoggerSink) - Forward structured logs to host logging
//!
//! ## Fail-Fast Strategy
//!
//! The core fails fast with descriptive errors when a required capability is missing:
//!
//! ```ignore
//! let http_client = config.http_client
//!     .ok_or_else(|| Error::CapabilityMissing {
//!         capability: "HttpClient".to_string(),
//!         message: "No HTTP client implementation provided. \
//!                  Desktop: ensure default feature is enabled. \
//!                  Mobile: inject platform-native adapter.".to_string()
//!     })?;
//! ```
//!
//! ## Error Handling
//!
//! All bridge traits use the [`BridgeError`](error::BridgeError) type. Platform
//! implementations should convert platform-specific errors to `BridgeError` and
//! include context such as file paths or HTTP status codes.
//!
//! ## Thread Safety
//!
//! All bridge traits require `Send + Sync` so implementations can be shared
//! across async tasks.

pub mod background;
pub mod error;
pub mod http;
pub mod playback;
pub mod storage;
pub mod time;

pub use error::BridgeError;

// Re-export commonly used types
pub use background::{LifecycleChangeStream, LifecycleObserver, LifecycleState};
pub use http::{DownloadResponse, HttpClient, HttpMethod, HttpRequest};
pub use playback::{
    AudioSession, AudioSessionEvent, AudioSessionEventStream, CommandStatus, MediaEngine,
    MediaSource, NowPlayingCenter, NowPlayingInfo, RemoteCommand, RemoteCommandCenter,
    RemoteCommandKind, RouteChangeReason,
};
pub use storage::{FileMetadata, FileSystemAccess};
pub use time::{Clock, LogEntry, LogLevel, LoggerSink, SystemClock};
