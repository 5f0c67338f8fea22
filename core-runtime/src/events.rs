//! # Event Bus System
//!
//! Provides an event-driven architecture for the offline media core using
//! `tokio::sync::broadcast`. This module lets the download pipeline, the item
//! store and the playback session announce what happened without knowing who
//! is listening.
//!
//! ## Overview
//!
//! The event bus system consists of:
//! - **Event Types**: Strongly-typed enum hierarchies for each domain
//! - **EventBus**: Central broadcast channel for publishing events
//! - **EventStream**: Wrapper for consuming events with filtering
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────┐  emit   ┌───────────┐
//! │ Download Pipeline├────────>│           │
//! └──────────────────┘         │           │   subscribe   ┌────────────┐
//! ┌──────────────────┐  emit   │ EventBus  ├──────────────>│ Subscriber │
//! │ Item Store       ├────────>│ (broadcast│               └────────────┘
//! └──────────────────┘         │  channel) │   subscribe   ┌────────────┐
//! ┌──────────────────┐  emit   │           ├──────────────>│ Subscriber │
//! │ Playback Session ├────────>│           │               └────────────┘
//! └──────────────────┘         └───────────┘
//! ```
//!
//! ## Usage
//!
//! ```rust
//! use core_runtime::events::{CoreEvent, DownloadEvent, EventBus};
//!
//! # #[tokio::main]
//! # async fn main() {
//! let event_bus = EventBus::new(100);
//! let mut stream = event_bus.subscribe();
//!
//! event_bus
//!     .emit(CoreEvent::Download(DownloadEvent::Queued {
//!         item_id: "item-1".to_string(),
//!         title: "Clip".to_string(),
//!     }))
//!     .ok();
//!
//! let event = stream.recv().await.unwrap();
//! assert_eq!(event.description(), "Download queued");
//! # }
//! ```
//!
//! ## Error Handling
//!
//! - **`RecvError::Lagged(n)`**: Subscriber was too slow and missed `n` events.
//!   This is non-fatal; the subscriber can continue receiving new events.
//! - **`RecvError::Closed`**: All senders have been dropped. This indicates shutdown.
//!
//! Emitting with no subscribers returns an error; producers ignore it with `.ok()`.

use serde::{Deserialize, Serialize};
use std::fmt;
use tokio::sync::broadcast;

// Re-export commonly used types
pub use tokio::sync::broadcast::error::{RecvError, SendError};
pub use tokio::sync::broadcast::Receiver;

/// Default buffer size for the event bus channel.
///
/// Progress events arrive at most once per percent per transfer, so a few
/// hundred slots absorb bursts from several concurrent transfers.
pub const DEFAULT_EVENT_BUFFER_SIZE: usize = 256;

// ============================================================================
// Core Event Types
// ============================================================================

/// Top-level event enum encompassing all event categories.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", content = "payload")]
pub enum CoreEvent {
    /// Transfer lifecycle events
    Download(DownloadEvent),
    /// Item store mutations
    Library(LibraryEvent),
    /// Playback session events
    Playback(PlaybackEvent),
}

impl CoreEvent {
    /// Human-readable description of the event.
    pub fn description(&self) -> &str {
        match self {
            CoreEvent::Download(e) => e.description(),
            CoreEvent::Library(e) => e.description(),
            CoreEvent::Playback(e) => e.description(),
        }
    }

    /// Severity used by hosts to decide whether to surface the event.
    pub fn severity(&self) -> EventSeverity {
        match self {
            CoreEvent::Download(DownloadEvent::Failed { .. }) => EventSeverity::Error,
            CoreEvent::Playback(PlaybackEvent::Error { .. }) => EventSeverity::Error,
            CoreEvent::Download(DownloadEvent::Completed { .. }) => EventSeverity::Info,
            CoreEvent::Download(DownloadEvent::Canceled { .. }) => EventSeverity::Info,
            CoreEvent::Library(LibraryEvent::OrphansRecovered { .. }) => EventSeverity::Warning,
            CoreEvent::Playback(PlaybackEvent::Interrupted { .. }) => EventSeverity::Info,
            _ => EventSeverity::Debug,
        }
    }
}

/// Event severity level
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum EventSeverity {
    Debug,
    Info,
    Warning,
    Error,
}

// ============================================================================
// Download Events
// ============================================================================

/// Transfer lifecycle events emitted by the download pipeline.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "event")]
pub enum DownloadEvent {
    /// A new item was recorded and its transfer registered.
    Queued { item_id: String, title: String },
    /// The transfer started moving bytes.
    Started { item_id: String },
    /// Stored progress crossed into a new percent bucket.
    Progress { item_id: String, percent: u8 },
    /// The file was placed and the item marked completed.
    Completed {
        item_id: String,
        local_path: String,
        file_size: u64,
    },
    /// The transfer or placement failed.
    Failed { item_id: String, message: String },
    /// The user canceled the transfer.
    Canceled { item_id: String },
    /// Every transfer finished while the app was backgrounded.
    BackgroundDrained,
}

impl DownloadEvent {
    fn description(&self) -> &str {
        match self {
            DownloadEvent::Queued { .. } => "Download queued",
            DownloadEvent::Started { .. } => "Download started",
            DownloadEvent::Progress { .. } => "Download in progress",
            DownloadEvent::Completed { .. } => "Download completed",
            DownloadEvent::Failed { .. } => "Download failed",
            DownloadEvent::Canceled { .. } => "Download canceled",
            DownloadEvent::BackgroundDrained => "Background transfers drained",
        }
    }
}

// ============================================================================
// Library Events
// ============================================================================

/// Mutations committed by the item store.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "event")]
pub enum LibraryEvent {
    /// An item was inserted or updated.
    ItemSaved { item_id: String, status: String },
    /// An item was renamed by the user.
    ItemRenamed { item_id: String, title: String },
    /// Items were deleted in one transaction.
    ItemsDeleted { item_ids: Vec<String> },
    /// Items left in flight by a previous process were marked failed.
    OrphansRecovered { count: u64 },
}

impl LibraryEvent {
    fn description(&self) -> &str {
        match self {
            LibraryEvent::ItemSaved { .. } => "Item saved",
            LibraryEvent::ItemRenamed { .. } => "Item renamed",
            LibraryEvent::ItemsDeleted { .. } => "Items deleted",
            LibraryEvent::OrphansRecovered { .. } => "Interrupted downloads recovered",
        }
    }
}

// ============================================================================
// Playback Events
// ============================================================================

/// Playback session events.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "event")]
pub enum PlaybackEvent {
    /// A new source was loaded and started.
    Started { url: String, title: String },
    Paused { url: String, position_ms: u64 },
    Resumed { url: String, position_ms: u64 },
    /// The engine source was cleared (playlist emptied).
    Stopped,
    /// The current entry changed position in the playlist.
    EntryChanged { index: usize, url: String },
    /// Another audio client took over output.
    Interrupted { resumed: bool },
    /// The output route went away and playback paused.
    RouteLost,
    /// The engine reported an error for the current source.
    Error { url: Option<String>, message: String },
}

impl PlaybackEvent {
    fn description(&self) -> &str {
        match self {
            PlaybackEvent::Started { .. } => "Playback started",
            PlaybackEvent::Paused { .. } => "Playback paused",
            PlaybackEvent::Resumed { .. } => "Playback resumed",
            PlaybackEvent::Stopped => "Playback stopped",
            PlaybackEvent::EntryChanged { .. } => "Playlist entry changed",
            PlaybackEvent::Interrupted { .. } => "Playback interrupted",
            PlaybackEvent::RouteLost => "Audio route lost",
            PlaybackEvent::Error { .. } => "Playback error",
        }
    }
}

// ============================================================================
// Event Bus
// ============================================================================

/// Central event bus for broadcasting events to multiple subscribers.
///
/// Cloning is cheap; every clone publishes into the same channel.
#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<CoreEvent>,
}

impl EventBus {
    /// Creates a new event bus with the specified buffer capacity.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Emits an event to all active subscribers.
    ///
    /// Returns the number of subscribers that received the event, or an error
    /// when there are none.
    pub fn emit(&self, event: CoreEvent) -> Result<usize, SendError<CoreEvent>> {
        self.sender.send(event)
    }

    /// Creates a new subscription to the event bus.
    ///
    /// The subscriber only receives events emitted after this call.
    pub fn subscribe(&self) -> Receiver<CoreEvent> {
        self.sender.subscribe()
    }

    /// Returns the current number of active subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_EVENT_BUFFER_SIZE)
    }
}

impl fmt::Debug for EventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventBus")
            .field("subscriber_count", &self.subscriber_count())
            .finish()
    }
}

// ============================================================================
// Event Stream Wrapper
// ============================================================================

type EventFilter = Box<dyn Fn(&CoreEvent) -> bool + Send + Sync>;

/// Wrapper around a broadcast receiver with optional filtering.
///
/// ```rust
/// use core_runtime::events::{CoreEvent, EventBus, EventStream};
///
/// let bus = EventBus::new(100);
/// let stream = EventStream::new(bus.subscribe())
///     .filter(|event| matches!(event, CoreEvent::Download(_)));
/// ```
pub struct EventStream {
    receiver: Receiver<CoreEvent>,
    filter: Option<EventFilter>,
}

impl EventStream {
    pub fn new(receiver: Receiver<CoreEvent>) -> Self {
        Self {
            receiver,
            filter: None,
        }
    }

    /// Adds a filter predicate to the stream.
    pub fn filter<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&CoreEvent) -> bool + Send + Sync + 'static,
    {
        self.filter = Some(Box::new(predicate));
        self
    }

    /// Receives the next event that matches the filter.
    pub async fn recv(&mut self) -> Result<CoreEvent, RecvError> {
        loop {
            let event = self.receiver.recv().await?;

            let Some(filter) = &self.filter else {
                return Ok(event);
            };

            if filter(&event) {
                return Ok(event);
            }
        }
    }

    /// Attempts to receive an event without waiting.
    ///
    /// Returns `None` when no matching event is buffered.
    pub fn try_recv(&mut self) -> Option<Result<CoreEvent, RecvError>> {
        loop {
            match self.receiver.try_recv() {
                Ok(event) => {
                    let Some(filter) = &self.filter else {
                        return Some(Ok(event));
                    };

                    if filter(&event) {
                        return Some(Ok(event));
                    }
                }
                Err(broadcast::error::TryRecvError::Empty) => return None,
                Err(broadcast::error::TryRecvError::Lagged(n)) => {
                    return Some(Err(RecvError::Lagged(n)))
                }
                Err(broadcast::error::TryRecvError::Closed) => return Some(Err(RecvError::Closed)),
            }
        }
    }
}

impl fmt::Debug for EventStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventStream")
            .field("has_filter", &self.filter.is_some())
            .finish()
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn queued(id: &str) -> CoreEvent {
        CoreEvent::Download(DownloadEvent::Queued {
            item_id: id.to_string(),
            title: "Clip".to_string(),
        })
    }

    #[tokio::test]
    async fn test_event_bus_creation() {
        let bus = EventBus::new(10);
        assert_eq!(bus.subscriber_count(), 0);
    }

    #[tokio::test]
    async fn test_event_bus_subscription() {
        let bus = EventBus::new(10);
        let _sub1 = bus.subscribe();
        let _sub2 = bus.subscribe();
        assert_eq!(bus.subscriber_count(), 2);
    }

    #[tokio::test]
    async fn test_event_emission_no_subscribers() {
        let bus = EventBus::new(10);
        assert!(bus.emit(queued("a")).is_err());
    }

    #[tokio::test]
    async fn test_multiple_subscribers_receive_same_event() {
        let bus = EventBus::new(10);
        let mut sub1 = bus.subscribe();
        let mut sub2 = bus.subscribe();

        let event = CoreEvent::Download(DownloadEvent::Progress {
            item_id: "item-1".to_string(),
            percent: 50,
        });

        assert_eq!(bus.emit(event.clone()).unwrap(), 2);
        assert_eq!(sub1.recv().await.unwrap(), event);
        assert_eq!(sub2.recv().await.unwrap(), event);
    }

    #[tokio::test]
    async fn test_event_stream_with_filter() {
        let bus = EventBus::new(10);
        let mut stream = EventStream::new(bus.subscribe())
            .filter(|event| matches!(event, CoreEvent::Playback(_)));

        bus.emit(queued("a")).ok();
        let playback = CoreEvent::Playback(PlaybackEvent::Interrupted { resumed: false });
        bus.emit(playback.clone()).ok();

        assert_eq!(stream.recv().await.unwrap(), playback);
    }

    #[tokio::test]
    async fn test_try_recv_skips_filtered_events() {
        let bus = EventBus::new(10);
        let mut stream = EventStream::new(bus.subscribe())
            .filter(|event| matches!(event, CoreEvent::Library(_)));

        bus.emit(queued("a")).ok();
        assert!(stream.try_recv().is_none());

        let deleted = CoreEvent::Library(LibraryEvent::ItemsDeleted {
            item_ids: vec!["a".to_string()],
        });
        bus.emit(deleted.clone()).ok();
        assert_eq!(stream.try_recv().unwrap().unwrap(), deleted);
    }

    #[tokio::test]
    async fn test_lagged_subscriber() {
        let bus = EventBus::new(2);
        let mut sub = bus.subscribe();

        for i in 0..5 {
            bus.emit(queued(&format!("item-{i}"))).ok();
        }

        let result = sub.recv().await;
        assert!(matches!(result, Err(RecvError::Lagged(_))));
    }

    #[test]
    fn test_event_severity() {
        let failed = CoreEvent::Download(DownloadEvent::Failed {
            item_id: "a".to_string(),
            message: "timed out".to_string(),
        });
        assert_eq!(failed.severity(), EventSeverity::Error);

        let recovered = CoreEvent::Library(LibraryEvent::OrphansRecovered { count: 2 });
        assert_eq!(recovered.severity(), EventSeverity::Warning);

        assert_eq!(queued("a").severity(), EventSeverity::Debug);
        assert!(EventSeverity::Error > EventSeverity::Info);
    }

    #[test]
    fn test_event_serialization() {
        let event = CoreEvent::Download(DownloadEvent::Completed {
            item_id: "a".to_string(),
            local_path: "videos/Clip-1.mp4".to_string(),
            file_size: 100,
        });

        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("\"type\":\"Download\""));
        assert!(json.contains("\"event\":\"Completed\""));

        let back: CoreEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(back, event);
    }
}
