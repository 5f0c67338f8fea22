//! Domain models for the download library
//!
//! This module contains the persisted download record, its status machine
//! and the value types used to filter and order live queries.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;
use uuid::Uuid;

// =============================================================================
// ID Types
// =============================================================================

/// Unique identifier for a download item
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ItemId(pub Uuid);

impl ItemId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn from_string(s: &str) -> Result<Self, uuid::Error> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

impl Default for ItemId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ItemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// =============================================================================
// Enumerations
// =============================================================================

/// Lifecycle of a download record.
///
/// ```text
/// Queued ──> Running ──> Completed
///   │           ├──────> Failed
///   │           └──────> Canceled
///   └──> Failed | Canceled | Completed
/// ```
///
/// `Completed`, `Failed` and `Canceled` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DownloadStatus {
    Queued,
    Running,
    Completed,
    Failed,
    Canceled,
}

impl DownloadStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DownloadStatus::Queued => "queued",
            DownloadStatus::Running => "running",
            DownloadStatus::Completed => "completed",
            DownloadStatus::Failed => "failed",
            DownloadStatus::Canceled => "canceled",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            DownloadStatus::Completed | DownloadStatus::Failed | DownloadStatus::Canceled
        )
    }

    /// Whether the item still expects callbacks from a live transfer.
    pub fn is_in_flight(&self) -> bool {
        matches!(self, DownloadStatus::Queued | DownloadStatus::Running)
    }

    /// Whether a record in this status may move to `next`.
    ///
    /// Staying in the same status is always allowed so that progress updates
    /// and metadata edits pass through.
    pub fn can_transition_to(&self, next: DownloadStatus) -> bool {
        if *self == next {
            return true;
        }
        match self {
            DownloadStatus::Queued => true,
            DownloadStatus::Running => next.is_terminal(),
            DownloadStatus::Completed | DownloadStatus::Failed | DownloadStatus::Canceled => false,
        }
    }
}

impl fmt::Display for DownloadStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DownloadStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "queued" => Ok(DownloadStatus::Queued),
            "running" => Ok(DownloadStatus::Running),
            "completed" => Ok(DownloadStatus::Completed),
            "failed" => Ok(DownloadStatus::Failed),
            "canceled" => Ok(DownloadStatus::Canceled),
            other => Err(format!("Unknown download status: {}", other)),
        }
    }
}

/// Media kind, which selects the kind-directory and the playlist a file joins.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MediaKind {
    Video,
    Audio,
}

const AUDIO_EXTENSIONS: &[&str] = &["mp3", "m4a", "aac", "wav", "flac", "ogg", "oga", "opus"];
const VIDEO_EXTENSIONS: &[&str] = &["mp4", "m4v", "mov", "webm", "mkv", "avi", "3gp", "ts"];

impl MediaKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MediaKind::Video => "video",
            MediaKind::Audio => "audio",
        }
    }

    /// Name of the subdirectory under the media root holding this kind.
    pub fn directory_name(&self) -> &'static str {
        match self {
            MediaKind::Video => "videos",
            MediaKind::Audio => "audios",
        }
    }

    /// Extension used when neither the server nor the URL names one.
    pub fn default_extension(&self) -> &'static str {
        match self {
            MediaKind::Video => "mp4",
            MediaKind::Audio => "m4a",
        }
    }

    /// Guess the kind from a file extension (case-insensitive).
    pub fn from_extension(ext: &str) -> Option<Self> {
        let ext = ext.trim_start_matches('.').to_ascii_lowercase();
        if AUDIO_EXTENSIONS.contains(&ext.as_str()) {
            Some(MediaKind::Audio)
        } else if VIDEO_EXTENSIONS.contains(&ext.as_str()) {
            Some(MediaKind::Video)
        } else {
            None
        }
    }
}

impl fmt::Display for MediaKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MediaKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "video" => Ok(MediaKind::Video),
            "audio" => Ok(MediaKind::Audio),
            other => Err(format!("Unknown media kind: {}", other)),
        }
    }
}

// =============================================================================
// Domain Models
// =============================================================================

/// Persisted record for one media asset, in progress or finished.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DownloadItem {
    /// Unique identifier, immutable for the item's lifetime
    pub id: ItemId,
    /// Display title
    pub title: String,
    /// Remote location the bytes come from
    pub source_url: String,
    /// Optional thumbnail location
    pub thumb_url: Option<String>,
    /// Path relative to the media root; set only once completed
    pub local_path: Option<String>,
    pub status: DownloadStatus,
    /// Fraction in `0.0..=1.0`
    pub progress: f64,
    /// Size in bytes of the placed file
    pub file_size: u64,
    /// Creation time, Unix epoch milliseconds
    pub created_at: i64,
    pub error_message: Option<String>,
    pub media_kind: MediaKind,
    pub duration: Option<Duration>,
    /// File extension of the placed file (e.g. "mp4")
    pub format: Option<String>,
}

impl DownloadItem {
    /// Create a queued record with a fresh id.
    pub fn new(
        title: impl Into<String>,
        source_url: impl Into<String>,
        media_kind: MediaKind,
        created_at: i64,
    ) -> Self {
        Self {
            id: ItemId::new(),
            title: title.into(),
            source_url: source_url.into(),
            thumb_url: None,
            local_path: None,
            status: DownloadStatus::Queued,
            progress: 0.0,
            file_size: 0,
            created_at,
            error_message: None,
            media_kind,
            duration: None,
            format: None,
        }
    }

    pub fn with_thumb_url(mut self, thumb_url: Option<String>) -> Self {
        self.thumb_url = thumb_url;
        self
    }

    pub fn with_duration(mut self, duration: Option<Duration>) -> Self {
        self.duration = duration;
        self
    }

    /// Whether the item can join a playlist.
    pub fn is_playable(&self) -> bool {
        self.status == DownloadStatus::Completed
            && self.local_path.as_deref().is_some_and(|p| !p.is_empty())
    }

    /// Validate record data
    pub fn validate(&self) -> Result<(), String> {
        if self.title.trim().is_empty() {
            return Err("Item title cannot be empty".to_string());
        }

        if self.source_url.trim().is_empty() {
            return Err("Item source URL cannot be empty".to_string());
        }

        if !self.progress.is_finite() || !(0.0..=1.0).contains(&self.progress) {
            return Err(format!("Progress {} is out of range", self.progress));
        }

        let completed = self.status == DownloadStatus::Completed;
        match &self.local_path {
            Some(path) if !completed => {
                return Err(format!(
                    "Local path '{}' is only allowed on completed items",
                    path
                ));
            }
            None if completed => {
                return Err("Completed items must have a local path".to_string());
            }
            Some(path) if path.is_empty() || path.starts_with('/') || path.starts_with('\\') => {
                return Err(format!("Local path '{}' must be root-relative", path));
            }
            _ => {}
        }

        if completed && self.progress < 1.0 {
            return Err("Completed items must have full progress".to_string());
        }

        Ok(())
    }
}

// =============================================================================
// Query Types
// =============================================================================

/// Ordering of a query result. Ties are broken by insertion order so the
/// order stays stable across updates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum SortOrder {
    #[default]
    CreatedAtDesc,
    CreatedAtAsc,
    TitleAsc,
}

impl SortOrder {
    pub(crate) fn order_by_clause(&self) -> &'static str {
        match self {
            SortOrder::CreatedAtDesc => "created_at DESC, seq DESC",
            SortOrder::CreatedAtAsc => "created_at ASC, seq ASC",
            SortOrder::TitleAsc => "title COLLATE NOCASE ASC, seq ASC",
        }
    }
}

/// Predicate over items. An empty filter matches everything.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ItemFilter {
    pub kind: Option<MediaKind>,
    pub status: Option<DownloadStatus>,
}

impl ItemFilter {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn kind(kind: MediaKind) -> Self {
        Self {
            kind: Some(kind),
            status: None,
        }
    }

    pub fn with_status(mut self, status: DownloadStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn matches(&self, item: &DownloadItem) -> bool {
        self.kind.is_none_or(|k| k == item.media_kind)
            && self.status.is_none_or(|s| s == item.status)
    }
}
