//! # Playlist Reconciler
//!
//! Keeps the playback session's playlist in step with the item store.
//! While attached, every store change that touches completed items of the
//! observed kind rebuilds the playlist and resolves the current entry
//! against it with [`reconcile`].
//!
//! Current-entry identity is the store item id, falling back to the source
//! URL for sources played outside the playlist. Pending start-at requests
//! match by URL.

use crate::playlist::{position_of_item, position_of_url, PlaylistEntry};
use crate::session::PlaybackSession;
use core_library::{
    ChangeSet, DownloadStatus, FilePlacement, ItemFilter, ItemId, ItemStore, LiveQuery, MediaKind,
    SortOrder,
};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// What the session was playing (or waiting to play) before a store change.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PlaybackAnchor {
    pub item_id: Option<ItemId>,
    /// URL loaded in the engine, if playback has begun
    pub url: Option<String>,
    pub index: Option<usize>,
    /// URL to start at once it appears in the playlist
    pub pending_start_url: Option<String>,
}

/// Outcome of reconciling an anchor against a rebuilt playlist.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reconciliation {
    /// The pending start-at URL appeared; play this index.
    StartAt(usize),
    /// The current item is still present at this index; refresh metadata
    /// only.
    Keep(usize),
    /// The current item went away; play this (clamped) index.
    PlayAt(usize),
    /// The playlist is empty; clear the engine.
    Clear,
    /// Playback has not begun; nothing to play.
    Idle,
}

/// Resolve `anchor` against `entries`.
///
/// Never fails: indices are always clamped into range.
pub fn reconcile(anchor: &PlaybackAnchor, entries: &[PlaylistEntry]) -> Reconciliation {
    if let Some(index) = anchor
        .pending_start_url
        .as_deref()
        .and_then(|url| position_of_url(entries, url))
    {
        return Reconciliation::StartAt(index);
    }

    let Some(url) = anchor.url.as_deref() else {
        return Reconciliation::Idle;
    };

    let still_present = anchor
        .item_id
        .and_then(|id| position_of_item(entries, id))
        .or_else(|| position_of_url(entries, url));
    if let Some(index) = still_present {
        return Reconciliation::Keep(index);
    }

    if entries.is_empty() {
        return Reconciliation::Clear;
    }
    let index = anchor.index.unwrap_or(0).min(entries.len() - 1);
    Reconciliation::PlayAt(index)
}

/// Which items feed the playlist, and in what order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PlaylistSource {
    /// `None` plays every kind.
    pub kind: Option<MediaKind>,
    pub sort: SortOrder,
}

impl PlaylistSource {
    pub fn kind(kind: MediaKind) -> Self {
        Self {
            kind: Some(kind),
            sort: SortOrder::default(),
        }
    }

    pub fn sorted(mut self, sort: SortOrder) -> Self {
        self.sort = sort;
        self
    }

    fn filter(&self) -> ItemFilter {
        ItemFilter {
            kind: self.kind,
            status: Some(DownloadStatus::Completed),
        }
    }
}

/// Store subscription feeding a [`PlaybackSession`].
///
/// The subscription is released when the reconciler is dropped or
/// [`detach`](Self::detach)ed.
pub struct PlaylistReconciler {
    task: JoinHandle<()>,
}

impl PlaylistReconciler {
    /// Start observing `store` on behalf of `session`.
    ///
    /// Must be called within a Tokio runtime. The initial snapshot is
    /// applied as soon as the observer runs.
    pub fn attach(store: &ItemStore, session: Arc<PlaybackSession>, source: PlaylistSource) -> Self {
        let query = store.observe(source.filter(), source.sort);
        let placement = store.placement().clone();
        info!(kind = ?source.kind, "Playlist reconciler attached");

        Self {
            task: tokio::spawn(follow_store(query, placement, session)),
        }
    }

    pub fn is_attached(&self) -> bool {
        !self.task.is_finished()
    }

    pub fn detach(self) {}
}

impl Drop for PlaylistReconciler {
    fn drop(&mut self) {
        self.task.abort();
        debug!("Playlist reconciler detached");
    }
}

async fn follow_store(mut query: LiveQuery, placement: FilePlacement, session: Arc<PlaybackSession>) {
    while let Some(change) = query.next().await {
        if let ChangeSet::Error { message } = &change {
            warn!(error = %message, "Playlist source query failed; keeping current playlist");
            continue;
        }

        let entries: Vec<PlaylistEntry> = change
            .items()
            .iter()
            .filter_map(|item| {
                let entry = PlaylistEntry::from_item(item, &placement);
                if entry.is_none() {
                    warn!(item_id = %item.id, "Completed item has no playable location");
                }
                entry
            })
            .collect();

        session.apply_playlist(entries);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(id: ItemId, url: &str) -> PlaylistEntry {
        PlaylistEntry::new(id, "title", url, MediaKind::Video)
    }

    fn playing(id: ItemId, url: &str, index: usize) -> PlaybackAnchor {
        PlaybackAnchor {
            item_id: Some(id),
            url: Some(url.to_string()),
            index: Some(index),
            pending_start_url: None,
        }
    }

    #[test]
    fn test_keeps_current_item_when_it_moves() {
        let (a, b, c) = (ItemId::new(), ItemId::new(), ItemId::new());
        let entries = vec![entry(c, "file:///c"), entry(a, "file:///a"), entry(b, "file:///b")];

        assert_eq!(
            reconcile(&playing(a, "file:///a", 0), &entries),
            Reconciliation::Keep(1)
        );
    }

    #[test]
    fn test_falls_back_to_url_for_untracked_sources() {
        let a = ItemId::new();
        let anchor = PlaybackAnchor {
            url: Some("file:///a".to_string()),
            ..Default::default()
        };
        assert_eq!(
            reconcile(&anchor, &[entry(a, "file:///a")]),
            Reconciliation::Keep(0)
        );
    }

    #[test]
    fn test_clamps_when_current_item_deleted() {
        let (a, b, c) = (ItemId::new(), ItemId::new(), ItemId::new());

        // Middle entry deleted: its successor slides into the same index.
        let entries = vec![entry(a, "file:///a"), entry(c, "file:///c")];
        assert_eq!(
            reconcile(&playing(b, "file:///b", 1), &entries),
            Reconciliation::PlayAt(1)
        );

        // Last entry deleted: clamp to the new last index.
        let entries = vec![entry(a, "file:///a")];
        assert_eq!(
            reconcile(&playing(c, "file:///c", 2), &entries),
            Reconciliation::PlayAt(0)
        );
    }

    #[test]
    fn test_clears_when_playlist_empties() {
        let a = ItemId::new();
        assert_eq!(reconcile(&playing(a, "file:///a", 0), &[]), Reconciliation::Clear);
    }

    #[test]
    fn test_pending_start_has_priority() {
        let (a, b) = (ItemId::new(), ItemId::new());
        let entries = vec![entry(a, "file:///a"), entry(b, "file:///b")];
        let anchor = PlaybackAnchor {
            pending_start_url: Some("file:///b".to_string()),
            ..playing(a, "file:///a", 0)
        };

        assert_eq!(reconcile(&anchor, &entries), Reconciliation::StartAt(1));
    }

    #[test]
    fn test_pending_start_not_yet_available_stays_idle() {
        let a = ItemId::new();
        let anchor = PlaybackAnchor {
            pending_start_url: Some("file:///later".to_string()),
            ..Default::default()
        };
        assert_eq!(
            reconcile(&anchor, &[entry(a, "file:///a")]),
            Reconciliation::Idle
        );
    }

    #[test]
    fn test_duplicate_urls_take_first_match() {
        let (a, b) = (ItemId::new(), ItemId::new());
        let entries = vec![entry(a, "file:///same"), entry(b, "file:///same")];
        let anchor = PlaybackAnchor {
            pending_start_url: Some("file:///same".to_string()),
            ..Default::default()
        };
        assert_eq!(reconcile(&anchor, &entries), Reconciliation::StartAt(0));
    }
}
