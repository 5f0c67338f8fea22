//! # Live Queries
//!
//! A [`LiveQuery`] is an order-preserving view over a filtered, sorted slice
//! of the store. The first message is the initial snapshot; every later
//! store write that changes the result set yields one batched
//! [`ChangeSet::Update`].
//!
//! ## Index conventions
//!
//! - `deletions` index the previous result set
//! - `insertions` and `modifications` index the new result set
//!
//! Applying deletions (descending), then insertions (ascending), then
//! modifications turns the previous list into the new one. An item that
//! moved is reported as a deletion plus an insertion. Consumers applying
//! indices to their own positional structures should still bounds-check
//! them, since a consumer can fall behind and resynchronize from
//! [`ChangeSet::items`].

use crate::models::{DownloadItem, ItemFilter, ItemId, SortOrder};
use crate::repositories::DownloadItemRepository;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Discriminant of a [`ChangeSet`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    Initial,
    Update,
    Error,
}

/// Index-level difference between two result sets.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IndexDiff {
    pub deletions: Vec<usize>,
    pub insertions: Vec<usize>,
    pub modifications: Vec<usize>,
}

impl IndexDiff {
    pub fn is_empty(&self) -> bool {
        self.deletions.is_empty() && self.insertions.is_empty() && self.modifications.is_empty()
    }
}

/// One notification delivered to a live query observer.
#[derive(Debug, Clone, PartialEq)]
pub enum ChangeSet {
    /// Snapshot at subscription time.
    Initial { items: Vec<DownloadItem> },
    /// The result set changed.
    Update {
        items: Vec<DownloadItem>,
        diff: IndexDiff,
    },
    /// Re-querying failed; the previous snapshot stays current.
    Error { message: String },
}

impl ChangeSet {
    pub fn kind(&self) -> ChangeKind {
        match self {
            ChangeSet::Initial { .. } => ChangeKind::Initial,
            ChangeSet::Update { .. } => ChangeKind::Update,
            ChangeSet::Error { .. } => ChangeKind::Error,
        }
    }

    /// The result set after this change. Empty for errors.
    pub fn items(&self) -> &[DownloadItem] {
        match self {
            ChangeSet::Initial { items } | ChangeSet::Update { items, .. } => items,
            ChangeSet::Error { .. } => &[],
        }
    }
}

/// Compute the index diff that turns `old` into `new`, matching items by id.
pub fn diff(old: &[DownloadItem], new: &[DownloadItem]) -> IndexDiff {
    let old_positions: HashMap<ItemId, usize> = old
        .iter()
        .enumerate()
        .map(|(index, item)| (item.id, index))
        .collect();
    let new_ids: HashSet<ItemId> = new.iter().map(|item| item.id).collect();

    let mut deletions: Vec<usize> = old
        .iter()
        .enumerate()
        .filter(|(_, item)| !new_ids.contains(&item.id))
        .map(|(index, _)| index)
        .collect();

    let mut insertions = Vec::new();
    let mut modifications = Vec::new();

    // (new index, old index) for ids present on both sides, in new order.
    let mut common = Vec::new();
    for (new_index, item) in new.iter().enumerate() {
        match old_positions.get(&item.id) {
            Some(&old_index) => common.push((new_index, old_index)),
            None => insertions.push(new_index),
        }
    }

    let old_order: Vec<usize> = common.iter().map(|&(_, old_index)| old_index).collect();
    let stable = increasing_subsequence_mask(&old_order);

    for (&(new_index, old_index), keep) in common.iter().zip(stable) {
        if !keep {
            deletions.push(old_index);
            insertions.push(new_index);
        } else if old[old_index] != new[new_index] {
            modifications.push(new_index);
        }
    }

    deletions.sort_unstable();
    insertions.sort_unstable();
    IndexDiff {
        deletions,
        insertions,
        modifications,
    }
}

/// Marks one longest strictly increasing subsequence of `seq`.
fn increasing_subsequence_mask(seq: &[usize]) -> Vec<bool> {
    let mut tails: Vec<usize> = Vec::new();
    let mut previous: Vec<Option<usize>> = vec![None; seq.len()];

    for (i, &value) in seq.iter().enumerate() {
        let pos = tails.partition_point(|&t| seq[t] < value);
        if pos > 0 {
            previous[i] = Some(tails[pos - 1]);
        }
        if pos == tails.len() {
            tails.push(i);
        } else {
            tails[pos] = i;
        }
    }

    let mut mask = vec![false; seq.len()];
    let mut cursor = tails.last().copied();
    while let Some(i) = cursor {
        mask[i] = true;
        cursor = previous[i];
    }
    mask
}

/// Subscription handle for a live query. Dropping it stops the observer.
pub struct LiveQuery {
    receiver: mpsc::UnboundedReceiver<ChangeSet>,
    task: JoinHandle<()>,
}

impl LiveQuery {
    pub(crate) fn spawn(
        repo: Arc<dyn DownloadItemRepository>,
        revisions: watch::Receiver<u64>,
        filter: ItemFilter,
        sort: SortOrder,
    ) -> Self {
        let (sender, receiver) = mpsc::unbounded_channel();
        let task = tokio::spawn(observe_loop(repo, revisions, filter, sort, sender));
        Self { receiver, task }
    }

    /// Wait for the next change. Returns `None` once the store is gone.
    pub async fn next(&mut self) -> Option<ChangeSet> {
        self.receiver.recv().await
    }

    /// Take an already delivered change without waiting.
    pub fn try_next(&mut self) -> Option<ChangeSet> {
        self.receiver.try_recv().ok()
    }
}

impl Drop for LiveQuery {
    fn drop(&mut self) {
        self.task.abort();
    }
}

impl std::fmt::Debug for LiveQuery {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LiveQuery")
            .field("finished", &self.task.is_finished())
            .finish()
    }
}

async fn observe_loop(
    repo: Arc<dyn DownloadItemRepository>,
    mut revisions: watch::Receiver<u64>,
    filter: ItemFilter,
    sort: SortOrder,
    sender: mpsc::UnboundedSender<ChangeSet>,
) {
    let mut current: Option<Vec<DownloadItem>> = None;

    loop {
        // Writes landing while the query runs mark the revision as unseen
        // again, so they trigger another pass.
        let revision = *revisions.borrow_and_update();

        let change = match repo.query(filter, sort).await {
            Ok(items) => match current.replace(items.clone()) {
                None => Some(ChangeSet::Initial { items }),
                Some(previous) => {
                    let diff = diff(&previous, &items);
                    (!diff.is_empty()).then_some(ChangeSet::Update { items, diff })
                }
            },
            Err(e) => {
                warn!(error = %e, revision, "Live query refresh failed");
                Some(ChangeSet::Error {
                    message: e.to_string(),
                })
            }
        };

        if let Some(change) = change {
            debug!(kind = ?change.kind(), revision, "Live query changed");
            if sender.send(change).is_err() {
                return;
            }
        }

        if revisions.changed().await.is_err() {
            debug!("Store dropped; live query finished");
            return;
        }
    }
}
