//! Playlist entries and navigation.

use core_library::{DownloadItem, FilePlacement, ItemId, MediaKind};
use rand::Rng;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;
use url::Url;

/// One playable file, derived from a completed [`DownloadItem`].
///
/// Never persisted; rebuilt from the store on every change.
#[derive(Debug, Clone, PartialEq)]
pub struct PlaylistEntry {
    pub item_id: ItemId,
    pub title: String,
    /// Absolute `file://` URL of the asset under the current media root
    pub url: String,
    pub media_kind: MediaKind,
    pub duration: Option<Duration>,
}

impl PlaylistEntry {
    pub fn new(item_id: ItemId, title: impl Into<String>, url: impl Into<String>, kind: MediaKind) -> Self {
        Self {
            item_id,
            title: title.into(),
            url: url.into(),
            media_kind: kind,
            duration: None,
        }
    }

    pub fn with_duration(mut self, duration: Option<Duration>) -> Self {
        self.duration = duration;
        self
    }

    /// Build an entry for a completed item, resolving its stored relative
    /// path under `placement`'s root.
    ///
    /// Returns `None` for items that are not playable or whose path does not
    /// resolve to a valid file URL.
    pub fn from_item(item: &DownloadItem, placement: &FilePlacement) -> Option<Self> {
        if !item.is_playable() {
            return None;
        }
        let relative = item.local_path.as_deref()?;
        let absolute = placement.resolve(relative).ok()?;
        let url = Url::from_file_path(&absolute).ok()?;

        Some(
            Self::new(item.id, item.title.clone(), url.to_string(), item.media_kind)
                .with_duration(item.duration),
        )
    }

    pub fn has_video(&self) -> bool {
        self.media_kind == MediaKind::Video
    }
}

/// What happens at the playlist boundaries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Hash)]
pub enum LoopMode {
    /// Stop at the first / last entry.
    #[default]
    Off,
    /// Restart the current entry.
    One,
    /// Wrap around.
    All,
}

impl LoopMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            LoopMode::Off => "off",
            LoopMode::One => "one",
            LoopMode::All => "all",
        }
    }

    /// Off → All → One → Off, the order a repeat button cycles through.
    pub fn cycled(self) -> Self {
        match self {
            LoopMode::Off => LoopMode::All,
            LoopMode::All => LoopMode::One,
            LoopMode::One => LoopMode::Off,
        }
    }
}

impl fmt::Display for LoopMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LoopMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "off" => Ok(LoopMode::Off),
            "one" => Ok(LoopMode::One),
            "all" => Ok(LoopMode::All),
            _ => Err(format!("Invalid loop mode: {}", s)),
        }
    }
}

/// Navigation direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Forward,
    Backward,
}

/// Index to move to from `current` in a playlist of `len` entries.
///
/// `LoopMode::One` restarts the current entry and takes precedence over
/// shuffle. Shuffle picks any index in range, repeats allowed. Otherwise
/// `Off` stops at the boundary (`None`) and `All` wraps.
pub fn step_index<R: Rng + ?Sized>(
    current: Option<usize>,
    len: usize,
    direction: Direction,
    loop_mode: LoopMode,
    shuffle: bool,
    rng: &mut R,
) -> Option<usize> {
    if len == 0 {
        return None;
    }
    let Some(current) = current.filter(|i| *i < len) else {
        return Some(0);
    };

    if loop_mode == LoopMode::One {
        return Some(current);
    }
    if shuffle {
        return Some(rng.gen_range(0..len));
    }

    match (direction, loop_mode) {
        (Direction::Forward, _) if current + 1 < len => Some(current + 1),
        (Direction::Forward, LoopMode::All) => Some(0),
        (Direction::Backward, _) if current > 0 => Some(current - 1),
        (Direction::Backward, LoopMode::All) => Some(len - 1),
        _ => None,
    }
}

/// Position of the first entry playing `url`. Duplicates resolve to the
/// first match.
pub fn position_of_url(entries: &[PlaylistEntry], url: &str) -> Option<usize> {
    entries.iter().position(|entry| entry.url == url)
}

pub fn position_of_item(entries: &[PlaylistEntry], item_id: ItemId) -> Option<usize> {
    entries.iter().position(|entry| entry.item_id == item_id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn step(current: usize, len: usize, direction: Direction, mode: LoopMode) -> Option<usize> {
        let mut rng = StdRng::seed_from_u64(7);
        step_index(Some(current), len, direction, mode, false, &mut rng)
    }

    #[test]
    fn test_loop_all_wraps_forward() {
        let mut index = 2;
        let mut visited = Vec::new();
        for _ in 0..3 {
            index = step(index, 5, Direction::Forward, LoopMode::All).unwrap();
            visited.push(index);
        }
        assert_eq!(visited, vec![3, 4, 0]);
        assert_eq!(step(0, 5, Direction::Backward, LoopMode::All), Some(4));
    }

    #[test]
    fn test_loop_off_stops_at_boundaries() {
        assert_eq!(step(4, 5, Direction::Forward, LoopMode::Off), None);
        assert_eq!(step(0, 5, Direction::Backward, LoopMode::Off), None);
        assert_eq!(step(1, 5, Direction::Backward, LoopMode::Off), Some(0));
    }

    #[test]
    fn test_loop_one_restarts() {
        assert_eq!(step(3, 5, Direction::Forward, LoopMode::One), Some(3));
        assert_eq!(step(3, 5, Direction::Backward, LoopMode::One), Some(3));
    }

    #[test]
    fn test_shuffle_stays_in_range() {
        let mut rng = StdRng::seed_from_u64(42);
        for _ in 0..200 {
            let next = step_index(Some(1), 3, Direction::Forward, LoopMode::Off, true, &mut rng);
            assert!(next.is_some_and(|i| i < 3));
        }
    }

    #[test]
    fn test_empty_and_unset() {
        let mut rng = StdRng::seed_from_u64(1);
        assert_eq!(step_index(None, 0, Direction::Forward, LoopMode::All, false, &mut rng), None);
        assert_eq!(step_index(None, 3, Direction::Backward, LoopMode::Off, false, &mut rng), Some(0));
        // Stale index past the end restarts from the top.
        assert_eq!(step_index(Some(9), 3, Direction::Forward, LoopMode::Off, false, &mut rng), Some(0));
    }

    #[test]
    fn test_duplicate_urls_take_first_match() {
        let a = ItemId::new();
        let b = ItemId::new();
        let entries = vec![
            PlaylistEntry::new(a, "A", "file:///m/videos/a.mp4", MediaKind::Video),
            PlaylistEntry::new(b, "B", "file:///m/videos/a.mp4", MediaKind::Video),
        ];
        assert_eq!(position_of_url(&entries, "file:///m/videos/a.mp4"), Some(0));
        assert_eq!(position_of_item(&entries, b), Some(1));
        assert_eq!(position_of_url(&entries, "file:///m/videos/missing.mp4"), None);
    }

    #[test]
    fn test_loop_mode_cycle_and_parse() {
        assert_eq!(LoopMode::Off.cycled(), LoopMode::All);
        assert_eq!(LoopMode::All.cycled().cycled(), LoopMode::Off);
        assert_eq!("one".parse::<LoopMode>().unwrap(), LoopMode::One);
        assert!("sometimes".parse::<LoopMode>().is_err());
    }
}
