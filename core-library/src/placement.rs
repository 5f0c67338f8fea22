//! # File Placement
//!
//! Maps finished transfers to stable, collision-free locations under the
//! media root:
//!
//! ```text
//! <media_root>/videos/<unique-name>.<ext>
//! <media_root>/audios/<unique-name>.<ext>
//! ```
//!
//! Stored paths are always relative to the media root so they survive the
//! root moving between launches (container paths change across reinstalls).
//! Name claims go through [`FileSystemAccess::create_new`], so two transfers
//! racing for the same name never receive the same destination.

use crate::error::PlacementError;
use crate::models::MediaKind;
use bridge_traits::storage::FileSystemAccess;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, instrument, warn};

/// Upper bound on numeric suffixes tried before giving up.
pub const MAX_NAME_ATTEMPTS: u32 = 10_000;

const FALLBACK_BASE_NAME: &str = "download";

pub type PlacementResult<T> = std::result::Result<T, PlacementError>;

/// Chooses and resolves on-disk locations for media files.
#[derive(Clone)]
pub struct FilePlacement {
    root: PathBuf,
    fs: Arc<dyn FileSystemAccess>,
}

impl FilePlacement {
    pub fn new(root: impl Into<PathBuf>, fs: Arc<dyn FileSystemAccess>) -> Self {
        Self {
            root: root.into(),
            fs,
        }
    }

    /// Absolute media root.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// The per-kind subdirectory, created on demand.
    pub async fn kind_directory(&self, kind: MediaKind) -> PlacementResult<PathBuf> {
        let dir = self.root.join(kind.directory_name());
        if !self.fs.exists(&dir).await? {
            self.fs.create_dir_all(&dir).await?;
            debug!(kind = %kind, "Created kind directory");
        }
        Ok(dir)
    }

    /// Claim a free file name in `dir`.
    ///
    /// Tries `base.ext`, then `base-1.ext`, `base-2.ext` and so on. The
    /// returned path exists as an empty placeholder owned by the caller, who
    /// either moves the real file over it or removes it.
    #[instrument(skip(self, dir), fields(dir = %display_name(dir)))]
    pub async fn unique_url(&self, dir: &Path, base: &str, ext: &str) -> PlacementResult<PathBuf> {
        let base = match base.trim() {
            "" => FALLBACK_BASE_NAME,
            trimmed => trimmed,
        };
        let ext = ext.trim().trim_start_matches('.');

        for attempt in 0..MAX_NAME_ATTEMPTS {
            let stem = if attempt == 0 {
                base.to_string()
            } else {
                format!("{}-{}", base, attempt)
            };
            let file_name = if ext.is_empty() {
                stem
            } else {
                format!("{}.{}", stem, ext)
            };
            let candidate = dir.join(&file_name);

            if self.fs.create_new(&candidate).await? {
                debug!(file_name = %file_name, attempt, "Claimed destination");
                return Ok(candidate);
            }
        }

        warn!(base = %base, "File names exhausted");
        Err(PlacementError::NameExhausted {
            base: base.to_string(),
            attempts: MAX_NAME_ATTEMPTS,
        })
    }

    /// Claim a destination for `base.ext` inside the kind-directory.
    pub async fn claim(&self, kind: MediaKind, base: &str, ext: &str) -> PlacementResult<PathBuf> {
        let dir = self.kind_directory(kind).await?;
        self.unique_url(&dir, base, ext).await
    }

    /// Size in bytes of the file at `path`.
    pub async fn file_size(&self, path: &Path) -> PlacementResult<u64> {
        Ok(self.fs.metadata(path).await?.size)
    }

    /// Convert an absolute path under the root into its stored form.
    ///
    /// Components are joined with `/` regardless of platform.
    pub fn relative_path(&self, absolute: &Path) -> PlacementResult<String> {
        let relative = absolute
            .strip_prefix(&self.root)
            .map_err(|_| PlacementError::OutsideRoot(absolute.display().to_string()))?;

        let mut parts = Vec::new();
        for component in relative.components() {
            match component {
                Component::Normal(part) => parts.push(part.to_string_lossy().into_owned()),
                _ => return Err(PlacementError::InvalidPath(relative.display().to_string())),
            }
        }
        if parts.is_empty() {
            return Err(PlacementError::InvalidPath(relative.display().to_string()));
        }
        Ok(parts.join("/"))
    }

    /// Map a stored relative path to its current absolute location.
    ///
    /// Absolute paths and parent-directory segments are rejected.
    pub fn resolve(&self, relative: &str) -> PlacementResult<PathBuf> {
        if relative.is_empty()
            || relative.starts_with('/')
            || relative.starts_with('\\')
            || Path::new(relative).is_absolute()
        {
            return Err(PlacementError::InvalidPath(relative.to_string()));
        }

        let mut resolved = self.root.clone();
        for segment in relative.split(['/', '\\']) {
            match segment {
                "" | "." => continue,
                ".." => return Err(PlacementError::InvalidPath(relative.to_string())),
                part => resolved.push(part),
            }
        }
        Ok(resolved)
    }

    /// Remove the file behind a stored path. A missing file is not an error.
    pub async fn remove(&self, relative: &str) -> PlacementResult<()> {
        let path = self.resolve(relative)?;
        self.remove_absolute(&path).await
    }

    /// Remove an absolute file such as an unused placeholder or temp file.
    /// A missing file is not an error.
    pub async fn remove_absolute(&self, path: &Path) -> PlacementResult<()> {
        match self.fs.delete_file(path).await {
            Ok(()) => Ok(()),
            Err(e) if e.is_not_found() => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

impl std::fmt::Debug for FilePlacement {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FilePlacement")
            .field("root", &self.root)
            .finish_non_exhaustive()
    }
}

pub(crate) fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}
