//! Working directory management.

use crate::{CacheError, Result};
use permagit_types::SnapshotId;
use std::fs::OpenOptions;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

/// File name suffix of dirty markers.
pub const DIRTY_SUFFIX: &str = ".dirty";

/// Outcome of a best-effort prune.
#[derive(Debug, Default)]
pub struct PruneReport {
    /// Names of removed directories and markers.
    pub removed: Vec<String>,
    /// Names that could not be removed, with the reason.
    pub failed: Vec<(String, std::io::Error)>,
}

/// Snapshot-keyed cache rooted at one remote's working directory.
#[derive(Debug, Clone)]
pub struct CacheStore {
    root: PathBuf,
}

impl CacheStore {
    /// Creates the working directory if needed and opens a store over it.
    ///
    /// Failure here is fatal for the caller: nothing downstream can run
    /// without a working directory.
    pub fn ensure_working_directory(path: impl Into<PathBuf>) -> Result<Self> {
        let root = path.into();
        if let Err(e) = std::fs::create_dir_all(&root) {
            return Err(CacheError::WorkingDirectory {
                path: root,
                reason: e.to_string(),
            });
        }
        if !root.is_dir() {
            return Err(CacheError::WorkingDirectory {
                path: root,
                reason: "not a directory".to_string(),
            });
        }
        Ok(Self { root })
    }

    /// Returns the working directory.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Returns the directory of the bare repository for `snapshot`.
    pub fn entry_path(&self, snapshot: &SnapshotId) -> PathBuf {
        self.root.join(snapshot.as_str())
    }

    /// Returns the dirty marker path for `snapshot`.
    pub fn marker_path(&self, snapshot: &SnapshotId) -> PathBuf {
        self.root.join(format!("{snapshot}{DIRTY_SUFFIX}"))
    }

    /// Returns true if a directory exists for `snapshot`, trusted or not.
    pub fn has_entry(&self, snapshot: &SnapshotId) -> bool {
        self.entry_path(snapshot).is_dir()
    }

    /// Returns true if the dirty marker for `snapshot` is present.
    pub fn is_dirty(&self, snapshot: &SnapshotId) -> bool {
        self.marker_path(snapshot).exists()
    }

    /// Returns true if the entry for `snapshot` exists and is not dirty.
    pub fn is_fresh(&self, snapshot: &SnapshotId) -> bool {
        self.has_entry(snapshot) && !self.is_dirty(snapshot)
    }

    /// Marks `snapshot` as untrustworthy.
    ///
    /// The marker and its directory entry are synced before returning, so
    /// another process observes it before any upload starts. Idempotent.
    pub fn mark_dirty(&self, snapshot: &SnapshotId) -> Result<()> {
        let path = self.marker_path(snapshot);
        let mut file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(&path)
            .map_err(|e| CacheError::io(&path, e))?;
        writeln!(file, "{}", std::process::id()).map_err(|e| CacheError::io(&path, e))?;
        file.sync_all().map_err(|e| CacheError::io(&path, e))?;
        self.sync_root();

        tracing::debug!(snapshot = %snapshot, "Marked cache entry dirty");
        Ok(())
    }

    /// Removes the dirty marker for `snapshot`. Idempotent.
    pub fn clear_dirty(&self, snapshot: &SnapshotId) -> Result<()> {
        let path = self.marker_path(snapshot);
        match std::fs::remove_file(&path) {
            Ok(()) => {
                self.sync_root();
                tracing::debug!(snapshot = %snapshot, "Cleared dirty marker");
                Ok(())
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(CacheError::io(path, e)),
        }
    }

    /// Removes the entry directory for `snapshot`, keeping its marker.
    pub fn remove_entry(&self, snapshot: &SnapshotId) -> Result<()> {
        let path = self.entry_path(snapshot);
        match std::fs::remove_dir_all(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(CacheError::io(path, e)),
        }
    }

    /// Removes every top-level directory not named in `keep`, and every
    /// dirty marker whose snapshot is not in `keep`.
    ///
    /// Best-effort: failures are logged and reported, never returned.
    pub fn prune(&self, keep: &[&str]) -> PruneReport {
        let mut report = PruneReport::default();

        let entries = match std::fs::read_dir(&self.root) {
            Ok(entries) => entries,
            Err(e) => {
                tracing::warn!(root = %self.root.display(), error = %e, "Failed to list working directory");
                report.failed.push((self.root.display().to_string(), e));
                return report;
            }
        };

        for entry in entries.flatten() {
            let name = entry.file_name().to_string_lossy().into_owned();
            let Ok(file_type) = entry.file_type() else {
                continue;
            };

            let result = if file_type.is_dir() {
                if keep.contains(&name.as_str()) {
                    continue;
                }
                std::fs::remove_dir_all(entry.path())
            } else if let Some(snapshot) = name.strip_suffix(DIRTY_SUFFIX) {
                if keep.contains(&snapshot) {
                    continue;
                }
                std::fs::remove_file(entry.path())
            } else {
                continue;
            };

            match result {
                Ok(()) => report.removed.push(name),
                Err(e) if e.kind() == ErrorKind::NotFound => {}
                Err(e) => {
                    tracing::warn!(name = %name, error = %e, "Failed to prune cache entry");
                    report.failed.push((name, e));
                }
            }
        }

        if !report.removed.is_empty() {
            tracing::debug!(removed = ?report.removed, "Pruned working directory");
        }
        report
    }

    #[cfg(unix)]
    fn sync_root(&self) {
        if let Err(e) = std::fs::File::open(&self.root).and_then(|dir| dir.sync_all()) {
            tracing::debug!(error = %e, "Failed to sync working directory");
        }
    }

    #[cfg(not(unix))]
    fn sync_root(&self) {}
}
