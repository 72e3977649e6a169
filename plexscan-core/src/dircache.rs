//! Per-directory cache of immediate subdirectory sets.
//!
//! `DirCache` answers one question efficiently: has this directory's set of
//! immediate children changed since the last observation? The algorithm is
//! mark/sweep/reap (see `refresh`) so a diff never compares two full sets
//! pairwise.

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use tracing::debug;

use crate::error::{CoreError, Result};

#[derive(Debug, Clone, Default)]
struct CachedDir {
    mtime: Option<SystemTime>,
    subdirs: HashSet<PathBuf>,
    validated: bool,
}

/// Outcome of a single `refresh` call.
#[derive(Debug, Clone, Default)]
pub struct ChangeDelta {
    pub added: Vec<PathBuf>,
    pub removed: Vec<PathBuf>,
    pub changed: bool,
}

impl ChangeDelta {
    fn unchanged() -> Self {
        Self::default()
    }
}

#[derive(Debug, Default)]
pub struct DirCache {
    entries: std::collections::HashMap<PathBuf, CachedDir>,
}

impl DirCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Refreshes the cached subdirectory set for `path` and reports the delta.
    ///
    /// Hot path: if the entry is already `validated` and the directory's
    /// mtime hasn't moved, returns immediately with `changed = false` and
    /// performs no directory read.
    pub fn refresh(&mut self, path: &Path) -> Result<ChangeDelta> {
        let t0 = dir_mtime(path)?;

        if let Some(entry) = self.entries.get(path)
            && entry.validated
            && entry.mtime == Some(t0)
        {
            return Ok(ChangeDelta::unchanged());
        }

        // Read the directory before touching the map: an opendir failure on
        // a path not yet cached must return `fail` without creating a
        // spurious, empty `validated=false` entry (§4.2 failure semantics).
        let read_dir = match fs::read_dir(path) {
            Ok(rd) => rd,
            Err(source) => return Err(CoreError::io(path, source)),
        };

        let entry = self.entries.entry(path.to_path_buf()).or_default();

        // mark: snapshot existing keys into a throwaway set.
        let mut unseen: HashSet<PathBuf> = entry.subdirs.iter().cloned().collect();
        let mut added = Vec::new();
        let mut oom = false;

        // sweep: walk the directory, reconciling against `unseen`.
        for dirent in read_dir.flatten() {
            let child = dirent.path();
            if !is_subdirectory(&dirent) {
                continue;
            }
            if unseen.remove(&child) {
                continue;
            }
            if entry.subdirs.try_reserve(1).is_err() {
                oom = true;
                continue;
            }
            entry.subdirs.insert(child.clone());
            added.push(child);
        }

        // reap: anything left unseen was deleted.
        let removed: Vec<PathBuf> = unseen.into_iter().collect();
        for gone in &removed {
            entry.subdirs.remove(gone);
        }

        let t1 = dir_mtime(path)?;
        let mtime_raced = t1 != t0;
        entry.mtime = Some(t0);
        entry.validated = !oom;

        let changed = !added.is_empty() || !removed.is_empty() || mtime_raced;
        if mtime_raced {
            debug!(path = %path.display(), "directory mtime raced during scan, forcing re-diff next refresh");
        }

        Ok(ChangeDelta {
            added,
            removed,
            changed,
        })
    }

    /// Borrows the cached subdirectory set. The borrow is only valid until
    /// the next mutating call (`refresh`) on `self`.
    pub fn subdirs(&self, path: &Path) -> Option<&HashSet<PathBuf>> {
        self.entries.get(path).map(|e| &e.subdirs)
    }

    pub fn cleanup(&mut self) {
        self.entries.clear();
    }
}

/// Truncates a filesystem mtime to whole seconds, matching the coarse
/// granularity the cached entry is keyed on.
fn dir_mtime(path: &Path) -> Result<SystemTime> {
    let meta = fs::metadata(path).map_err(|e| CoreError::io(path, e))?;
    let mtime = meta.modified().map_err(|e| CoreError::io(path, e))?;
    let secs = mtime
        .duration_since(SystemTime::UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0);
    Ok(SystemTime::UNIX_EPOCH + std::time::Duration::from_secs(secs))
}

/// Classifies a directory entry, skipping symlinks (policy: never followed)
/// and falling back to `stat` when the OS couldn't report a type cheaply.
fn is_subdirectory(dirent: &fs::DirEntry) -> bool {
    match dirent.file_type() {
        Ok(ft) if ft.is_symlink() => false,
        Ok(ft) if ft.is_dir() => true,
        Ok(ft) if ft.is_file() => false,
        _ => fs::metadata(dirent.path())
            .map(|m| m.is_dir())
            .unwrap_or(false),
    }
}
