//! Kernel-event-driven directory watcher.
//!
//! Maintains a stable-indexed slab of watched directories and a `path ->
//! index` map for O(1) lookup, translating the notify crate's vnode events
//! into structural/content signals for the rest of the control loop. Each
//! directory is registered non-recursively: recursion into newly discovered
//! subdirectories is the caller's job, driven by `DirCache` deltas, rather
//! than relying on notify's own recursive mode.

use std::collections::HashMap;
use std::fs::File;
use std::os::unix::fs::MetadataExt;
use std::path::{Path, PathBuf};
use std::sync::mpsc;
use std::sync::mpsc::Receiver;

use notify::{Event, RecommendedWatcher, RecursiveMode, Watcher as NotifyWatcher};
use tracing::{debug, warn};

use crate::error::{CoreError, Result};
use crate::types::SectionId;

/// Stable handle to a watched directory. `generation` is bumped every time
/// `slot` is reused, so holding a stale `WatchIndex` across a remove+re-add
/// is always detectable rather than silently aliasing the new occupant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct WatchIndex {
    pub slot: usize,
    pub generation: u32,
}

#[derive(Debug)]
struct WatchSlot {
    path: PathBuf,
    // Held open for the watch's lifetime so the vnode stays addressable even
    // if the directory is replaced out from under the path.
    _handle: File,
    device: u64,
    inode: u64,
    section_id: SectionId,
    generation: u32,
}

/// Signals the event loop reacts to: real filesystem activity, watcher
/// plumbing errors, and the two control-plane wakeups signal handlers are
/// permitted to raise.
#[derive(Debug)]
pub enum WatchMessage {
    Vnode(Event),
    Error(String),
    Control(ControlEvent),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlEvent {
    Exit,
    Reload,
}

/// One per watched directory, produced by reconciling a change against the
/// watch set (see `App::process_dir_event`).
pub struct Watcher {
    slots: Vec<Option<WatchSlot>>,
    free_list: Vec<usize>,
    by_path: HashMap<PathBuf, usize>,
    notify_watcher: RecommendedWatcher,
    rx: Receiver<WatchMessage>,
    max_watches: usize,
}

impl std::fmt::Debug for Watcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Watcher")
            .field("active_watches", &self.by_path.len())
            .field("max_watches", &self.max_watches)
            .finish()
    }
}

/// Sending half of the control-plane channel. Signal handlers (or any other
/// external trigger) hold a clone of this and may only ever call `send` —
/// never touch Watcher/Scheduler/DirCache state directly.
#[derive(Debug, Clone)]
pub struct ControlHandle(mpsc::Sender<WatchMessage>);

impl ControlHandle {
    pub fn raise(&self, event: ControlEvent) {
        let _ = self.0.send(WatchMessage::Control(event));
    }
}

impl Watcher {
    /// Creates a new watcher. `max_watches` is the fd soft ceiling computed
    /// at startup from `min(rlimit / 2, configured maximum)`.
    pub fn new(max_watches: usize) -> Result<(Self, ControlHandle)> {
        let (tx, rx) = mpsc::channel::<WatchMessage>();
        let event_tx = tx.clone();

        let notify_watcher = RecommendedWatcher::new(
            move |res: std::result::Result<Event, notify::Error>| match res {
                Ok(event) => {
                    let _ = event_tx.send(WatchMessage::Vnode(event));
                }
                Err(err) => {
                    let _ = event_tx.send(WatchMessage::Error(err.to_string()));
                }
            },
            notify::Config::default(),
        )?;

        let watcher = Self {
            slots: Vec::new(),
            free_list: Vec::new(),
            by_path: HashMap::new(),
            notify_watcher,
            rx,
            max_watches,
        };

        Ok((watcher, ControlHandle(tx)))
    }

    pub fn receiver(&self) -> &Receiver<WatchMessage> {
        &self.rx
    }

    pub fn active_count(&self) -> usize {
        self.by_path.len()
    }

    pub fn index_for_path(&self, path: &Path) -> Option<WatchIndex> {
        self.by_path.get(path).map(|&slot| WatchIndex {
            slot,
            generation: self.slots[slot]
                .as_ref()
                .expect("by_path only indexes live slots")
                .generation,
        })
    }

    pub fn section_for_path(&self, path: &Path) -> Option<SectionId> {
        self.by_path
            .get(path)
            .and_then(|&slot| self.slots[slot].as_ref())
            .map(|s| s.section_id)
    }

    /// Registers `path` for watching under `section_id`, or returns the
    /// existing index if `path` is already live with matching (device,
    /// inode) identity. A stale identity is replaced in place; any failure
    /// unwinds everything already done for this call.
    pub fn add(&mut self, path: &Path, section_id: SectionId) -> Result<WatchIndex> {
        if path.as_os_str().len() > 1024 {
            return Err(CoreError::PathTooLong(path.to_path_buf()));
        }

        let meta = std::fs::metadata(path).map_err(|e| CoreError::io(path, e))?;
        let (device, inode) = (meta.dev(), meta.ino());

        if let Some(&slot) = self.by_path.get(path) {
            let existing = self.slots[slot]
                .as_ref()
                .expect("by_path only indexes live slots");
            if existing.device == device && existing.inode == inode {
                return Ok(WatchIndex {
                    slot,
                    generation: existing.generation,
                });
            }
            debug!(path = %path.display(), "stale watch identity, re-registering");
            let stale_index = WatchIndex {
                slot,
                generation: existing.generation,
            };
            self.remove(stale_index)?;
        }

        if self.by_path.len() >= self.max_watches {
            return Err(CoreError::FdCeilingReached(self.max_watches));
        }

        let handle = File::open(path).map_err(|e| CoreError::io(path, e))?;

        if let Err(err) = self
            .notify_watcher
            .watch(path, RecursiveMode::NonRecursive)
        {
            return Err(CoreError::EventSource(err));
        }

        let (slot, generation) = match self.free_list.pop() {
            Some(slot) => {
                let generation = self.slots[slot]
                    .as_ref()
                    .map(|s| s.generation)
                    .unwrap_or(0)
                    .wrapping_add(1);
                (slot, generation)
            }
            None => {
                self.slots.push(None);
                (self.slots.len() - 1, 0)
            }
        };

        self.slots[slot] = Some(WatchSlot {
            path: path.to_path_buf(),
            _handle: handle,
            device,
            inode,
            section_id,
            generation,
        });
        self.by_path.insert(path.to_path_buf(), slot);

        Ok(WatchIndex { slot, generation })
    }

    /// Releases the watch at `index`. Idempotent no-op if the index no
    /// longer refers to a live slot (already removed, or generation stale).
    pub fn remove(&mut self, index: WatchIndex) -> Result<()> {
        let Some(slot_entry) = self.slots.get(index.slot) else {
            return Err(CoreError::StaleWatchIndex(index));
        };
        let Some(occupant) = slot_entry else {
            return Ok(());
        };
        if occupant.generation != index.generation {
            return Err(CoreError::StaleWatchIndex(index));
        }

        let path = occupant.path.clone();
        if let Err(err) = self.notify_watcher.unwatch(&path) {
            warn!(path = %path.display(), error = %err, "failed to unwatch path, removing from watch set anyway");
        }

        self.by_path.remove(&path);
        self.slots[index.slot] = None;
        self.free_list.push(index.slot);
        Ok(())
    }

    /// Removes whatever is watched at `path`, if anything. Used by the
    /// structural-delta handler, which only has a path, not an index.
    pub fn remove_path(&mut self, path: &Path) -> Result<()> {
        if let Some(index) = self.index_for_path(path) {
            self.remove(index)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn add_is_idempotent_under_identity_preservation() {
        let dir = tempdir().unwrap();
        let (mut watcher, _ctrl) = Watcher::new(64).unwrap();

        let first = watcher.add(dir.path(), SectionId(1)).unwrap();
        let second = watcher.add(dir.path(), SectionId(1)).unwrap();
        assert_eq!(first, second);
        assert_eq!(watcher.active_count(), 1);
    }

    #[test]
    fn remove_then_add_reuses_slot_index() {
        let dir = tempdir().unwrap();
        let other = tempdir().unwrap();
        let (mut watcher, _ctrl) = Watcher::new(64).unwrap();

        let first = watcher.add(dir.path(), SectionId(1)).unwrap();
        watcher.remove(first).unwrap();
        let second = watcher.add(other.path(), SectionId(2)).unwrap();

        assert_eq!(first.slot, second.slot);
        assert_ne!(first.generation, second.generation);
    }

    #[test]
    fn stale_index_after_reuse_is_rejected() {
        let dir = tempdir().unwrap();
        let other = tempdir().unwrap();
        let (mut watcher, _ctrl) = Watcher::new(64).unwrap();

        let first = watcher.add(dir.path(), SectionId(1)).unwrap();
        watcher.remove(first).unwrap();
        watcher.add(other.path(), SectionId(2)).unwrap();

        assert!(watcher.remove(first).is_err());
    }

    #[test]
    fn fd_ceiling_is_enforced() {
        let dirs: Vec<_> = (0..3).map(|_| tempdir().unwrap()).collect();
        let (mut watcher, _ctrl) = Watcher::new(2).unwrap();

        watcher.add(dirs[0].path(), SectionId(1)).unwrap();
        watcher.add(dirs[1].path(), SectionId(1)).unwrap();
        assert!(watcher.add(dirs[2].path(), SectionId(1)).is_err());
    }
}
