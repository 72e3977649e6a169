//! The control-loop aggregate.
//!
//! `App` owns the Watcher's slab, the DirCache, the Scheduler table, and the
//! Dispatcher, and runs a single-threaded, cooperative event loop. No locks:
//! every subsystem is reentered only from this loop, on one thread.

use std::path::{Path, PathBuf};
use std::sync::mpsc::RecvTimeoutError;
use std::sync::Arc;
use std::time::Duration;

use notify::event::{EventKind, ModifyKind};
use tracing::{debug, error, warn};

use crate::clock::{Clock, SystemClock};
use crate::dircache::DirCache;
use crate::dispatcher::Dispatcher;
use crate::error::Result;
use crate::path_queue::PathQueue;
use crate::scheduler::Scheduler;
use crate::types::SectionId;
use crate::watcher::{ControlEvent, ControlHandle, WatchMessage, Watcher};

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub debounce: Duration,
    pub pending_table_capacity: usize,
    pub max_watches: usize,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            debounce: Duration::from_secs(1),
            pending_table_capacity: 4096,
            max_watches: 8192,
        }
    }
}

#[derive(Debug)]
pub struct App {
    watcher: Watcher,
    dircache: DirCache,
    scheduler: Scheduler,
    dispatcher: Box<dyn Dispatcher>,
    running: bool,
}

impl App {
    pub fn new(config: AppConfig, dispatcher: Box<dyn Dispatcher>) -> Result<(Self, ControlHandle)> {
        Self::with_clock(config, dispatcher, Arc::new(SystemClock))
    }

    pub fn with_clock(
        config: AppConfig,
        dispatcher: Box<dyn Dispatcher>,
        clock: Arc<dyn Clock>,
    ) -> Result<(Self, ControlHandle)> {
        let (watcher, control) = Watcher::new(config.max_watches)?;
        let scheduler = Scheduler::new(config.debounce, config.pending_table_capacity, clock);

        Ok((
            Self {
                watcher,
                dircache: DirCache::new(),
                scheduler,
                dispatcher,
                running: true,
            },
            control,
        ))
    }

    /// Registers a library root for watching, seeding the DirCache so the
    /// first real event diffs against a known baseline rather than treating
    /// every existing child as newly "added".
    pub fn register_root(&mut self, path: &Path, section_id: SectionId) -> Result<()> {
        self.watcher.add(path, section_id)?;
        self.dircache.refresh(path)?;

        let mut queue = PathQueue::new();
        if let Some(subdirs) = self.dircache.subdirs(path) {
            for child in subdirs.clone() {
                let _ = queue.enqueue(child);
            }
        }
        while let Some(dir) = queue.dequeue() {
            if self.watcher.add(&dir, section_id).is_ok() {
                if let Ok(delta) = self.dircache.refresh(&dir) {
                    for child in delta.added {
                        let _ = queue.enqueue(child);
                    }
                }
            }
        }

        Ok(())
    }

    pub fn watch_count(&self) -> usize {
        self.watcher.active_count()
    }

    pub fn is_watched(&self, path: &Path) -> bool {
        self.watcher.index_for_path(path).is_some()
    }

    /// The live `(slot, generation)` identity watching `path`, if any. A
    /// changed generation across two calls for the same path means the old
    /// watch was torn down and replaced, not merely that it still exists.
    pub fn watch_index(&self, path: &Path) -> Option<crate::watcher::WatchIndex> {
        self.watcher.index_for_path(path)
    }

    /// Dispatches whatever is currently due without waiting for the event
    /// loop to cycle. Exposed so callers driving `process_dir_event`
    /// directly can also control when the debounce window is checked.
    pub fn drain_pending(&mut self) {
        self.scheduler.drain_due(self.dispatcher.as_ref());
    }

    /// Updates the debounce window applied to future enqueues (SIGHUP
    /// reload). Entries already pending keep their existing deadline.
    pub fn set_debounce(&mut self, debounce: Duration) {
        self.scheduler.set_debounce(debounce);
    }

    /// Applies a reloaded auth token to the dispatcher (SIGHUP reload).
    pub fn set_dispatcher_token(&self, token: Option<&str>) {
        self.dispatcher.set_token(token);
    }

    /// Runs the event loop until an exit control event is observed: block
    /// on the event source for at most `next_deadline`, react, then drain
    /// due scans. `on_reload` is invoked for every `SIGHUP`-driven reload
    /// request; it is the caller's job to re-read config and apply whatever
    /// changed via `set_debounce`/`set_dispatcher_token` (§6/B.5: `plex_url`
    /// itself is never rebuilt mid-flight).
    pub fn run(&mut self) -> Result<()> {
        self.run_with_reload(|_app| {})
    }

    pub fn run_with_reload(&mut self, mut on_reload: impl FnMut(&mut Self)) -> Result<()> {
        while self.running {
            let wait = self.scheduler.next_deadline();

            let message = match wait {
                Some(deadline) => {
                    let now = std::time::Instant::now();
                    let timeout = deadline.saturating_duration_since(now);
                    self.watcher.receiver().recv_timeout(timeout)
                }
                None => self
                    .watcher
                    .receiver()
                    .recv()
                    .map_err(|_| RecvTimeoutError::Disconnected),
            };

            match message {
                Ok(WatchMessage::Control(ControlEvent::Exit)) => {
                    self.running = false;
                }
                Ok(WatchMessage::Control(ControlEvent::Reload)) => {
                    debug!("reload requested, applying updated config");
                    on_reload(self);
                }
                Ok(WatchMessage::Error(err)) => {
                    warn!(error = %err, "watcher reported an error");
                }
                Ok(WatchMessage::Vnode(event)) => {
                    if let Err(err) = self.handle_vnode(event) {
                        error!(error = %err, "failed to process filesystem event");
                    }
                }
                Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => {
                    self.running = false;
                }
            }

            self.scheduler.drain_due(self.dispatcher.as_ref());
        }

        // Final best-effort drain so a scan that matured exactly as we were
        // shutting down still fires.
        self.scheduler.drain_due(self.dispatcher.as_ref());
        Ok(())
    }

    pub fn request_exit(&mut self) {
        self.running = false;
    }

    fn handle_vnode(&mut self, event: notify::Event) -> Result<()> {
        for path in affected_watch_dirs(&self.watcher, &event) {
            let Some(section_id) = self.watcher.section_for_path(&path) else {
                continue;
            };
            self.process_dir_event(&path, section_id)?;
        }
        Ok(())
    }

    /// Reconciles one watched directory against disk and enqueues a scan
    /// for it.
    pub fn process_dir_event(&mut self, path: &Path, section_id: SectionId) -> Result<()> {
        if !path.is_dir() {
            self.scheduler.enqueue(path.to_path_buf(), section_id);
            return Ok(());
        }

        match self.dircache.refresh(path) {
            Ok(delta) => {
                if delta.changed {
                    for removed in &delta.removed {
                        if let Err(err) = self.watcher.remove_path(removed) {
                            warn!(path = %removed.display(), error = %err, "failed to remove stale watch");
                        }
                    }
                    for added in &delta.added {
                        if let Err(err) = self.watcher.add(added, section_id) {
                            warn!(path = %added.display(), error = %err, "failed to register new watch");
                        }
                    }
                }
                // DirCache diffs children by path, so an atomic
                // `rm -rf X && mkdir X` leaves X in the parent's subdir set
                // with no add/remove delta (§8 scenario E). Re-stat every
                // surviving child and let `Watcher::add`'s own
                // (device, inode) check re-register it under a fresh slot.
                self.reconcile_watch_identity(path, section_id);
            }
            Err(err) => {
                warn!(path = %path.display(), error = %err, "DirCache refresh failed, falling back to targeted BFS");
                self.targeted_bfs_refresh(path, section_id);
            }
        }

        self.scheduler.enqueue(path.to_path_buf(), section_id);
        Ok(())
    }

    /// Re-stats every child DirCache currently believes is still under
    /// `path` and re-registers any whose identity no longer matches its
    /// watched slot. `Watcher::add` is idempotent when identity is
    /// unchanged, so this is a no-op for every child that wasn't replaced.
    fn reconcile_watch_identity(&mut self, path: &Path, section_id: SectionId) {
        let Some(children) = self.dircache.subdirs(path) else {
            return;
        };
        let children: Vec<PathBuf> = children.iter().cloned().collect();

        for child in children {
            if self.watcher.index_for_path(&child).is_none() {
                continue;
            }
            if let Err(err) = self.watcher.add(&child, section_id) {
                warn!(path = %child.display(), error = %err, "failed to re-register watch after identity check");
            }
        }
    }

    /// Fallback when `DirCache::refresh` itself fails: walk the subtree and
    /// re-register any subdirectory that isn't already watched.
    fn targeted_bfs_refresh(&mut self, root: &Path, section_id: SectionId) {
        let mut queue = PathQueue::new();
        if queue.enqueue(root.to_path_buf()).is_err() {
            warn!(path = %root.display(), "targeted BFS aborted: queue allocation failed");
            return;
        }

        while let Some(dir) = queue.dequeue() {
            if self.watcher.index_for_path(&dir).is_none()
                && self.watcher.add(&dir, section_id).is_err()
            {
                continue;
            }
            match self.dircache.refresh(&dir) {
                Ok(delta) => {
                    for child in delta.added {
                        if queue.enqueue(child).is_err() {
                            queue.drain();
                            warn!(path = %dir.display(), "targeted BFS aborted: queue allocation failed");
                            return;
                        }
                    }
                }
                Err(_) => continue,
            }
        }
    }
}

/// Maps a raw notify event to the set of watched directories it pertains to.
/// notify reports the changed child's path for directory-content events, so
/// we resolve each event path to either itself (if it IS a watched
/// directory) or its parent (if the parent is watched).
fn affected_watch_dirs(watcher: &Watcher, event: &notify::Event) -> Vec<PathBuf> {
    if !is_relevant_kind(&event.kind) {
        return Vec::new();
    }

    let mut dirs = Vec::new();
    for p in &event.paths {
        if watcher.index_for_path(p).is_some() {
            if !dirs.contains(p) {
                dirs.push(p.clone());
            }
            continue;
        }
        if let Some(parent) = p.parent() {
            let parent = parent.to_path_buf();
            if watcher.index_for_path(&parent).is_some() && !dirs.contains(&parent) {
                dirs.push(parent);
            }
        }
    }
    dirs
}

/// The event kinds that should trigger a scan: write, rename, delete,
/// extend. A narrower set than the full notify event vocabulary.
fn is_relevant_kind(kind: &EventKind) -> bool {
    matches!(
        kind,
        EventKind::Create(_)
            | EventKind::Remove(_)
            | EventKind::Modify(ModifyKind::Data(_) | ModifyKind::Name(_))
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatcher::test_support::RecordingDispatcher;
    use std::sync::Arc;
    use tempfile::tempdir;

    fn recording_app(clock: Arc<crate::clock::ManualClock>) -> (App, Arc<RecordingDispatcher>, ControlHandle) {
        let dispatcher = Arc::new(RecordingDispatcher::new(true));
        let forwarding: Box<dyn Dispatcher> = Box::new(ForwardingDispatcher(dispatcher.clone()));
        let (app, control) = App::with_clock(AppConfig::default(), forwarding, clock).unwrap();
        (app, dispatcher, control)
    }

    #[derive(Debug)]
    struct ForwardingDispatcher(Arc<RecordingDispatcher>);
    impl Dispatcher for ForwardingDispatcher {
        fn check_connectivity(&self) -> bool {
            self.0.check_connectivity()
        }
        fn scan(&self, path: &Path, section_id: SectionId) -> bool {
            self.0.scan(path, section_id)
        }
    }

    #[test]
    fn register_root_watches_existing_children() {
        let clock = Arc::new(crate::clock::ManualClock::new());
        let (mut app, _dispatcher, _control) = recording_app(clock);

        let dir = tempdir().unwrap();
        std::fs::create_dir(dir.path().join("Movies")).unwrap();
        std::fs::create_dir(dir.path().join("Movies/A")).unwrap();

        app.register_root(dir.path(), SectionId(1)).unwrap();
        assert_eq!(app.watch_count(), 3);
    }

    #[test]
    fn structural_add_registers_new_watch_and_enqueues_scan() {
        let clock = Arc::new(crate::clock::ManualClock::new());
        let (mut app, dispatcher, _control) = recording_app(clock.clone());

        let dir = tempdir().unwrap();
        app.register_root(dir.path(), SectionId(7)).unwrap();

        std::fs::create_dir(dir.path().join("NewShow")).unwrap();
        app.process_dir_event(dir.path(), SectionId(7)).unwrap();

        assert!(app.watcher.index_for_path(&dir.path().join("NewShow")).is_some());

        clock.advance(Duration::from_secs(2));
        app.drain_pending();
        assert_eq!(dispatcher.calls().len(), 1);
        assert_eq!(dispatcher.calls()[0].0, dir.path());
    }
}
