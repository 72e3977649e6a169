//! End-to-end scenarios against a real temp-directory tree, driven by a
//! manual clock so debounce timing is asserted exactly rather than slept
//! through.

use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use plexscan_core::dispatcher::test_support::RecordingDispatcher;
use plexscan_core::{App, AppConfig, Clock, Dispatcher, ManualClock, SectionId};

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

fn harness() -> (App, Arc<RecordingDispatcher>, Arc<ManualClock>) {
    let clock = Arc::new(ManualClock::new());
    let dispatcher = Arc::new(RecordingDispatcher::new(true));
    let boxed: Box<dyn Dispatcher> = Box::new(ForwardingDispatcher(dispatcher.clone()));
    let (app, _control) = App::with_clock(AppConfig::default(), boxed, clock.clone() as Arc<dyn Clock>)
        .expect("app construction");
    (app, dispatcher, clock)
}

#[test]
fn debounce_coalesces_rapid_writes_into_one_scan() {
    let (mut app, dispatcher, clock) = harness();
    let dir = tempfile::tempdir().unwrap();
    app.register_root(dir.path(), SectionId(1)).unwrap();

    for i in 0..5 {
        fs::write(dir.path().join(format!("f{i}.mkv")), b"x").unwrap();
        app.process_dir_event(dir.path(), SectionId(1)).unwrap();
        clock.advance(Duration::from_millis(200));
    }

    app.drain_pending();
    assert!(
        dispatcher.calls().is_empty(),
        "debounce window should still be open"
    );

    clock.advance(Duration::from_secs(2));
    app.drain_pending();
    assert_eq!(dispatcher.calls().len(), 1);
}

#[test]
fn ancestor_library_scan_absorbs_nested_season_scan() {
    let (mut app, dispatcher, clock) = harness();
    let dir = tempfile::tempdir().unwrap();
    fs::create_dir_all(dir.path().join("Show/Season 1")).unwrap();
    app.register_root(dir.path(), SectionId(2)).unwrap();

    app.process_dir_event(&dir.path().join("Show/Season 1"), SectionId(2))
        .unwrap();
    clock.advance(Duration::from_millis(500));
    app.process_dir_event(dir.path(), SectionId(2)).unwrap();

    clock.advance(Duration::from_secs(2));
    app.drain_pending();
    assert_eq!(dispatcher.calls().len(), 1);
}

#[test]
fn structural_add_extends_watch_coverage_to_new_subdirectory() {
    let (mut app, _dispatcher, _clock) = harness();
    let dir = tempfile::tempdir().unwrap();
    app.register_root(dir.path(), SectionId(3)).unwrap();

    fs::create_dir(dir.path().join("NewSeries")).unwrap();
    app.process_dir_event(dir.path(), SectionId(3)).unwrap();

    assert!(app.is_watched(&dir.path().join("NewSeries")));
}

#[test]
fn delete_and_recreate_reuses_a_fresh_watch_identity() {
    let (mut app, _dispatcher, _clock) = harness();
    let dir = tempfile::tempdir().unwrap();
    fs::create_dir(dir.path().join("Movies")).unwrap();
    app.register_root(dir.path(), SectionId(4)).unwrap();

    fs::remove_dir(dir.path().join("Movies")).unwrap();
    app.process_dir_event(dir.path(), SectionId(4)).unwrap();
    assert!(!app.is_watched(&dir.path().join("Movies")));

    fs::create_dir(dir.path().join("Movies")).unwrap();
    app.process_dir_event(dir.path(), SectionId(4)).unwrap();
    assert!(app.is_watched(&dir.path().join("Movies")));
}

#[test]
fn atomic_delete_and_recreate_is_reconciled_on_a_single_parent_refresh() {
    let (mut app, _dispatcher, _clock) = harness();
    let dir = tempfile::tempdir().unwrap();
    fs::create_dir(dir.path().join("Movies")).unwrap();
    app.register_root(dir.path(), SectionId(4)).unwrap();

    let before = app.watch_index(&dir.path().join("Movies")).unwrap();

    // `rm -rf X && mkdir X` happens atomically from the watcher's point of
    // view: both the removal and the recreation land before any event for
    // the parent is processed, so DirCache's path-keyed diff sees "Movies"
    // in the subdir set both before and after and reports no add/remove.
    fs::remove_dir(dir.path().join("Movies")).unwrap();
    fs::create_dir(dir.path().join("Movies")).unwrap();
    app.process_dir_event(dir.path(), SectionId(4)).unwrap();

    let after = app.watch_index(&dir.path().join("Movies")).unwrap();
    assert!(app.is_watched(&dir.path().join("Movies")));
    assert_ne!(
        before, after,
        "recreated directory must be watched under a fresh identity, not the stale inode's slot"
    );
}

#[cfg(unix)]
#[test]
fn symlinked_subdirectory_is_never_registered() {
    let (mut app, _dispatcher, _clock) = harness();
    let dir = tempfile::tempdir().unwrap();
    let outside = tempfile::tempdir().unwrap();
    std::os::unix::fs::symlink(outside.path(), dir.path().join("link")).unwrap();

    app.register_root(dir.path(), SectionId(5)).unwrap();
    assert!(!app.is_watched(&dir.path().join("link")));
}

#[test]
fn sibling_directories_with_shared_prefix_scan_independently() {
    let (mut app, dispatcher, clock) = harness();
    let dir = tempfile::tempdir().unwrap();
    fs::create_dir(dir.path().join("Movies")).unwrap();
    fs::create_dir(dir.path().join("Movies2")).unwrap();
    app.register_root(dir.path(), SectionId(6)).unwrap();

    app.process_dir_event(&dir.path().join("Movies"), SectionId(6))
        .unwrap();
    app.process_dir_event(&dir.path().join("Movies2"), SectionId(6))
        .unwrap();

    clock.advance(Duration::from_secs(2));
    app.drain_pending();

    assert_eq!(dispatcher.calls().len(), 2);
}
