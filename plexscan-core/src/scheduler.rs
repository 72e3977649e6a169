//! Pending-scan coalescing and dispatch.
//!
//! Holds one entry per path with a live, coalesced scan request and decides
//! when each is ready to hand to the `Dispatcher`, applying the
//! debounce/ancestor-dominance/descendant-collapse rules below.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{debug, warn};

use crate::clock::Clock;
use crate::dispatcher::Dispatcher;
use crate::types::SectionId;

#[derive(Debug, Clone)]
struct PendingScan {
    section_id: SectionId,
    #[allow(dead_code)]
    first_event_time: Instant,
    scheduled_time: Instant,
    pending: bool,
}

#[derive(Debug)]
pub struct Scheduler {
    entries: HashMap<PathBuf, PendingScan>,
    debounce: Duration,
    capacity: usize,
    clock: Arc<dyn Clock>,
}

impl Scheduler {
    pub fn new(debounce: Duration, capacity: usize, clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: HashMap::new(),
            debounce,
            capacity,
            clock,
        }
    }

    /// Updates the debounce window used by future `enqueue` calls. Live
    /// pending entries keep whatever deadline they were already given —
    /// reload only changes the window going forward (§6, SIGHUP semantics).
    pub fn set_debounce(&mut self, debounce: Duration) {
        self.debounce = debounce;
    }

    /// Accepts a scan request for `path`, coalescing it against any live
    /// ancestor/descendant/exact entry.
    pub fn enqueue(&mut self, path: PathBuf, section_id: SectionId) {
        let now = self.clock.now();
        let deadline = now + self.debounce;

        // Rule 4: exact match extends the deadline.
        if let Some(entry) = self.entries.get_mut(&path) {
            entry.scheduled_time = entry.scheduled_time.max(deadline);
            entry.section_id = section_id;
            entry.pending = true;
            return;
        }

        // Rule 2: absorb into a live proper ancestor.
        if let Some(ancestor) = self.find_live_ancestor(&path) {
            let entry = self
                .entries
                .get_mut(&ancestor)
                .expect("find_live_ancestor only returns present keys");
            entry.scheduled_time = entry.scheduled_time.max(deadline);
            debug!(path = %path.display(), absorbed_into = %ancestor.display(), "ancestor dominance");
            return;
        }

        // Rule 3: collapse any live proper descendants into this entry.
        let descendants: Vec<PathBuf> = self
            .entries
            .keys()
            .filter(|candidate| is_proper_ancestor(&path, candidate))
            .cloned()
            .collect();
        for descendant in &descendants {
            self.entries.remove(descendant);
        }
        if !descendants.is_empty() {
            debug!(path = %path.display(), collapsed = descendants.len(), "descendant collapse");
        }

        // Rule 5: evict the earliest-scheduled entry under pressure.
        if self.entries.len() >= self.capacity {
            self.evict_earliest();
        }

        self.entries.insert(
            path,
            PendingScan {
                section_id,
                first_event_time: now,
                scheduled_time: deadline,
                pending: true,
            },
        );
    }

    /// Minimum `scheduled_time` among live pending entries, or `None` if the
    /// table is empty — the event loop waits unboundedly in that case.
    pub fn next_deadline(&self) -> Option<Instant> {
        self.entries
            .values()
            .filter(|e| e.pending)
            .map(|e| e.scheduled_time)
            .min()
    }

    /// Dispatches every entry whose deadline has passed, marks it
    /// not-pending, then compacts. Dispatch failures are logged and
    /// swallowed — no retry queue is maintained.
    pub fn drain_due(&mut self, dispatcher: &dyn Dispatcher) {
        let now = self.clock.now();
        let due: Vec<PathBuf> = self
            .entries
            .iter()
            .filter(|(_, e)| e.pending && e.scheduled_time <= now)
            .map(|(p, _)| p.clone())
            .collect();

        if due.is_empty() {
            return;
        }

        for path in &due {
            let section_id = self.entries[path].section_id;
            if !dispatcher.scan(path, section_id) {
                warn!(path = %path.display(), "dispatch failed, will re-trigger on next event");
            }
            if let Some(entry) = self.entries.get_mut(path) {
                entry.pending = false;
            }
        }

        self.compact();
    }

    fn compact(&mut self) {
        self.entries.retain(|_, e| e.pending);
    }

    fn evict_earliest(&mut self) {
        if let Some(victim) = self
            .entries
            .iter()
            .min_by_key(|(_, e)| e.scheduled_time)
            .map(|(p, _)| p.clone())
        {
            warn!(path = %victim.display(), "pending-scan table at capacity, evicting earliest entry");
            self.entries.remove(&victim);
        }
    }

    fn find_live_ancestor(&self, path: &Path) -> Option<PathBuf> {
        path.ancestors()
            .skip(1)
            .find(|ancestor| self.entries.contains_key(*ancestor))
            .map(|ancestor| ancestor.to_path_buf())
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.entries.len()
    }
}

/// Component-wise proper-ancestor test: `a` is a proper ancestor of `b` iff
/// `b` strictly extends `a` by whole path components. Never a byte-prefix
/// test, so `/lib/Movies` and `/lib/Movies2` are never conflated.
fn is_proper_ancestor(a: &Path, b: &Path) -> bool {
    a != b && b.strip_prefix(a).is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatcher::test_support::RecordingDispatcher;
    use std::time::Duration;

    fn scheduler(clock: &Arc<ManualClockForTests>) -> Scheduler {
        Scheduler::new(Duration::from_secs(2), 1024, clock.clone() as Arc<dyn Clock>)
    }

    type ManualClockForTests = crate::clock::ManualClock;

    #[test]
    fn exact_match_extends_not_shortens() {
        let clock = Arc::new(crate::clock::ManualClock::new());
        let mut sched = scheduler(&clock);
        sched.enqueue(PathBuf::from("/m/Movies"), SectionId(1));
        clock.advance(Duration::from_millis(500));
        sched.enqueue(PathBuf::from("/m/Movies"), SectionId(1));

        assert_eq!(sched.len(), 1);
        let deadline = sched.next_deadline().unwrap();
        assert_eq!(deadline, clock.now() + Duration::from_millis(1500));
    }

    #[test]
    fn ancestor_dominance_absorbs_descendant() {
        let clock = Arc::new(crate::clock::ManualClock::new());
        let mut sched = scheduler(&clock);
        sched.enqueue(PathBuf::from("/m/Movies/A/S1"), SectionId(1));
        clock.advance(Duration::from_millis(500));
        sched.enqueue(PathBuf::from("/m/Movies"), SectionId(1));

        assert_eq!(sched.len(), 1);
        assert!(sched.next_deadline().is_some());
    }

    #[test]
    fn descendant_collapse_replaces_children() {
        let clock = Arc::new(crate::clock::ManualClock::new());
        let mut sched = scheduler(&clock);
        sched.enqueue(PathBuf::from("/m/Movies"), SectionId(1));
        clock.advance(Duration::from_millis(500));
        sched.enqueue(PathBuf::from("/m/Movies/A"), SectionId(2));

        assert_eq!(sched.len(), 1);
    }

    #[test]
    fn sibling_prefix_paths_are_independent() {
        let clock = Arc::new(crate::clock::ManualClock::new());
        let mut sched = scheduler(&clock);
        sched.enqueue(PathBuf::from("/lib/Movies"), SectionId(1));
        sched.enqueue(PathBuf::from("/lib/Movies2/x"), SectionId(2));

        assert_eq!(sched.len(), 2);
    }

    #[test]
    fn drain_due_dispatches_once_after_debounce() {
        let clock = Arc::new(crate::clock::ManualClock::new());
        let mut sched = scheduler(&clock);
        let dispatcher = RecordingDispatcher::new(true);

        for _ in 0..5 {
            sched.enqueue(PathBuf::from("/m/Movies"), SectionId(1));
            clock.advance(Duration::from_millis(200));
        }

        sched.drain_due(&dispatcher);
        assert!(dispatcher.calls().is_empty());

        clock.advance(Duration::from_millis(2000));
        sched.drain_due(&dispatcher);
        assert_eq!(dispatcher.calls().len(), 1);
        assert_eq!(sched.len(), 0);
    }

    #[test]
    fn eviction_removes_earliest_scheduled_entry_under_pressure() {
        let clock = Arc::new(crate::clock::ManualClock::new());
        let mut sched = Scheduler::new(Duration::from_secs(2), 2, clock.clone() as Arc<dyn Clock>);

        sched.enqueue(PathBuf::from("/a"), SectionId(1));
        clock.advance(Duration::from_millis(100));
        sched.enqueue(PathBuf::from("/b"), SectionId(1));
        clock.advance(Duration::from_millis(100));
        sched.enqueue(PathBuf::from("/c"), SectionId(1));

        assert_eq!(sched.len(), 2);
        assert!(!sched.entries.contains_key(Path::new("/a")));
    }
}
