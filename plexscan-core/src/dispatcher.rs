use std::path::Path;

use crate::types::SectionId;

/// Narrow boundary to the external media-indexing client.
///
/// Both operations are blocking from the Scheduler's perspective; this is
/// acceptable because dispatch frequency is capped by the debounce window
/// and drain batching.
pub trait Dispatcher: std::fmt::Debug + Send + Sync {
    /// Liveness probe, called once at startup.
    fn check_connectivity(&self) -> bool;

    /// Triggers a partial rescan of `path` within `section_id`. Returns
    /// `false` on any failure; the caller logs and swallows it rather than
    /// retrying.
    fn scan(&self, path: &Path, section_id: SectionId) -> bool;

    /// Applies a reloaded auth token going forward (SIGHUP reload, §6/B.5).
    /// Default no-op for dispatchers that don't carry credentials.
    fn set_token(&self, _token: Option<&str>) {}
}

/// In-memory fakes shared by unit tests and the `tests/scenarios.rs`
/// end-to-end suite.
pub mod test_support {
    use std::path::PathBuf;
    use std::sync::Mutex;

    use super::*;

    /// Records every `scan` call for assertions; never fails.
    #[derive(Debug, Default)]
    pub struct RecordingDispatcher {
        pub calls: Mutex<Vec<(PathBuf, SectionId)>>,
        pub connectivity: Mutex<bool>,
    }

    impl RecordingDispatcher {
        pub fn new(connectivity: bool) -> Self {
            Self {
                calls: Mutex::new(Vec::new()),
                connectivity: Mutex::new(connectivity),
            }
        }

        pub fn calls(&self) -> Vec<(PathBuf, SectionId)> {
            self.calls.lock().unwrap().clone()
        }
    }

    impl Dispatcher for RecordingDispatcher {
        fn check_connectivity(&self) -> bool {
            *self.connectivity.lock().unwrap()
        }

        fn scan(&self, path: &Path, section_id: SectionId) -> bool {
            self.calls
                .lock()
                .unwrap()
                .push((path.to_path_buf(), section_id));
            true
        }
    }
}
