use std::path::PathBuf;

use thiserror::Error;

/// Errors surfaced by the core control loop.
///
/// None of these are fatal to the event loop itself: every caller that can
/// observe one of these downgrades it to a log line and continues with
/// degraded coverage. The binary crate is the only place a `CoreError` can
/// end a process, at startup.
#[derive(Error, Debug)]
pub enum CoreError {
    #[error("io error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("watch table is at capacity ({0} entries)")]
    WatchTableFull(usize),

    #[error("fd soft ceiling reached ({0} open watches)")]
    FdCeilingReached(usize),

    #[error("path exceeds maximum length: {0}")]
    PathTooLong(PathBuf),

    #[error("watch index {0:?} is stale")]
    StaleWatchIndex(crate::watcher::WatchIndex),

    #[error("kernel event source unavailable: {0}")]
    EventSource(#[from] notify::Error),
}

pub type Result<T> = std::result::Result<T, CoreError>;

impl CoreError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        CoreError::Io {
            path: path.into(),
            source,
        }
    }
}
