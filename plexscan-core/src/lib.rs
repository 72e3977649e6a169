//! Directory-watch and partial-rescan control loop.
//!
//! This crate is the core of `plexscand`: it watches a set of media-library
//! directories, coalesces filesystem churn into debounced per-path scan
//! requests, and hands those off to a `Dispatcher` implementation. It has no
//! opinion on configuration, daemonization, or how the dispatcher reaches
//! the outside world — those live in `plexscan-config` and the `plexscand`
//! binary.

pub mod app;
pub mod clock;
pub mod dircache;
pub mod dispatcher;
pub mod error;
pub mod path_queue;
pub mod scheduler;
pub mod types;
pub mod watcher;

pub use app::{App, AppConfig};
pub use clock::{Clock, ManualClock, SystemClock};
pub use dircache::{ChangeDelta, DirCache};
pub use dispatcher::Dispatcher;
pub use error::{CoreError, Result};
pub use path_queue::PathQueue;
pub use scheduler::Scheduler;
pub use types::SectionId;
pub use watcher::{ControlEvent, ControlHandle, WatchIndex, WatchMessage, Watcher};
