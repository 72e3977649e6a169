//! Daemonization: double-fork, detach from the controlling terminal, drop
//! std streams to `/dev/null`.
//!
//! The log file itself is opened by the caller *before* calling
//! `daemonize()` and is unaffected by it — `Daemonize` only redirects the
//! three standard streams, so a file descriptor opened earlier for the log
//! writer survives the fork untouched.

use std::fs::File;

use daemonize::Daemonize;

#[derive(Debug, thiserror::Error)]
pub enum DaemonError {
    #[error("failed to open /dev/null: {0}")]
    DevNull(#[source] std::io::Error),

    #[error("daemonization failed: {0}")]
    Fork(#[from] daemonize::Error),
}

/// Forks into the background. Must be called before the event loop starts
/// and before any other thread (e.g. the signal bridge) is spawned —
/// `fork(2)` only carries the calling thread into the child.
pub fn daemonize() -> Result<(), DaemonError> {
    let devnull_out = File::create("/dev/null").map_err(DaemonError::DevNull)?;
    let devnull_err = devnull_out.try_clone().map_err(DaemonError::DevNull)?;

    Daemonize::new()
        .umask(0)
        .stdout(devnull_out)
        .stderr(devnull_err)
        .start()?;

    Ok(())
}
