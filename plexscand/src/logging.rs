//! Logging initialization: stdout when run in the foreground, an appended
//! log file when daemonized.

use std::fs::OpenOptions;
use std::path::Path;

use plexscan_config::LogLevel;
use tracing_subscriber::{layer::SubscriberExt, reload, util::SubscriberInitExt, EnvFilter};

#[derive(Debug, thiserror::Error)]
pub enum LoggingError {
    #[error("failed to open log file {path}: {source}")]
    LogFile {
        path: std::path::PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Handle onto the live filter layer, kept by `main` so a `SIGHUP` reload
/// can change the active level without tearing down the subscriber (B.5:
/// reload re-reads `log_level` among a handful of other knobs).
#[derive(Clone)]
pub struct ReloadHandle(reload::Handle<EnvFilter, tracing_subscriber::Registry>);

impl ReloadHandle {
    pub fn set_level(&self, level: LogLevel) {
        let filter = env_filter_for(level);
        if self.0.reload(filter).is_err() {
            // Subscriber already torn down (process exiting); nothing to do.
        }
    }
}

fn env_filter_for(level: LogLevel) -> EnvFilter {
    EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| format!("plexscand={0},plexscan_core={0}", level.as_filter_str()).into())
}

/// Initializes the global `tracing` subscriber. When `log_file` is set, the
/// caller must have already confirmed the path is writable — opening it
/// again per log event is cheap (it shares the same underlying fd via
/// `try_clone`) and keeps this module independent of any background flush
/// thread.
pub fn init(level: LogLevel, log_file: Option<&Path>) -> Result<ReloadHandle, LoggingError> {
    let (filter, reload_handle) = reload::Layer::new(env_filter_for(level));

    match log_file {
        Some(path) => {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .map_err(|source| LoggingError::LogFile {
                    path: path.to_path_buf(),
                    source,
                })?;
            tracing_subscriber::registry()
                .with(filter)
                .with(
                    tracing_subscriber::fmt::layer()
                        .with_writer(move || file.try_clone().expect("log file fd is valid"))
                        .with_ansi(false),
                )
                .init();
        }
        None => {
            tracing_subscriber::registry()
                .with(filter)
                .with(tracing_subscriber::fmt::layer())
                .init();
        }
    }

    Ok(ReloadHandle(reload_handle))
}
