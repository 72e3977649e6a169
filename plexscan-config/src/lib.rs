//! CLI argument parsing and config-file loading for `plexscand`.

pub mod cli;
pub mod error;
pub mod file;
pub mod settings;

pub use cli::{Args, DEFAULT_CONFIG_PATH};
pub use error::{ConfigError, Result};
pub use file::FileConfig;
pub use settings::{LogLevel, Settings, DEFAULT_SCAN_INTERVAL_SECS, DEFAULT_STARTUP_TIMEOUT_SECS};
