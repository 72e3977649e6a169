use std::path::PathBuf;

use tracing::warn;

use crate::cli::{Args, DEFAULT_CONFIG_PATH};
use crate::error::{ConfigError, Result};
use crate::file::FileConfig;

pub const DEFAULT_SCAN_INTERVAL_SECS: u64 = 1;
pub const DEFAULT_STARTUP_TIMEOUT_SECS: u64 = 60;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Info,
    Debug,
}

impl LogLevel {
    fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "info" => Some(Self::Info),
            "debug" => Some(Self::Debug),
            _ => None,
        }
    }

    pub fn as_filter_str(&self) -> &'static str {
        match self {
            Self::Info => "info",
            Self::Debug => "debug",
        }
    }
}

/// Fully resolved, validated runtime configuration: CLI flags layered over
/// the config file, with every field defaulted.
#[derive(Debug, Clone)]
pub struct Settings {
    pub plex_url: Option<String>,
    pub plex_token: Option<String>,
    pub scan_interval_secs: u64,
    pub startup_timeout_secs: u64,
    pub log_level: LogLevel,
    pub log_file: Option<PathBuf>,
    pub verbose: bool,
    pub daemonize: bool,
}

impl Settings {
    /// Loads the config file named by `args.config_path` (or the default
    /// location), merges in CLI overrides, and validates the result.
    ///
    /// A missing file at the *default* location is not an error; a missing
    /// file at an explicitly-requested `-c` path is.
    pub fn load(args: &Args) -> Result<Self> {
        let explicit = args.config_path.is_some();
        let path = args
            .config_path
            .clone()
            .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH));

        let file_config = match FileConfig::load(&path) {
            Ok(config) => config,
            Err(ConfigError::Io { source, .. }) if !explicit && source.kind() == std::io::ErrorKind::NotFound => {
                FileConfig::default()
            }
            Err(ConfigError::Io { path, source }) if source.kind() == std::io::ErrorKind::NotFound => {
                return Err(ConfigError::MissingExplicit(path));
            }
            Err(err) => return Err(err),
        };

        Ok(Self::merge(file_config, args))
    }

    fn merge(file: FileConfig, args: &Args) -> Self {
        let mut settings = Self {
            plex_url: file.plex_url,
            plex_token: file.plex_token,
            scan_interval_secs: file
                .scan_interval
                .as_deref()
                .and_then(|v| v.parse().ok())
                .unwrap_or(DEFAULT_SCAN_INTERVAL_SECS),
            startup_timeout_secs: file
                .startup_timeout
                .as_deref()
                .and_then(|v| v.parse().ok())
                .unwrap_or(DEFAULT_STARTUP_TIMEOUT_SECS),
            log_level: file
                .log_level
                .as_deref()
                .and_then(LogLevel::parse)
                .unwrap_or(LogLevel::Info),
            log_file: file.log_file.map(PathBuf::from),
            verbose: args.verbose,
            daemonize: args.daemonize,
        };

        if let Some(timeout) = args.startup_timeout {
            settings.startup_timeout_secs = timeout;
        }

        settings.validate();
        settings
    }

    /// Non-positive debounce/timeout values are warned and replaced with
    /// their defaults rather than treated as fatal.
    fn validate(&mut self) {
        if self.scan_interval_secs == 0 {
            warn!("scan_interval must be positive, defaulting to {DEFAULT_SCAN_INTERVAL_SECS}");
            self.scan_interval_secs = DEFAULT_SCAN_INTERVAL_SECS;
        }
        if self.startup_timeout_secs == 0 {
            warn!(
                "startup_timeout must be positive, defaulting to {DEFAULT_STARTUP_TIMEOUT_SECS}"
            );
            self.startup_timeout_secs = DEFAULT_STARTUP_TIMEOUT_SECS;
        }
    }
}
