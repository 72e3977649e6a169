//! Line-oriented `key=value` config file parsing.

use std::collections::HashMap;
use std::fs;
use std::path::Path;

use tracing::warn;

use crate::error::{ConfigError, Result};

const RECOGNIZED_KEYS: &[&str] = &[
    "plex_url",
    "plex_token",
    "scan_interval",
    "startup_timeout",
    "log_level",
    "log_file",
];

/// Raw key/value pairs read from a config file. Values are kept as strings;
/// `Settings::merge` is responsible for parsing and defaulting.
#[derive(Debug, Default, Clone)]
pub struct FileConfig {
    pub plex_url: Option<String>,
    pub plex_token: Option<String>,
    pub scan_interval: Option<String>,
    pub startup_timeout: Option<String>,
    pub log_level: Option<String>,
    pub log_file: Option<String>,
}

impl FileConfig {
    /// Reads and parses `path`. A missing file is not an error here — the
    /// caller decides whether a missing explicit `-c` path is fatal.
    pub fn load(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;

        Self::parse(path, &contents)
    }

    fn parse(path: &Path, contents: &str) -> Result<Self> {
        let mut raw: HashMap<String, String> = HashMap::new();

        for (line_no, raw_line) in contents.lines().enumerate() {
            let line = raw_line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            let Some((key, value)) = line.split_once('=') else {
                return Err(ConfigError::MalformedLine {
                    path: path.to_path_buf(),
                    line: line_no + 1,
                    content: raw_line.to_string(),
                });
            };

            let key = key.trim().to_string();
            let value = value.trim().to_string();

            if !RECOGNIZED_KEYS.contains(&key.as_str()) {
                warn!(path = %path.display(), key, "unrecognized config key, ignoring");
                continue;
            }

            raw.insert(key, value);
        }

        Ok(Self {
            plex_url: raw.remove("plex_url"),
            plex_token: raw.remove("plex_token"),
            scan_interval: raw.remove("scan_interval"),
            startup_timeout: raw.remove("startup_timeout"),
            log_level: raw.remove("log_level"),
            log_file: raw.remove("log_file"),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn parses_recognized_keys_and_ignores_comments() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("plexscand.conf");
        std::fs::write(
            &path,
            "# comment\n  plex_url = http://localhost:32400  \nscan_interval=5\n\nlog_level=debug\n",
        )
        .unwrap();

        let config = FileConfig::load(&path).unwrap();
        assert_eq!(config.plex_url.as_deref(), Some("http://localhost:32400"));
        assert_eq!(config.scan_interval.as_deref(), Some("5"));
        assert_eq!(config.log_level.as_deref(), Some("debug"));
        assert!(config.plex_token.is_none());
    }

    #[test]
    fn unknown_key_is_ignored_not_fatal() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("plexscand.conf");
        std::fs::write(&path, "bogus_key=whatever\nplex_url=http://x\n").unwrap();

        let config = FileConfig::load(&path).unwrap();
        assert_eq!(config.plex_url.as_deref(), Some("http://x"));
    }

    #[test]
    fn malformed_line_without_equals_is_rejected() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("plexscand.conf");
        std::fs::write(&path, "this is not key value\n").unwrap();

        assert!(FileConfig::load(&path).is_err());
    }
}
