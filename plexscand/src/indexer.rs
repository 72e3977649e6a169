//! HTTP client for the indexing server's library/scan endpoints.

use std::path::Path;
use std::sync::RwLock;
use std::time::Duration;

use plexscan_core::{Dispatcher, SectionId};
use tracing::{debug, warn};

#[derive(Debug, thiserror::Error)]
pub enum IndexerError {
    #[error("request to indexer failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("indexer returned an unexpected response body")]
    UnexpectedBody,
}

/// One discovered library section, as reported by `/library/sections`.
#[derive(Debug, Clone)]
pub struct Section {
    pub section_id: SectionId,
    pub paths: Vec<std::path::PathBuf>,
}

/// Blocking HTTP client targeting the indexer's wire protocol. Blocking is
/// appropriate here: the `App` control loop is single-threaded and
/// synchronous, and dispatch frequency is already capped by debounce.
#[derive(Debug)]
pub struct IndexerClient {
    base_url: url::Url,
    // `RwLock` rather than a plain field: `Dispatcher::set_token` takes
    // `&self` so a SIGHUP reload can rotate credentials without rebuilding
    // the client mid-flight (B.5).
    token: RwLock<Option<String>>,
    client: reqwest::blocking::Client,
}

impl IndexerClient {
    pub fn new(base_url: url::Url, token: Option<String>) -> Result<Self, IndexerError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()?;
        Ok(Self {
            base_url,
            token: RwLock::new(token),
            client,
        })
    }

    fn request(&self, path: &str) -> reqwest::blocking::RequestBuilder {
        let url = format!("{}{}", self.base_url.as_str().trim_end_matches('/'), path);
        let mut builder = self
            .client
            .get(url)
            .header("Accept", "application/json");
        if let Some(token) = self.token.read().unwrap().as_deref() {
            builder = builder.header("X-Plex-Token", token);
        }
        builder
    }

    pub fn discover_sections(&self) -> Result<Vec<Section>, IndexerError> {
        let response = self.request("/library/sections").send()?;
        let body: serde_json::Value = response.json()?;

        let directories = body
            .get("MediaContainer")
            .and_then(|m| m.get("Directory"))
            .and_then(|d| d.as_array())
            .ok_or(IndexerError::UnexpectedBody)?;

        let mut sections = Vec::with_capacity(directories.len());
        for dir in directories {
            let Some(key) = dir.get("key").and_then(|k| k.as_str().map(str::to_string).or_else(|| k.as_i64().map(|n| n.to_string())))
            else {
                continue;
            };
            let Ok(section_id) = key.parse::<i64>() else {
                continue;
            };

            let paths = dir
                .get("Location")
                .and_then(|l| l.as_array())
                .map(|locations| {
                    locations
                        .iter()
                        .filter_map(|loc| loc.get("path").and_then(|p| p.as_str()))
                        .map(std::path::PathBuf::from)
                        .collect()
                })
                .unwrap_or_default();

            sections.push(Section {
                section_id: SectionId(section_id),
                paths,
            });
        }

        Ok(sections)
    }
}

impl Dispatcher for IndexerClient {
    fn check_connectivity(&self) -> bool {
        match self.request("/identity").send() {
            Ok(response) => response.status().is_success(),
            Err(err) => {
                debug!(error = %err, "connectivity probe failed");
                false
            }
        }
    }

    fn scan(&self, path: &Path, section_id: SectionId) -> bool {
        let endpoint = format!(
            "/library/sections/{}/refresh?path={}",
            section_id,
            urlencoding::encode(&path.to_string_lossy())
        );
        match self.request(&endpoint).send() {
            Ok(response) if response.status().is_success() => true,
            Ok(response) => {
                warn!(path = %path.display(), status = %response.status(), "indexer rejected scan request");
                false
            }
            Err(err) => {
                warn!(path = %path.display(), error = %err, "scan request failed");
                false
            }
        }
    }

    fn set_token(&self, token: Option<&str>) {
        *self.token.write().unwrap() = token.map(str::to_string);
    }
}
