//! Candidate-URL harvesting: grid searches against a place-search API.
//!
//! Progress lives behind [`ProgressStore`] so collection can resume after
//! a crash or a quota stop without duplicating ids. Quota exhaustion is a
//! distinct error that halts the run cleanly.

use anyhow::{Context, Result};
use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};

const QUOTA_STATUSES: &[&str] = &["RESOURCE_EXHAUSTED"];
const QUOTA_REASONS: &[&str] = &["BILLING_DISABLED", "QUOTA_EXCEEDED", "RATE_LIMIT_EXCEEDED"];

/// Pages fetched per tile before giving up on pagination
const MAX_PAGES_PER_TILE: usize = 3;

#[derive(Error, Debug)]
pub enum HarvestError {
    #[error("quota exhausted: {0}")]
    QuotaExhausted(String),

    #[error("search request failed: {0}")]
    Request(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// One search: a circle and a place type
#[derive(Debug, Clone, PartialEq)]
pub struct SearchTile {
    pub lat: f64,
    pub lng: f64,
    pub radius_m: u32,
    pub place_type: String,
}

impl SearchTile {
    pub fn new(lat: f64, lng: f64, radius_m: u32, place_type: &str) -> Self {
        Self {
            lat,
            lng,
            radius_m,
            place_type: place_type.to_string(),
        }
    }

    /// Progress key, stable across runs
    pub fn key(&self) -> String {
        format!("{},{},{},{}", self.lat, self.lng, self.radius_m, self.place_type)
    }
}

/// Set of finished keys. Re-adding a key is a no-op.
pub trait ProgressStore: Send {
    fn contains(&self, key: &str) -> bool;

    /// Record `key`; `Ok(false)` when it was already present
    fn insert(&mut self, key: &str) -> Result<bool>;

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[derive(Debug, Default)]
pub struct MemoryProgressStore {
    keys: BTreeSet<String>,
}

impl MemoryProgressStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ProgressStore for MemoryProgressStore {
    fn contains(&self, key: &str) -> bool {
        self.keys.contains(key)
    }

    fn insert(&mut self, key: &str) -> Result<bool> {
        Ok(self.keys.insert(key.to_string()))
    }

    fn len(&self) -> usize {
        self.keys.len()
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct ProgressEntry {
    key: String,
}

/// Append-only JSON-lines log, replayed on open. Each insert is flushed
/// before returning.
#[derive(Debug)]
pub struct JsonlProgressStore {
    path: PathBuf,
    keys: BTreeSet<String>,
    file: File,
}

impl JsonlProgressStore {
    pub fn open(path: &Path) -> Result<Self> {
        let mut keys = BTreeSet::new();
        let mut torn_tail = false;
        if path.exists() {
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read progress log {}", path.display()))?;
            torn_tail = !content.is_empty() && !content.ends_with('\n');
            for (line_no, line) in content.lines().enumerate() {
                if line.trim().is_empty() {
                    continue;
                }
                match serde_json::from_str::<ProgressEntry>(line) {
                    Ok(entry) => {
                        keys.insert(entry.key);
                    }
                    // A crash can leave a torn final line
                    Err(e) => warn!("Skipping unreadable progress line {} in {}: {}", line_no + 1, path.display(), e),
                }
            }
        } else if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .with_context(|| format!("Failed to open progress log {} for append", path.display()))?;
        if torn_tail {
            writeln!(file)?;
        }

        debug!("Progress log {} replayed {} keys", path.display(), keys.len());
        Ok(Self {
            path: path.to_path_buf(),
            keys,
            file,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl ProgressStore for JsonlProgressStore {
    fn contains(&self, key: &str) -> bool {
        self.keys.contains(key)
    }

    fn insert(&mut self, key: &str) -> Result<bool> {
        if self.keys.contains(key) {
            return Ok(false);
        }
        let line = serde_json::to_string(&ProgressEntry { key: key.to_string() })?;
        writeln!(self.file, "{}", line)?;
        self.file.flush()?;
        self.keys.insert(key.to_string());
        Ok(true)
    }

    fn len(&self) -> usize {
        self.keys.len()
    }
}

/// Produces candidate ids for one tile
pub trait CandidateSource: Send + Sync {
    fn search<'a>(&'a self, tile: &'a SearchTile) -> BoxFuture<'a, Result<Vec<String>, HarvestError>>;
}

/// Billing or quota exhaustion, as opposed to key, IP or request errors
pub fn is_quota_error(error: &serde_json::Value) -> bool {
    let status_matches = error
        .get("status")
        .and_then(|s| s.as_str())
        .map_or(false, |s| QUOTA_STATUSES.contains(&s));
    if status_matches {
        return true;
    }
    error
        .get("details")
        .and_then(|d| d.as_array())
        .map_or(false, |details| {
            details.iter().any(|d| {
                d.get("reason")
                    .and_then(|r| r.as_str())
                    .map_or(false, |r| QUOTA_REASONS.contains(&r))
            })
        })
}

/// Classify an API `error` object
pub fn error_from_body(error: &serde_json::Value) -> HarvestError {
    let message = error
        .get("message")
        .and_then(|m| m.as_str())
        .unwrap_or("unknown error")
        .to_string();
    if is_quota_error(error) {
        HarvestError::QuotaExhausted(message)
    } else {
        HarvestError::Request(message)
    }
}

/// Text-search endpoint returning place ids only, following page tokens
pub struct PlacesTextSearch {
    client: reqwest::Client,
    endpoint: String,
    api_key: String,
    timeout: Duration,
}

impl PlacesTextSearch {
    pub fn new(client: reqwest::Client, endpoint: &str, api_key: &str) -> Self {
        Self {
            client,
            endpoint: endpoint.to_string(),
            api_key: api_key.to_string(),
            timeout: Duration::from_secs(15),
        }
    }

    async fn fetch_all(&self, tile: &SearchTile) -> Result<Vec<String>, HarvestError> {
        let mut payload = serde_json::json!({
            "textQuery": tile.place_type.replace('_', " "),
            "includedType": tile.place_type,
            "locationBias": {
                "circle": {
                    "center": {"latitude": tile.lat, "longitude": tile.lng},
                    "radius": tile.radius_m as f64,
                }
            },
        });

        let mut ids = Vec::new();
        for _ in 0..MAX_PAGES_PER_TILE {
            let response = self
                .client
                .post(&self.endpoint)
                .header("X-Goog-Api-Key", &self.api_key)
                .header("X-Goog-FieldMask", "places.id,nextPageToken")
                .timeout(self.timeout)
                .json(&payload)
                .send()
                .await
                .map_err(|e| HarvestError::Request(e.to_string()))?;

            let body: serde_json::Value = response
                .json()
                .await
                .map_err(|e| HarvestError::Request(format!("invalid response body: {}", e)))?;

            if let Some(error) = body.get("error") {
                return Err(error_from_body(error));
            }

            if let Some(places) = body.get("places").and_then(|p| p.as_array()) {
                ids.extend(
                    places
                        .iter()
                        .filter_map(|p| p.get("id").and_then(|id| id.as_str()))
                        .map(str::to_string),
                );
            }

            match body.get("nextPageToken").and_then(|t| t.as_str()) {
                Some(token) => payload["pageToken"] = serde_json::Value::String(token.to_string()),
                None => break,
            }
        }
        Ok(ids)
    }
}

impl CandidateSource for PlacesTextSearch {
    fn search<'a>(&'a self, tile: &'a SearchTile) -> BoxFuture<'a, Result<Vec<String>, HarvestError>> {
        Box::pin(self.fetch_all(tile))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HarvestOutcome {
    /// Ids first seen in this run, in discovery order
    pub new_ids: Vec<String>,
    pub tiles_searched: usize,
    /// Tiles that failed with a non-quota error and remain pending
    pub tiles_failed: usize,
    pub halted_on_quota: bool,
}

/// Search every pending tile, recording finished tiles and new ids.
///
/// A quota error stops the run with everything collected so far kept.
/// Other search errors leave the tile pending for the next run.
pub async fn collect_candidates(
    source: &dyn CandidateSource,
    tiles: &[SearchTile],
    done_tiles: &mut dyn ProgressStore,
    seen_ids: &mut dyn ProgressStore,
) -> Result<HarvestOutcome> {
    let mut outcome = HarvestOutcome::default();
    let pending: Vec<&SearchTile> = tiles.iter().filter(|t| !done_tiles.contains(&t.key())).collect();
    info!(
        "{} searches remaining ({} already done)",
        pending.len(),
        tiles.len() - pending.len()
    );

    for tile in pending {
        let ids = match source.search(tile).await {
            Ok(ids) => ids,
            Err(HarvestError::QuotaExhausted(message)) => {
                warn!("Quota exhausted, stopping with progress saved: {}", message);
                outcome.halted_on_quota = true;
                break;
            }
            Err(e) => {
                warn!("Search {} failed: {}", tile.key(), e);
                outcome.tiles_failed += 1;
                continue;
            }
        };

        let mut fresh = 0;
        for id in ids {
            if seen_ids.insert(&id)? {
                outcome.new_ids.push(id);
                fresh += 1;
            }
        }
        done_tiles.insert(&tile.key())?;
        outcome.tiles_searched += 1;
        debug!("{} -> {} new ids (total {})", tile.key(), fresh, seen_ids.len());
    }

    Ok(outcome)
}
