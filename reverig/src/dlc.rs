//! DLC discovery.
//!
//! Looks up an app's DLC ids through the store metadata API and records each
//! one as an `addEntry(<id>, 1)` line in the shared discovery file.

use std::collections::HashSet;
use std::fs;
use std::io;
use std::path::PathBuf;

use reqwest::blocking::Client;
use reqwest::header::{HeaderValue, ACCEPT};
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, info};

use crate::acquire::ID_PLACEHOLDER;
use crate::layout::SteamLayout;

/// Store metadata endpoint.
pub const METADATA_URL_TEMPLATE: &str =
    "https://store.steampowered.com/api/appdetails?appids={id}";

/// Directive written once per discovered id.
pub const DISCOVERY_DIRECTIVE: &str = "addEntry";

/// Errors from DLC discovery.
#[derive(Debug, Error)]
pub enum DlcError {
    #[error("Failed to fetch app details: {0}")]
    Fetch(String),

    #[error("App not found or API error")]
    AppNotFound,

    #[error("Steam path not found")]
    SteamPathNotFound,

    #[error("Failed to read Steamtools.lua: {source}")]
    Read { path: PathBuf, source: io::Error },

    #[error("Failed to write Steamtools.lua: {source}")]
    Write { path: PathBuf, source: io::Error },
}

/// Source of raw app metadata.
pub trait AppMetadataSource: Send + Sync {
    /// The metadata document for one app, keyed by the app id as text.
    fn app_details(&self, app_id: u32) -> Result<Value, DlcError>;
}

/// Metadata client for the public store API.
#[derive(Debug, Clone)]
pub struct StoreMetadataClient {
    client: Client,
    url_template: String,
}

impl StoreMetadataClient {
    /// Create a client on top of an existing connection pool.
    pub fn new(client: Client) -> Self {
        Self {
            client,
            url_template: METADATA_URL_TEMPLATE.to_string(),
        }
    }

    /// Point the client at a different endpoint (`{id}` placeholder).
    pub fn with_url_template(mut self, template: impl Into<String>) -> Self {
        self.url_template = template.into();
        self
    }
}

impl AppMetadataSource for StoreMetadataClient {
    fn app_details(&self, app_id: u32) -> Result<Value, DlcError> {
        let url = self
            .url_template
            .replace(ID_PLACEHOLDER, &app_id.to_string());
        debug!(app_id, url = %url, "fetching app details");

        self.client
            .get(&url)
            .header(ACCEPT, HeaderValue::from_static("application/json"))
            .send()
            .and_then(|r| r.error_for_status())
            .and_then(|r| r.json::<Value>())
            .map_err(|e| DlcError::Fetch(e.to_string()))
    }
}

/// Extract DLC ids from a metadata document.
///
/// Non-integer entries are ignored. A missing or empty `dlc` array yields an
/// empty list.
pub fn parse_dlc_ids(app_id: u32, details: &Value) -> Result<Vec<u32>, DlcError> {
    let entry = details
        .get(app_id.to_string())
        .filter(|e| e.get("success").and_then(Value::as_bool).unwrap_or(false))
        .ok_or(DlcError::AppNotFound)?;

    let ids = entry
        .get("data")
        .and_then(|d| d.get("dlc"))
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(Value::as_u64)
                .filter_map(|id| u32::try_from(id).ok())
                .collect()
        })
        .unwrap_or_default();
    Ok(ids)
}

/// Discovery line for one id.
pub fn discovery_line(id: u32) -> String {
    format!("{}({}, 1)", DISCOVERY_DIRECTIVE, id)
}

/// Append a discovery line for every id not already present.
///
/// Returns the new text and the ids that were added, in input order.
pub fn merge_entries(content: &str, ids: &[u32]) -> (String, Vec<u32>) {
    let mut present: HashSet<String> = content.lines().map(|l| l.trim().to_string()).collect();
    let mut text = content.to_string();
    let mut added = Vec::new();

    for &id in ids {
        let line = discovery_line(id);
        if present.contains(&line) {
            continue;
        }
        if !text.is_empty() && !text.ends_with('\n') {
            text.push('\n');
        }
        text.push_str(&line);
        text.push('\n');
        present.insert(line);
        added.push(id);
    }

    (text, added)
}

/// Result of a discovery run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DiscoveryOutcome {
    /// The app has no DLC.
    NoEntries,
    /// Ids appended to the discovery file (possibly none).
    Added(Vec<u32>),
}

impl DiscoveryOutcome {
    /// Human-readable reply message.
    pub fn message(&self) -> String {
        match self {
            Self::NoEntries => "No DLCs found for this app".to_string(),
            Self::Added(ids) => format!("Added {} DLCs", ids.len()),
        }
    }
}

/// Fetch DLC ids for `app_id` and merge them into the discovery file.
///
/// The file is written only if at least one line was added.
pub fn add_discovered_entries(
    source: &dyn AppMetadataSource,
    layout: Option<&SteamLayout>,
    app_id: u32,
) -> Result<DiscoveryOutcome, DlcError> {
    let details = source.app_details(app_id)?;
    let ids = parse_dlc_ids(app_id, &details)?;
    if ids.is_empty() {
        return Ok(DiscoveryOutcome::NoEntries);
    }

    let layout = layout.ok_or(DlcError::SteamPathNotFound)?;
    let path = layout.discovery_file();

    let content = match fs::read(&path) {
        Ok(bytes) => String::from_utf8_lossy(&bytes).into_owned(),
        Err(e) if e.kind() == io::ErrorKind::NotFound => String::new(),
        Err(e) => return Err(DlcError::Read { path, source: e }),
    };

    let (text, added) = merge_entries(&content, &ids);
    if added.is_empty() {
        debug!(app_id, "discovery file already up to date");
        return Ok(DiscoveryOutcome::Added(added));
    }

    fs::create_dir_all(layout.plugin_dir())
        .and_then(|()| fs::write(&path, text.as_bytes()))
        .map_err(|e| DlcError::Write {
            path: path.clone(),
            source: e,
        })?;

    info!(app_id, added = added.len(), path = %path.display(), "discovery entries added");
    Ok(DiscoveryOutcome::Added(added))
}
