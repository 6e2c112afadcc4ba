//! Host-facing reply surface.
//!
//! Every operation takes the app id as text, the way the host passes it, and
//! answers with a JSON object carrying a `success` flag. Invalid ids are
//! rejected before any state is touched.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use serde_json::{json, Map, Value};
use thiserror::Error;
use tracing::{debug, info};

use crate::acquire::{Acquirer, FetcherBuildError, HttpFetcher, StateStore};
use crate::config::ConfigFile;
use crate::dlc::{self, AppMetadataSource, StoreMetadataClient};
use crate::install::{self, CommentOutRule, Installer};
use crate::layout::{ProbingLocator, SteamLayout, SteamLocator};

/// Errors surfaced by the API layer.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Invalid appid")]
    InvalidAppId,

    #[error(transparent)]
    Fetcher(#[from] FetcherBuildError),
}

/// A validated Steam app id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AppId(pub u32);

impl FromStr for AppId {
    type Err = ApiError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim()
            .parse::<u32>()
            .map(AppId)
            .map_err(|_| ApiError::InvalidAppId)
    }
}

impl fmt::Display for AppId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u32> for AppId {
    fn from(id: u32) -> Self {
        AppId(id)
    }
}

/// The plugin backend: acquisition, presence queries and DLC discovery.
pub struct PluginApi {
    acquirer: Acquirer,
    locator: Arc<dyn SteamLocator>,
    metadata: Arc<dyn AppMetadataSource>,
    rule: CommentOutRule,
}

impl fmt::Debug for PluginApi {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PluginApi")
            .field("acquirer", &self.acquirer)
            .field("locator", &self.locator)
            .finish()
    }
}

impl PluginApi {
    pub fn new(
        acquirer: Acquirer,
        locator: Arc<dyn SteamLocator>,
        metadata: Arc<dyn AppMetadataSource>,
    ) -> Self {
        Self {
            acquirer,
            locator,
            metadata,
            rule: CommentOutRule::default(),
        }
    }

    /// Wire up the HTTP stack, locator and store from a configuration.
    ///
    /// One HTTP client is built and shared by the fetcher and the metadata
    /// client.
    pub fn from_config(config: &ConfigFile) -> Result<Self, ApiError> {
        let fetcher = HttpFetcher::new(config.fetcher_config())?;
        let metadata = StoreMetadataClient::new(fetcher.client().clone());
        let locator: Arc<dyn SteamLocator> =
            Arc::new(ProbingLocator::new(config.steam_path.clone()));

        let acquirer = Acquirer::new(
            config.acquirer_config(),
            Arc::new(StateStore::new()),
            Arc::new(fetcher),
            Installer::new(Arc::clone(&locator)),
        );
        Ok(Self::new(acquirer, locator, Arc::new(metadata)))
    }

    pub fn acquirer(&self) -> &Acquirer {
        &self.acquirer
    }

    /// The Steam layout, if the root is known.
    pub fn layout(&self) -> Option<SteamLayout> {
        self.locator.layout()
    }

    /// Start an acquisition. Answers immediately.
    pub fn start_acquisition(&self, app_id: &str) -> Value {
        let id = match parse(app_id) {
            Ok(id) => id,
            Err(reply) => return reply,
        };
        info!(app_id = id.0, "acquisition requested");
        match self.acquirer.start(id.0) {
            Ok(_) => success(Map::new()),
            Err(e) => failure(e),
        }
    }

    /// Current acquisition state.
    pub fn get_acquisition_status(&self, app_id: &str) -> Value {
        let id = match parse(app_id) {
            Ok(id) => id,
            Err(reply) => return reply,
        };
        let state = self.acquirer.status(id.0);
        match serde_json::to_value(&state) {
            Ok(state) => success(fields([("state", state)])),
            Err(e) => failure(e),
        }
    }

    /// Signal an in-flight acquisition to stop.
    pub fn cancel_acquisition(&self, app_id: &str) -> Value {
        let id = match parse(app_id) {
            Ok(id) => id,
            Err(reply) => return reply,
        };
        let cancelled = self.acquirer.cancel(id.0);
        success(fields([("cancelled", Value::Bool(cancelled))]))
    }

    /// Whether an enabled or disabled script is installed.
    pub fn has_primary_file(&self, app_id: &str) -> Value {
        let id = match parse(app_id) {
            Ok(id) => id,
            Err(reply) => return reply,
        };
        let exists = self
            .layout()
            .map(|layout| install::has_primary_file(&layout, id.0))
            .unwrap_or(false);
        debug!(app_id = id.0, exists, "presence check");
        success(fields([("exists", Value::Bool(exists))]))
    }

    /// Delete the installed script in both forms.
    pub fn remove_primary_file(&self, app_id: &str) -> Value {
        let id = match parse(app_id) {
            Ok(id) => id,
            Err(reply) => return reply,
        };
        let Some(layout) = self.layout() else {
            return success(fields([("removed", Value::Bool(false))]));
        };
        match install::remove_primary_file(&layout, id.0) {
            Ok(removed) => success(fields([("removed", Value::Bool(removed))])),
            Err(e) => failure(e),
        }
    }

    /// Record the app's DLC ids in the discovery file.
    pub fn add_discovered_entries(&self, app_id: &str) -> Value {
        let id = match parse(app_id) {
            Ok(id) => id,
            Err(reply) => return reply,
        };
        let layout = self.layout();
        match dlc::add_discovered_entries(self.metadata.as_ref(), layout.as_ref(), id.0) {
            Ok(outcome) => success(fields([("message", Value::String(outcome.message()))])),
            Err(e) => failure(e),
        }
    }

    /// Re-apply the line rule to every installed script.
    pub fn sweep_installed(&self) -> Value {
        let Some(layout) = self.layout() else {
            return failure("Steam path not found");
        };
        let report = install::comment_out_installed(&layout, &self.rule);
        let failures: Vec<Value> = report
            .failures
            .iter()
            .map(|f| json!({ "path": f.path.display().to_string(), "reason": f.reason }))
            .collect();
        success(fields([
            ("filesScanned", json!(report.files_scanned)),
            ("filesModified", json!(report.files_modified)),
            ("linesCommented", json!(report.lines_commented)),
            ("failures", Value::Array(failures)),
        ]))
    }

    /// Stop every acquisition and release the HTTP client.
    pub fn shutdown(&self) {
        self.acquirer.shutdown();
    }
}

fn parse(app_id: &str) -> Result<AppId, Value> {
    app_id.parse::<AppId>().map_err(failure)
}

fn fields<const N: usize>(pairs: [(&str, Value); N]) -> Map<String, Value> {
    pairs
        .into_iter()
        .map(|(k, v)| (k.to_string(), v))
        .collect()
}

fn success(mut body: Map<String, Value>) -> Value {
    body.insert("success".to_string(), Value::Bool(true));
    Value::Object(body)
}

fn failure(error: impl fmt::Display) -> Value {
    json!({ "success": false, "error": error.to_string() })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::acquire::{
        AcquirerConfig, ArchiveFetcher, FetchOutcome, FetchProgress, SourceList, Unavailable,
    };
    use crate::dlc::DlcError;
    use crate::layout::FixedLocator;
    use std::fs;
    use std::path::Path;
    use tempfile::TempDir;
    use tokio_util::sync::CancellationToken;

    struct NothingFetcher;

    impl ArchiveFetcher for NothingFetcher {
        fn fetch(
            &self,
            _url: &str,
            _dest: &Path,
            _cancel: &CancellationToken,
            _on_progress: &mut dyn FnMut(FetchProgress),
        ) -> FetchOutcome {
            FetchOutcome::Unavailable(Unavailable::NotFound)
        }
    }

    struct FixedMetadata(Value);

    impl AppMetadataSource for FixedMetadata {
        fn app_details(&self, _app_id: u32) -> Result<Value, DlcError> {
            Ok(self.0.clone())
        }
    }

    fn api_for(root: &Path, metadata: Value) -> PluginApi {
        let locator: Arc<dyn SteamLocator> = Arc::new(FixedLocator::new(root));
        let acquirer = Acquirer::new(
            AcquirerConfig::default()
                .with_sources(SourceList::new(["http://none/{id}"]))
                .with_download_dir(root.join("downloads")),
            Arc::new(StateStore::new()),
            Arc::new(NothingFetcher),
            Installer::new(Arc::clone(&locator)),
        );
        PluginApi::new(acquirer, locator, Arc::new(FixedMetadata(metadata)))
    }

    #[test]
    fn test_app_id_parsing() {
        assert_eq!(" 440 ".parse::<AppId>().unwrap(), AppId(440));
        assert!("abc".parse::<AppId>().is_err());
        assert!("-1".parse::<AppId>().is_err());
        assert!("".parse::<AppId>().is_err());
    }

    #[test]
    fn test_invalid_id_replies_without_state_change() {
        let temp = TempDir::new().unwrap();
        let api = api_for(temp.path(), Value::Null);

        let reply = api.start_acquisition("12ab");
        assert_eq!(reply, json!({"success": false, "error": "Invalid appid"}));
        assert!(api.acquirer().store().snapshot().is_empty());

        assert_eq!(api.has_primary_file("x")["error"], "Invalid appid");
        assert_eq!(api.remove_primary_file("x")["error"], "Invalid appid");
        assert_eq!(api.add_discovered_entries("x")["error"], "Invalid appid");
        assert_eq!(api.get_acquisition_status("x")["error"], "Invalid appid");
    }

    #[test]
    fn test_status_of_unknown_id() {
        let temp = TempDir::new().unwrap();
        let api = api_for(temp.path(), Value::Null);

        let reply = api.get_acquisition_status("99");
        assert_eq!(reply["success"], true);
        assert_eq!(reply["state"]["status"], "unknown");
        assert_eq!(reply["state"]["bytesRead"], 0);
        assert_eq!(reply["state"]["totalBytes"], 0);
        assert_eq!(reply["state"]["currentSource"], "");
    }

    #[test]
    fn test_start_replies_success() {
        let temp = TempDir::new().unwrap();
        let api = api_for(temp.path(), Value::Null);

        assert_eq!(api.start_acquisition("440"), json!({"success": true}));
        api.shutdown();
        let state = api.get_acquisition_status("440");
        assert_ne!(state["state"]["status"], "unknown");
    }

    #[test]
    fn test_has_and_remove() {
        let temp = TempDir::new().unwrap();
        let api = api_for(temp.path(), Value::Null);
        let layout = api.layout().unwrap();
        fs::create_dir_all(layout.plugin_dir()).unwrap();
        fs::write(layout.disabled_path(440), "x").unwrap();

        assert_eq!(
            api.has_primary_file("440"),
            json!({"success": true, "exists": true})
        );
        assert_eq!(
            api.remove_primary_file("440"),
            json!({"success": true, "removed": true})
        );
        assert_eq!(
            api.remove_primary_file("440"),
            json!({"success": true, "removed": false})
        );
        assert_eq!(api.has_primary_file("440")["exists"], false);
    }

    #[test]
    fn test_unknown_steam_root() {
        let api = api_for(Path::new(""), Value::Null);
        assert_eq!(api.has_primary_file("1")["exists"], false);
        assert_eq!(api.remove_primary_file("1")["removed"], false);
        assert_eq!(
            api.sweep_installed(),
            json!({"success": false, "error": "Steam path not found"})
        );
    }

    #[test]
    fn test_add_discovered_entries_reply() {
        let temp = TempDir::new().unwrap();
        let api = api_for(
            temp.path(),
            json!({"440": {"success": true, "data": {"dlc": [441, 442]}}}),
        );

        assert_eq!(
            api.add_discovered_entries("440"),
            json!({"success": true, "message": "Added 2 DLCs"})
        );
        assert_eq!(
            api.add_discovered_entries("440"),
            json!({"success": true, "message": "Added 0 DLCs"})
        );
    }

    #[test]
    fn test_add_discovered_entries_app_not_found() {
        let temp = TempDir::new().unwrap();
        let api = api_for(temp.path(), json!({}));
        assert_eq!(
            api.add_discovered_entries("440"),
            json!({"success": false, "error": "App not found or API error"})
        );
    }

    #[test]
    fn test_sweep_reply() {
        let temp = TempDir::new().unwrap();
        let api = api_for(temp.path(), Value::Null);
        let layout = api.layout().unwrap();
        fs::create_dir_all(layout.plugin_dir()).unwrap();
        fs::write(layout.primary_path(1), "setManifestid(1)\n").unwrap();

        let reply = api.sweep_installed();
        assert_eq!(reply["success"], true);
        assert_eq!(reply["filesModified"], 1);
        assert_eq!(reply["linesCommented"], 1);
    }

    #[test]
    fn test_cancel_without_run() {
        let temp = TempDir::new().unwrap();
        let api = api_for(temp.path(), Value::Null);
        assert_eq!(
            api.cancel_acquisition("5"),
            json!({"success": true, "cancelled": false})
        );
    }
}
