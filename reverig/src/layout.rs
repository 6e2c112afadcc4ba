//! Steam directory layout and install-path discovery.
//!
//! Everything reverig writes lives under the Steam root:
//!
//! ```text
//! <steam>/
//! ├── config/stplug-in/
//! │   ├── <id>.lua            (installed script)
//! │   ├── <id>.lua.disabled   (disabled script, recognized by presence checks)
//! │   └── Steamtools.lua      (shared discovery file)
//! └── depotcache/
//!     └── <depot>_<manifest>.manifest
//! ```

use std::env;
use std::fmt;
use std::path::{Path, PathBuf};

use parking_lot::Mutex;
use tracing::{info, warn};

use crate::install::patch::{disabled_file_name, primary_file_name};

/// Environment variable checked before the common install locations.
pub const STEAM_PATH_ENV: &str = "STEAM_PATH";

/// Name of the shared discovery file inside the plugin directory.
pub const DISCOVERY_FILE_NAME: &str = "Steamtools.lua";

/// Resolved paths under one Steam root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SteamLayout {
    root: PathBuf,
}

impl SteamLayout {
    /// Create a layout rooted at `root`.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// The Steam root directory.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// `config/stplug-in`, where scripts are installed.
    pub fn plugin_dir(&self) -> PathBuf {
        self.root.join("config").join("stplug-in")
    }

    /// `depotcache`, where auxiliary manifests are extracted.
    pub fn depot_cache_dir(&self) -> PathBuf {
        self.root.join("depotcache")
    }

    /// Installed script path for an app.
    pub fn primary_path(&self, app_id: u32) -> PathBuf {
        self.plugin_dir().join(primary_file_name(app_id))
    }

    /// Disabled script path for an app.
    pub fn disabled_path(&self, app_id: u32) -> PathBuf {
        self.plugin_dir().join(disabled_file_name(app_id))
    }

    /// Shared discovery file path.
    pub fn discovery_file(&self) -> PathBuf {
        self.plugin_dir().join(DISCOVERY_FILE_NAME)
    }
}

/// Source of the Steam root directory.
pub trait SteamLocator: Send + Sync + fmt::Debug {
    /// The Steam root, or `None` if it cannot be determined.
    fn steam_root(&self) -> Option<PathBuf>;

    /// Layout for the located root.
    fn layout(&self) -> Option<SteamLayout> {
        self.steam_root().map(SteamLayout::new)
    }
}

/// Locator that always answers with one known path.
///
/// An empty path means "unknown".
#[derive(Debug, Clone)]
pub struct FixedLocator {
    root: PathBuf,
}

impl FixedLocator {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

impl SteamLocator for FixedLocator {
    fn steam_root(&self) -> Option<PathBuf> {
        if self.root.as_os_str().is_empty() {
            None
        } else {
            Some(self.root.clone())
        }
    }
}

/// Best-effort probe over configured, environment and common locations.
///
/// The first existing directory wins and is cached. A failed probe is not
/// cached, so a Steam install that appears later is still found.
#[derive(Debug, Default)]
pub struct ProbingLocator {
    configured: Option<PathBuf>,
    cached: Mutex<Option<PathBuf>>,
}

impl ProbingLocator {
    /// Create a probe, optionally seeded with an explicitly configured root.
    pub fn new(configured: Option<PathBuf>) -> Self {
        Self {
            configured: configured.filter(|p| !p.as_os_str().is_empty()),
            cached: Mutex::new(None),
        }
    }

    /// Candidate roots in probe order.
    pub fn candidates(&self) -> Vec<PathBuf> {
        let mut candidates = Vec::new();
        if let Some(ref configured) = self.configured {
            candidates.push(configured.clone());
        }
        if let Some(from_env) = env::var_os(STEAM_PATH_ENV).filter(|v| !v.is_empty()) {
            candidates.push(PathBuf::from(from_env));
        }
        candidates.extend(common_locations());
        candidates
    }
}

impl SteamLocator for ProbingLocator {
    fn steam_root(&self) -> Option<PathBuf> {
        if let Some(ref cached) = *self.cached.lock() {
            return Some(cached.clone());
        }

        match self.candidates().into_iter().find(|p| p.is_dir()) {
            Some(found) => {
                info!(path = %found.display(), "Steam install path detected");
                *self.cached.lock() = Some(found.clone());
                Some(found)
            }
            None => {
                warn!("failed to detect Steam install path");
                None
            }
        }
    }
}

#[cfg(target_os = "windows")]
fn common_locations() -> Vec<PathBuf> {
    let mut paths = Vec::new();
    for var in ["ProgramFiles(x86)", "ProgramFiles"] {
        if let Some(dir) = env::var_os(var) {
            paths.push(PathBuf::from(dir).join("Steam"));
        }
    }
    paths.push(PathBuf::from(r"C:\Program Files (x86)\Steam"));
    paths.push(PathBuf::from(r"C:\Program Files\Steam"));
    paths.push(PathBuf::from(r"D:\Steam"));
    paths
}

#[cfg(target_os = "macos")]
fn common_locations() -> Vec<PathBuf> {
    dirs::home_dir()
        .map(|home| vec![home.join("Library/Application Support/Steam")])
        .unwrap_or_default()
}

#[cfg(not(any(target_os = "windows", target_os = "macos")))]
fn common_locations() -> Vec<PathBuf> {
    let mut paths = Vec::new();
    if let Some(home) = dirs::home_dir() {
        paths.push(home.join(".local/share/Steam"));
        paths.push(home.join(".steam/steam"));
    }
    paths.push(PathBuf::from("/usr/share/steam"));
    paths
}
