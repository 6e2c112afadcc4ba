//! Presence checks and removal of installed scripts.

use std::fs;
use std::io;
use std::path::PathBuf;

use thiserror::Error;
use tracing::info;

use crate::layout::SteamLayout;

/// Failure while removing an installed script.
#[derive(Debug, Error)]
#[error("failed to remove {}: {source}", path.display())]
pub struct PresenceError {
    pub path: PathBuf,
    #[source]
    pub source: io::Error,
}

/// Whether an app has an installed script, enabled or disabled.
pub fn has_primary_file(layout: &SteamLayout, app_id: u32) -> bool {
    layout.primary_path(app_id).is_file() || layout.disabled_path(app_id).is_file()
}

/// Delete the enabled and disabled scripts of an app.
///
/// Returns whether anything was deleted. Missing files are not an error.
pub fn remove_primary_file(layout: &SteamLayout, app_id: u32) -> Result<bool, PresenceError> {
    let mut removed = false;
    for path in [layout.primary_path(app_id), layout.disabled_path(app_id)] {
        match fs::remove_file(&path) {
            Ok(()) => {
                info!(app_id, path = %path.display(), "removed script");
                removed = true;
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => return Err(PresenceError { path, source: e }),
        }
    }
    Ok(removed)
}
