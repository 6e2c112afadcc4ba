//! Re-apply the line rule to every script already installed.
//!
//! Scripts installed by other tools, or before the rule existed, may still
//! carry live `setManifestid` calls. The sweep walks the plugin directory and
//! rewrites any `.lua` file the rule changes.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use super::patch::{decode_text, CommentOutRule, PRIMARY_EXTENSION};
use crate::layout::SteamLayout;

/// A script the sweep could not process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SweepFailure {
    pub path: PathBuf,
    pub reason: String,
}

/// Summary of one sweep.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SweepReport {
    /// Scripts examined.
    pub files_scanned: usize,
    /// Scripts rewritten.
    pub files_modified: usize,
    /// Total lines commented out.
    pub lines_commented: usize,
    pub failures: Vec<SweepFailure>,
}

/// Comment out directive lines in every installed script.
///
/// A missing plugin directory yields an empty report.
pub fn comment_out_installed(layout: &SteamLayout, rule: &CommentOutRule) -> SweepReport {
    let dir = layout.plugin_dir();
    let mut report = SweepReport::default();

    let entries = match fs::read_dir(&dir) {
        Ok(entries) => entries,
        Err(e) => {
            debug!(path = %dir.display(), error = %e, "plugin directory not readable, nothing to sweep");
            return report;
        }
    };

    let mut scripts: Vec<PathBuf> = entries
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| is_script(path))
        .collect();
    scripts.sort();

    for path in scripts {
        report.files_scanned += 1;
        match sweep_file(&path, rule) {
            Ok(0) => {}
            Ok(lines) => {
                report.files_modified += 1;
                report.lines_commented += lines;
            }
            Err(reason) => {
                warn!(path = %path.display(), reason = %reason, "failed to sweep script");
                report.failures.push(SweepFailure { path, reason });
            }
        }
    }

    info!(
        scanned = report.files_scanned,
        modified = report.files_modified,
        lines = report.lines_commented,
        "sweep complete"
    );
    report
}

fn is_script(path: &Path) -> bool {
    path.is_file()
        && path
            .extension()
            .map(|ext| ext == PRIMARY_EXTENSION)
            .unwrap_or(false)
}

fn sweep_file(path: &Path, rule: &CommentOutRule) -> Result<usize, String> {
    let bytes = fs::read(path).map_err(|e| e.to_string())?;
    let patched = rule.apply(&decode_text(&bytes));
    if !patched.changed() {
        return Ok(0);
    }
    fs::write(path, patched.text.as_bytes()).map_err(|e| e.to_string())?;
    debug!(path = %path.display(), lines = patched.lines_commented, "script rewritten");
    Ok(patched.lines_commented)
}
