//! Extract-and-patch installer.
//!
//! The installation workflow for one downloaded archive:
//! 1. Resolve `<steam>/config/stplug-in` and create it if missing
//! 2. Open the zip and list its entries
//! 3. Copy every `*.manifest` entry into `<steam>/depotcache` (best effort)
//! 4. Pick the primary `<digits>.lua` entry
//! 5. Decode it and comment out `setManifestid` lines
//! 6. Write `<steam>/config/stplug-in/<id>.lua`
//!
//! Steps 1–5 are [`Installer::prepare`]; step 6 is [`Installer::commit`]. The
//! orchestrator reports `installing` between the two.

use std::fs::{self, File};
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use zip::ZipArchive;

use super::error::{InstallError, InstallResult};
use super::patch::{
    base_name, decode_text, is_auxiliary, select_primary, CommentOutRule, PatchedText,
};
use crate::layout::{SteamLayout, SteamLocator};

/// Largest entry read into memory. Scripts and manifests are far smaller.
const MAX_ENTRY_BYTES: u64 = 64 * 1024 * 1024;

/// An auxiliary entry that could not be extracted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedEntry {
    pub name: String,
    pub reason: String,
}

/// What happened to the auxiliary manifests of one archive.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AuxiliaryReport {
    /// Files written to the depot cache.
    pub extracted: Vec<PathBuf>,
    /// Entries that were skipped, with the reason.
    pub skipped: Vec<SkippedEntry>,
}

impl AuxiliaryReport {
    /// Whether every auxiliary entry was extracted.
    pub fn is_complete(&self) -> bool {
        self.skipped.is_empty()
    }

    fn skip(&mut self, name: &str, reason: impl Into<String>) {
        let reason = reason.into();
        warn!(entry = name, reason = %reason, "failed to extract manifest");
        self.skipped.push(SkippedEntry {
            name: name.to_string(),
            reason,
        });
    }
}

/// A patched script ready to be written.
#[derive(Debug, Clone)]
pub struct PreparedInstall {
    pub app_id: u32,
    /// Archive entry the script came from.
    pub entry_name: String,
    pub patched: PatchedText,
    /// Where [`Installer::commit`] will write the script.
    pub destination: PathBuf,
    pub auxiliary: AuxiliaryReport,
}

/// Result of a completed installation.
#[derive(Debug, Clone)]
pub struct InstallReport {
    pub app_id: u32,
    pub entry_name: String,
    pub installed_path: PathBuf,
    pub lines_commented: usize,
    pub auxiliary: AuxiliaryReport,
}

#[derive(Debug)]
struct EntryInfo {
    index: usize,
    name: String,
}

/// Installs downloaded archives into the Steam layout.
#[derive(Debug, Clone)]
pub struct Installer {
    locator: Arc<dyn SteamLocator>,
    rule: CommentOutRule,
}

impl Installer {
    /// Create an installer resolving the Steam root through `locator`.
    pub fn new(locator: Arc<dyn SteamLocator>) -> Self {
        Self {
            locator,
            rule: CommentOutRule::default(),
        }
    }

    /// Replace the line rule.
    pub fn with_rule(mut self, rule: CommentOutRule) -> Self {
        self.rule = rule;
        self
    }

    /// Current layout, if the Steam root is known.
    pub fn layout(&self) -> Option<SteamLayout> {
        self.locator.layout()
    }

    /// Run the full pipeline for one archive.
    pub fn install(
        &self,
        app_id: u32,
        archive_path: &Path,
        cancel: &CancellationToken,
    ) -> InstallResult<InstallReport> {
        let prepared = self.prepare(app_id, archive_path, cancel)?;
        self.commit(prepared)
    }

    /// Inspect the archive and build the patched script without installing it.
    pub fn prepare(
        &self,
        app_id: u32,
        archive_path: &Path,
        cancel: &CancellationToken,
    ) -> InstallResult<PreparedInstall> {
        let layout = self.layout().ok_or(InstallError::InstallBaseUnknown)?;
        let target_dir = layout.plugin_dir();
        create_dir(&target_dir)?;

        let file = File::open(archive_path).map_err(|e| InstallError::ArchiveUnreadable {
            path: archive_path.to_path_buf(),
            source: e,
        })?;
        let mut archive = ZipArchive::new(file).map_err(|e| InstallError::ArchiveInvalid {
            path: archive_path.to_path_buf(),
            source: e,
        })?;

        let entries = list_entries(&mut archive);
        debug!(app_id, entries = entries.len(), "archive opened");

        if cancel.is_cancelled() {
            return Err(InstallError::Cancelled);
        }

        let auxiliary = extract_auxiliary(&mut archive, &entries, &layout.depot_cache_dir());

        let chosen = select_primary(entries.iter().map(|e| e.name.as_str()), app_id)
            .ok_or(InstallError::NoPrimaryFileFound)?
            .to_string();
        let index = entries
            .iter()
            .find(|e| e.name == chosen)
            .map(|e| e.index)
            .ok_or(InstallError::NoPrimaryFileFound)?;

        let bytes = read_entry(&mut archive, index).map_err(|reason| {
            InstallError::EntryUnreadable {
                name: chosen.clone(),
                reason,
            }
        })?;

        if cancel.is_cancelled() {
            return Err(InstallError::Cancelled);
        }

        let patched = self.rule.apply(&decode_text(&bytes));
        debug!(
            app_id,
            entry = %chosen,
            lines_commented = patched.lines_commented,
            "script patched"
        );

        Ok(PreparedInstall {
            app_id,
            entry_name: chosen,
            patched,
            destination: layout.primary_path(app_id),
            auxiliary,
        })
    }

    /// Write a prepared script, overwriting any existing file.
    pub fn commit(&self, prepared: PreparedInstall) -> InstallResult<InstallReport> {
        if let Some(parent) = prepared.destination.parent() {
            create_dir(parent)?;
        }
        fs::write(&prepared.destination, prepared.patched.text.as_bytes()).map_err(|e| {
            InstallError::WriteFailed {
                path: prepared.destination.clone(),
                source: e,
            }
        })?;

        info!(
            app_id = prepared.app_id,
            path = %prepared.destination.display(),
            "installed script"
        );

        Ok(InstallReport {
            app_id: prepared.app_id,
            entry_name: prepared.entry_name,
            installed_path: prepared.destination,
            lines_commented: prepared.patched.lines_commented,
            auxiliary: prepared.auxiliary,
        })
    }
}

fn create_dir(path: &Path) -> InstallResult<()> {
    fs::create_dir_all(path).map_err(|e| InstallError::CreateDirFailed {
        path: path.to_path_buf(),
        source: e,
    })
}

/// File entries in central-directory order. Unreadable headers are skipped.
fn list_entries<R: Read + std::io::Seek>(archive: &mut ZipArchive<R>) -> Vec<EntryInfo> {
    let mut entries = Vec::with_capacity(archive.len());
    for index in 0..archive.len() {
        match archive.by_index_raw(index) {
            Ok(entry) if entry.is_dir() => {}
            Ok(entry) => entries.push(EntryInfo {
                index,
                name: entry.name().to_string(),
            }),
            Err(e) => warn!(index, error = %e, "skipping unreadable archive entry"),
        }
    }
    entries
}

fn read_entry<R: Read + std::io::Seek>(
    archive: &mut ZipArchive<R>,
    index: usize,
) -> Result<Vec<u8>, String> {
    let entry = archive.by_index(index).map_err(|e| e.to_string())?;
    if entry.size() > MAX_ENTRY_BYTES {
        return Err(format!(
            "declared size {} exceeds the {} byte limit",
            entry.size(),
            MAX_ENTRY_BYTES
        ));
    }

    // The header size is only a hint; the read itself is bounded too.
    let mut data = Vec::new();
    let mut limited = entry.take(MAX_ENTRY_BYTES + 1);
    limited.read_to_end(&mut data).map_err(|e| e.to_string())?;
    if data.len() as u64 > MAX_ENTRY_BYTES {
        return Err(format!("entry exceeds the {} byte limit", MAX_ENTRY_BYTES));
    }
    Ok(data)
}

fn extract_auxiliary<R: Read + std::io::Seek>(
    archive: &mut ZipArchive<R>,
    entries: &[EntryInfo],
    depot_dir: &Path,
) -> AuxiliaryReport {
    let mut report = AuxiliaryReport::default();
    let manifests: Vec<&EntryInfo> = entries.iter().filter(|e| is_auxiliary(&e.name)).collect();
    if manifests.is_empty() {
        return report;
    }

    if let Err(e) = fs::create_dir_all(depot_dir) {
        let reason = format!("cannot create {}: {}", depot_dir.display(), e);
        for entry in manifests {
            report.skip(&entry.name, reason.clone());
        }
        return report;
    }

    for entry in manifests {
        let file_name = base_name(&entry.name);
        if file_name.is_empty() {
            report.skip(&entry.name, "entry has no file name");
            continue;
        }

        let data = match read_entry(archive, entry.index) {
            Ok(data) => data,
            Err(reason) => {
                report.skip(&entry.name, reason);
                continue;
            }
        };

        let out_path = depot_dir.join(file_name);
        match fs::write(&out_path, &data) {
            Ok(()) => {
                info!(path = %out_path.display(), "extracted manifest");
                report.extracted.push(out_path);
            }
            Err(e) => report.skip(&entry.name, e.to_string()),
        }
    }

    report
}
