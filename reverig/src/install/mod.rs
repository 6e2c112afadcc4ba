//! Installation of downloaded archives into the Steam layout.
//!
//! - `installer`: extract, patch and write the primary script
//! - `patch`: primary-entry selection and the `setManifestid` line rule
//! - `presence`: has/remove queries on installed scripts
//! - `sweep`: re-apply the line rule to scripts already installed

mod error;
mod installer;
pub mod patch;
mod presence;
mod sweep;

pub use error::{InstallError, InstallResult};
pub use installer::{AuxiliaryReport, InstallReport, Installer, PreparedInstall, SkippedEntry};
pub use patch::{CommentOutRule, PatchedText};
pub use presence::{has_primary_file, remove_primary_file, PresenceError};
pub use sweep::{comment_out_installed, SweepFailure, SweepReport};
