//! Error types for the install pipeline.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Result type for install operations.
pub type InstallResult<T> = Result<T, InstallError>;

/// Errors that abort an installation.
///
/// Auxiliary manifest extraction never produces one of these; its failures
/// are collected in an [`AuxiliaryReport`](super::AuxiliaryReport).
#[derive(Debug, Error)]
pub enum InstallError {
    /// No Steam root could be determined.
    #[error("Steam install path not found")]
    InstallBaseUnknown,

    /// Failed to create a target directory.
    #[error("failed to create directory {}: {source}", path.display())]
    CreateDirFailed { path: PathBuf, source: io::Error },

    /// Failed to open the downloaded archive.
    #[error("failed to open archive {}: {source}", path.display())]
    ArchiveUnreadable { path: PathBuf, source: io::Error },

    /// The downloaded file is not a readable zip archive.
    #[error("invalid archive {}: {source}", path.display())]
    ArchiveInvalid {
        path: PathBuf,
        source: zip::result::ZipError,
    },

    /// The archive holds no `<digits>.lua` entry.
    #[error("No numeric .lua file found in zip")]
    NoPrimaryFileFound,

    /// Failed to read the chosen entry.
    #[error("failed to read archive entry {name}: {reason}")]
    EntryUnreadable { name: String, reason: String },

    /// Failed to write the installed script.
    #[error("failed to write {}: {source}", path.display())]
    WriteFailed { path: PathBuf, source: io::Error },

    /// The acquisition was cancelled mid-install.
    #[error("installation cancelled")]
    Cancelled,
}
