//! Acquisition errors.
//!
//! Routines never return an [`AcquireFailure`] to a caller. It is rendered
//! into the `error` field of the acquisition state. [`StartError`] is the
//! only error a caller of [`Acquirer::start`](super::Acquirer::start) sees.

use std::io;

use thiserror::Error;

use crate::install::InstallError;

/// Why an acquisition routine stopped short of `done`.
#[derive(Debug, Error)]
pub enum AcquireFailure {
    /// Every source was tried and none provided the archive.
    #[error("Not available on any source")]
    Exhausted,

    /// The archive was downloaded but could not be installed.
    #[error("Processing failed: {0}")]
    Install(InstallError),

    /// A cancel request or shutdown stopped the routine.
    #[error("Acquisition cancelled")]
    Cancelled,

    /// The routine panicked; the payload message is attached.
    #[error("Acquisition aborted: {0}")]
    Aborted(String),
}

impl From<InstallError> for AcquireFailure {
    fn from(err: InstallError) -> Self {
        match err {
            InstallError::Cancelled => Self::Cancelled,
            other => Self::Install(other),
        }
    }
}

/// A start request that could not be accepted.
#[derive(Debug, Error)]
pub enum StartError {
    /// The acquirer has been shut down.
    #[error("acquirer is shut down")]
    ShutDown,

    /// The worker thread could not be spawned.
    #[error("failed to spawn acquisition worker: {0}")]
    Spawn(#[source] io::Error),
}
