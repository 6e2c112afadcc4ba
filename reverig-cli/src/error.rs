//! CLI error type.

use std::process::ExitCode;

use reverig::api::ApiError;
use reverig::config::ConfigError;
use reverig::logging::LoggingError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CliError {
    #[error("{0}")]
    Config(#[from] ConfigError),

    #[error("{0}")]
    Logging(#[from] LoggingError),

    #[error("{0}")]
    Api(#[from] ApiError),

    #[error("Failed to set signal handler: {0}")]
    Signal(#[from] ctrlc::Error),

    /// The backend answered `success: false`.
    #[error("{0}")]
    Rejected(String),

    /// The acquisition ended in `failed`.
    #[error("Acquisition failed: {0}")]
    AcquisitionFailed(String),

    #[error("Acquisition cancelled")]
    Cancelled,
}

impl CliError {
    /// Process exit code for this error.
    pub fn exit_code(&self) -> ExitCode {
        match self {
            CliError::Cancelled => ExitCode::from(130),
            CliError::Config(_) | CliError::Logging(_) => ExitCode::from(2),
            _ => ExitCode::FAILURE,
        }
    }
}
