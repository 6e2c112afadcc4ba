//! Shared setup for CLI commands: configuration, logging and the backend.

use std::path::PathBuf;

use reverig::config::ConfigFile;
use reverig::logging::{init_logging, WorkerGuard};
use reverig::PluginApi;
use tracing::{debug, info};

use crate::error::CliError;

/// Global options from the command line.
#[derive(Debug, Clone, Default)]
pub struct RunnerOptions {
    pub config_path: Option<PathBuf>,
    pub steam_path: Option<PathBuf>,
    pub log_level: Option<String>,
}

/// Loaded configuration plus the logging guard.
pub struct CliRunner {
    config: ConfigFile,
    _log_guard: Option<WorkerGuard>,
}

impl CliRunner {
    /// Load configuration, apply command-line overrides and start logging.
    pub fn new(options: RunnerOptions) -> Result<Self, CliError> {
        let mut config = match options.config_path {
            Some(ref path) => ConfigFile::load(path)?,
            None => ConfigFile::load_default()?,
        };
        if let Some(steam) = options.steam_path {
            config.steam_path = Some(steam);
        }
        if let Some(level) = options.log_level {
            config.log_level = level;
        }

        let guard = init_logging(&config.log_config())?;
        debug!(config = ?options.config_path, "configuration loaded");

        Ok(Self {
            config,
            _log_guard: guard,
        })
    }

    pub fn config(&self) -> &ConfigFile {
        &self.config
    }

    /// Log a startup line for a command.
    pub fn log_startup(&self, command: &str) {
        info!(
            command,
            version = env!("CARGO_PKG_VERSION"),
            steam = ?self.config.steam_path,
            "reverig starting"
        );
    }

    /// Build the backend from the loaded configuration.
    pub fn create_api(&self) -> Result<PluginApi, CliError> {
        Ok(PluginApi::from_config(&self.config)?)
    }
}
