//! INI configuration file.
//!
//! ```ini
//! [steam]
//! path = /home/me/.local/share/Steam
//!
//! [network]
//! connect_timeout_secs = 8
//! read_timeout_secs = 10
//! request_timeout_secs = 300
//! user_agent = reverig/0.1
//!
//! [downloads]
//! directory = /tmp/reverig
//! keep_archives = true
//!
//! [sources]
//! primary = https://mirror.example/{id}.zip
//! backup = https://other.example/files/{id}
//!
//! [logging]
//! level = debug
//! file = /tmp/reverig.log
//! ```
//!
//! Every key is optional. A non-empty `[sources]` section replaces the
//! built-in list, in file order.

use std::path::{Path, PathBuf};
use std::time::Duration;

use ini::{Ini, ParseOption};
use thiserror::Error;
use tracing::debug;

use crate::acquire::{
    AcquirerConfig, FetcherConfig, SourceList, DEFAULT_USER_AGENT, ID_PLACEHOLDER,
};
use crate::logging::LogConfig;

/// Configuration file name.
pub const CONFIG_FILE_NAME: &str = "reverig.ini";

/// Errors while loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {}: {source}", path.display())]
    Read { path: PathBuf, source: ini::Error },

    #[error("failed to parse config: {0}")]
    Parse(#[from] ini::ParseError),

    #[error("invalid value for [{section}] {key}: '{value}'")]
    InvalidValue {
        section: String,
        key: String,
        value: String,
    },
}

/// Parsed configuration with defaults applied.
#[derive(Debug, Clone)]
pub struct ConfigFile {
    /// Explicit Steam root.
    pub steam_path: Option<PathBuf>,
    pub connect_timeout: Duration,
    pub read_timeout: Duration,
    pub request_timeout: Duration,
    pub user_agent: String,
    pub download_dir: PathBuf,
    pub keep_archives: bool,
    pub sources: SourceList,
    pub log_level: String,
    pub log_file: Option<PathBuf>,
}

impl Default for ConfigFile {
    fn default() -> Self {
        let fetcher = FetcherConfig::default();
        let logging = LogConfig::default();
        Self {
            steam_path: None,
            connect_timeout: fetcher.connect_timeout,
            read_timeout: fetcher.read_timeout,
            request_timeout: fetcher.request_timeout,
            user_agent: DEFAULT_USER_AGENT.to_string(),
            download_dir: default_download_dir(),
            keep_archives: true,
            sources: SourceList::default(),
            log_level: logging.level,
            log_file: None,
        }
    }
}

impl ConfigFile {
    /// Default location: `<config dir>/reverig/reverig.ini`.
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|d| d.join("reverig").join(CONFIG_FILE_NAME))
    }

    /// Load from `path`. A missing file yields the defaults.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            debug!(path = %path.display(), "no config file, using defaults");
            return Ok(Self::default());
        }
        let ini = Ini::load_from_file_opt(path, parse_option()).map_err(|e| ConfigError::Read {
            path: path.to_path_buf(),
            source: e,
        })?;
        Self::from_ini(&ini)
    }

    /// Load from the default location, or defaults if there is none.
    pub fn load_default() -> Result<Self, ConfigError> {
        match Self::default_path() {
            Some(path) => Self::load(&path),
            None => Ok(Self::default()),
        }
    }

    /// Parse configuration text.
    pub fn parse(text: &str) -> Result<Self, ConfigError> {
        let ini = Ini::load_from_str_opt(text, parse_option())?;
        Self::from_ini(&ini)
    }

    fn from_ini(ini: &Ini) -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Some(section) = ini.section(Some("steam")) {
            if let Some(path) = non_empty(section.get("path")) {
                config.steam_path = Some(PathBuf::from(path));
            }
        }

        if let Some(section) = ini.section(Some("network")) {
            if let Some(v) = non_empty(section.get("connect_timeout_secs")) {
                config.connect_timeout = parse_secs("network", "connect_timeout_secs", v)?;
            }
            if let Some(v) = non_empty(section.get("read_timeout_secs")) {
                config.read_timeout = parse_secs("network", "read_timeout_secs", v)?;
            }
            if let Some(v) = non_empty(section.get("request_timeout_secs")) {
                config.request_timeout = parse_secs("network", "request_timeout_secs", v)?;
            }
            if let Some(v) = non_empty(section.get("user_agent")) {
                config.user_agent = v.to_string();
            }
        }

        if let Some(section) = ini.section(Some("downloads")) {
            if let Some(v) = non_empty(section.get("directory")) {
                config.download_dir = PathBuf::from(v);
            }
            if let Some(v) = non_empty(section.get("keep_archives")) {
                config.keep_archives = parse_bool("downloads", "keep_archives", v)?;
            }
        }

        if let Some(section) = ini.section(Some("sources")) {
            let mut templates = Vec::new();
            for (key, value) in section.iter() {
                let value = value.trim();
                if !value.contains(ID_PLACEHOLDER) {
                    return Err(invalid("sources", key, value));
                }
                templates.push(value.to_string());
            }
            if !templates.is_empty() {
                config.sources = SourceList::new(templates);
            }
        }

        if let Some(section) = ini.section(Some("logging")) {
            if let Some(v) = non_empty(section.get("level")) {
                config.log_level = v.to_string();
            }
            if let Some(v) = non_empty(section.get("file")) {
                config.log_file = Some(PathBuf::from(v));
            }
        }

        Ok(config)
    }

    /// HTTP settings for the fetcher.
    pub fn fetcher_config(&self) -> FetcherConfig {
        FetcherConfig {
            connect_timeout: self.connect_timeout,
            read_timeout: self.read_timeout,
            request_timeout: self.request_timeout,
            user_agent: self.user_agent.clone(),
        }
    }

    /// Orchestrator settings.
    pub fn acquirer_config(&self) -> AcquirerConfig {
        AcquirerConfig {
            sources: self.sources.clone(),
            download_dir: self.download_dir.clone(),
            keep_archives: self.keep_archives,
        }
    }

    /// Logging settings.
    pub fn log_config(&self) -> LogConfig {
        LogConfig {
            level: self.log_level.clone(),
            file: self.log_file.clone(),
        }
    }
}

/// Backslashes are literal so Windows paths survive.
fn parse_option() -> ParseOption {
    ParseOption {
        enabled_escape: false,
        ..Default::default()
    }
}

fn default_download_dir() -> PathBuf {
    dirs::cache_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join("reverig")
        .join("downloads")
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

fn invalid(section: &str, key: &str, value: &str) -> ConfigError {
    ConfigError::InvalidValue {
        section: section.to_string(),
        key: key.to_string(),
        value: value.to_string(),
    }
}

fn parse_secs(section: &str, key: &str, value: &str) -> Result<Duration, ConfigError> {
    match value.parse::<u64>() {
        Ok(secs) if secs > 0 => Ok(Duration::from_secs(secs)),
        _ => Err(invalid(section, key, value)),
    }
}

fn parse_bool(section: &str, key: &str, value: &str) -> Result<bool, ConfigError> {
    match value.to_ascii_lowercase().as_str() {
        "true" | "yes" | "1" | "on" => Ok(true),
        "false" | "no" | "0" | "off" => Ok(false),
        _ => Err(invalid(section, key, value)),
    }
}
