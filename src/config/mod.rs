//! Configuration loading and validation.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

use crate::models::{default_seasons, Season};
use crate::parse_duration;

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),

    #[error("Failed to parse config: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("Invalid configuration: {0}")]
    ValidationError(String),
}

/// Where the contract workbook comes from and how it is laid out.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceConfig {
    /// HTTP(S) URL of the workbook
    #[serde(default = "default_workbook_url")]
    pub workbook_url: String,

    /// Local workbook path; takes precedence over the URL when set
    #[serde(default)]
    pub workbook_path: Option<PathBuf>,

    #[serde(default = "default_agents_sheet")]
    pub agents_sheet: String,

    #[serde(default = "default_ranks_sheet")]
    pub ranks_sheet: String,

    #[serde(default = "default_agencies_sheet")]
    pub agencies_sheet: String,

    #[serde(default = "default_players_sheet")]
    pub players_sheet: String,

    /// Seasons tracked by the workbook
    #[serde(default = "default_seasons")]
    pub seasons: Vec<Season>,

    /// How long a loaded dataset stays fresh (e.g. "6h"). Unset caches
    /// until an explicit refresh.
    #[serde(default)]
    pub cache_ttl: Option<String>,

    /// Refetch the workbook on every dataset access
    #[serde(default)]
    pub force_reload: bool,

    /// Timeout in seconds
    #[serde(default = "default_timeout")]
    pub timeout_seconds: u64,
}

fn default_workbook_url() -> String {
    "https://raw.githubusercontent.com/ethanhetu/agent-dashboard/main/AP%20Final.xlsx".to_string()
}

fn default_agents_sheet() -> String {
    "Agents".to_string()
}

fn default_ranks_sheet() -> String {
    "Agent Ranks".to_string()
}

fn default_agencies_sheet() -> String {
    "Agencies".to_string()
}

fn default_players_sheet() -> String {
    "PIBA".to_string()
}

fn default_timeout() -> u64 {
    60
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            workbook_url: default_workbook_url(),
            workbook_path: None,
            agents_sheet: default_agents_sheet(),
            ranks_sheet: default_ranks_sheet(),
            agencies_sheet: default_agencies_sheet(),
            players_sheet: default_players_sheet(),
            seasons: default_seasons(),
            cache_ttl: None,
            force_reload: false,
            timeout_seconds: default_timeout(),
        }
    }
}

impl SourceConfig {
    /// Parsed `cache_ttl`; `None` means cache indefinitely.
    pub fn cache_ttl(&self) -> Option<Duration> {
        self.cache_ttl.as_deref().and_then(parse_duration)
    }
}

/// Server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(default = "default_cors_origin")]
    pub cors_origin: String,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_cors_origin() -> String {
    "*".to_string()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            cors_origin: default_cors_origin(),
        }
    }
}

/// Leaderboard rules.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LeaderboardConfig {
    /// Agents never shown on leaderboards (placeholder or incomplete rows)
    #[serde(default = "default_excluded_agents")]
    pub excluded_agents: Vec<String>,

    /// A group needs more than this many clients in a season to get a
    /// season-level capture figure
    #[serde(default = "default_min_clients")]
    pub min_clients: u32,

    /// Clients listed in the best/worst deal lists on a profile
    #[serde(default = "default_client_list_size")]
    pub client_list_size: usize,
}

fn default_excluded_agents() -> Vec<String> {
    vec![
        "Unknown".to_string(),
        "No Agent".to_string(),
        "Not Listed".to_string(),
        "Self-Represented".to_string(),
    ]
}

fn default_min_clients() -> u32 {
    crate::calculate::DEFAULT_MIN_CLIENTS
}

fn default_client_list_size() -> usize {
    5
}

impl Default for LeaderboardConfig {
    fn default() -> Self {
        Self {
            excluded_agents: default_excluded_agents(),
            min_clients: default_min_clients(),
            client_list_size: default_client_list_size(),
        }
    }
}

/// Headshot images, already extracted to a local directory.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HeadshotConfig {
    /// Images already on disk; takes precedence over the archive
    #[serde(default)]
    pub dir: Option<PathBuf>,

    /// Zip of headshot images, downloaded once and extracted under
    /// `data_dir/headshots`
    #[serde(default)]
    pub archive_url: Option<String>,
}

/// Main application configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    #[serde(default = "default_log_level")]
    pub log_level: String,

    #[serde(default)]
    pub source: SourceConfig,

    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub leaderboard: LeaderboardConfig,

    #[serde(default)]
    pub headshots: HeadshotConfig,

    /// Extra name corrections: malformed name -> display name
    #[serde(default)]
    pub name_corrections: HashMap<String, String>,
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("./data")
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            log_level: default_log_level(),
            source: SourceConfig::default(),
            server: ServerConfig::default(),
            leaderboard: LeaderboardConfig::default(),
            headshots: HeadshotConfig::default(),
            name_corrections: HashMap::new(),
        }
    }
}

impl AppConfig {
    /// Load configuration from a TOML file.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        let config: AppConfig = toml::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Load from `path` if it exists, otherwise use defaults.
    pub fn load_or_default(path: &Path) -> Result<Self, ConfigError> {
        if path.exists() {
            Self::from_file(path)
        } else {
            tracing::debug!("No config at {:?}, using defaults", path);
            Ok(Self::default())
        }
    }

    /// Directory for downloaded workbook files.
    pub fn raw_dir(&self) -> PathBuf {
        self.data_dir.join("raw")
    }

    /// Where the headshot archive is extracted.
    pub fn headshots_dir(&self) -> PathBuf {
        self.data_dir.join("headshots")
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.source.timeout_seconds == 0 {
            return Err(ConfigError::ValidationError(
                "Source timeout must be greater than 0".to_string(),
            ));
        }

        if self.source.workbook_path.is_none() && url::Url::parse(&self.source.workbook_url).is_err() {
            return Err(ConfigError::ValidationError(format!(
                "Invalid workbook URL: {}",
                self.source.workbook_url
            )));
        }

        if let Some(archive) = &self.headshots.archive_url {
            if url::Url::parse(archive).is_err() {
                return Err(ConfigError::ValidationError(format!(
                    "Invalid headshot archive URL: {}",
                    archive
                )));
            }
        }

        if self.source.seasons.is_empty() {
            return Err(ConfigError::ValidationError(
                "At least one season must be configured".to_string(),
            ));
        }

        if let Some(ttl) = &self.source.cache_ttl {
            if parse_duration(ttl).is_none() {
                return Err(ConfigError::ValidationError(format!(
                    "Invalid cache_ttl: {}",
                    ttl
                )));
            }
        }

        if self.server.port == 0 {
            return Err(ConfigError::ValidationError(
                "Server port must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }
}
