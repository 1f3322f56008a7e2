use anyhow::{Context, Result, anyhow};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::{
    collections::HashSet,
    fs,
    path::{Path, PathBuf},
    time::Duration,
};

use crate::{channel::Channel, error::EnvistaError, model::StationId};

pub const DEFAULT_REFRESH_INTERVAL_SECS: u64 = 600;

/// One monitored station and the conditions to expose for it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StationConfig {
    pub station_id: StationId,

    /// Channel keys, e.g. "td" or "rain".
    #[serde(default)]
    pub conditions: Vec<String>,
}

/// Top-level configuration stored on disk.
///
/// Example TOML:
/// ```toml
/// api_token = "..."
/// refresh_interval_secs = 600
///
/// [[stations]]
/// station_id = 178
/// conditions = ["td", "rh", "rain"]
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub api_token: Option<String>,

    /// Override of the IMS Envista base URL.
    pub api_url: Option<String>,

    #[serde(default = "default_refresh_interval_secs")]
    pub refresh_interval_secs: u64,

    /// Per-station fetch timeout enforced by the coordinator.
    pub fetch_timeout_secs: Option<u64>,

    /// "trace", "debug", "info", "warn" or "error".
    pub log_level: Option<String>,

    #[serde(default)]
    pub stations: Vec<StationConfig>,
}

fn default_refresh_interval_secs() -> u64 {
    DEFAULT_REFRESH_INTERVAL_SECS
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_token: None,
            api_url: None,
            refresh_interval_secs: DEFAULT_REFRESH_INTERVAL_SECS,
            fetch_timeout_secs: None,
            log_level: None,
            stations: Vec::new(),
        }
    }
}

impl Config {
    /// Returns the API token, if present and non-empty.
    pub fn api_token(&self) -> Option<&str> {
        self.api_token.as_deref().filter(|t| !t.trim().is_empty())
    }

    pub fn refresh_interval(&self) -> Duration {
        Duration::from_secs(self.refresh_interval_secs)
    }

    pub fn fetch_timeout(&self) -> Option<Duration> {
        self.fetch_timeout_secs.map(Duration::from_secs)
    }

    pub fn station(&self, station_id: StationId) -> Option<&StationConfig> {
        self.stations.iter().find(|s| s.station_id == station_id)
    }

    /// Add a station, replacing an existing entry with the same id.
    pub fn upsert_station(&mut self, station: StationConfig) {
        match self.stations.iter_mut().find(|s| s.station_id == station.station_id) {
            Some(existing) => *existing = station,
            None => self.stations.push(station),
        }
    }

    pub fn remove_station(&mut self, station_id: StationId) -> bool {
        let before = self.stations.len();
        self.stations.retain(|s| s.station_id != station_id);
        self.stations.len() != before
    }

    /// Reject intervals the refresh loop can't run with.
    pub fn check_timing(&self) -> Result<(), EnvistaError> {
        if self.refresh_interval_secs == 0 {
            return Err(EnvistaError::InvalidConfiguration(
                "refresh_interval_secs must be greater than zero".into(),
            ));
        }
        if self.fetch_timeout_secs == Some(0) {
            return Err(EnvistaError::InvalidConfiguration(
                "fetch_timeout_secs must be greater than zero".into(),
            ));
        }
        Ok(())
    }

    /// Check everything that can be checked without talking to the API.
    pub fn validate(&self) -> Result<(), EnvistaError> {
        if self.api_token().is_none() {
            return Err(EnvistaError::InvalidConfiguration("no API token configured".into()));
        }
        self.check_timing()?;

        let mut seen = HashSet::new();
        for station in &self.stations {
            if !seen.insert(station.station_id) {
                return Err(EnvistaError::InvalidConfiguration(format!(
                    "station {} is configured more than once",
                    station.station_id
                )));
            }
            for condition in &station.conditions {
                Channel::try_from(condition.as_str())?;
            }
        }

        Ok(())
    }

    /// Load config from disk, or return an empty default if it doesn't exist yet.
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::config_file_path()?)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            // First run: no config file, return empty.
            return Ok(Self::default());
        }

        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let cfg: Config = toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        Ok(cfg)
    }

    /// Save config to disk, creating parent directories as needed.
    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::config_file_path()?)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create config directory: {}", parent.display())
            })?;
        }

        let toml =
            toml::to_string_pretty(self).context("Failed to serialize configuration to TOML")?;

        fs::write(path, toml)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;

        Ok(())
    }

    /// Path to the config file.
    pub fn config_file_path() -> Result<PathBuf> {
        let dirs = ProjectDirs::from("il", "ims-envista", "envista")
            .ok_or_else(|| anyhow!("Could not determine platform config directory"))?;

        Ok(dirs.config_dir().join("config.toml"))
    }
}
