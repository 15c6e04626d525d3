//! Configuration management for neurocare.
//!
//! Configuration is loaded from multiple sources with precedence:
//! 1. Environment variables (NEUROCARE_*)
//! 2. Config file (<data dir>/config.toml)
//! 3. Default values

use directories::ProjectDirs;
use neurocare_core::SessionConfig;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::CliResult;

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Signed-in user
    pub user: UserConfig,

    /// Session history storage
    pub database: DatabaseConfig,

    /// Session controller settings
    pub session: SessionConfig,

    /// Simulated device settings
    pub device: DeviceConfig,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UserConfig {
    /// User ID sessions are recorded under
    pub id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// SQLite file holding session history
    #[serde(default = "default_database_path")]
    pub path: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceConfig {
    /// Temperature the simulated sensor hovers around, °C
    #[serde(default = "default_baseline_temperature")]
    pub baseline_temperature: f64,

    /// Sensor reading period in milliseconds
    #[serde(default = "default_sensor_interval_ms")]
    pub sensor_interval_ms: u64,

    /// Reported battery level, percent
    #[serde(default = "default_battery")]
    pub battery: u8,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_database_path(),
        }
    }
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            baseline_temperature: default_baseline_temperature(),
            sensor_interval_ms: default_sensor_interval_ms(),
            battery: default_battery(),
        }
    }
}

impl DeviceConfig {
    pub fn sensor_interval(&self) -> Duration {
        Duration::from_millis(self.sensor_interval_ms.max(1))
    }
}

// Default value functions
fn default_data_dir() -> PathBuf {
    if let Some(proj_dirs) = ProjectDirs::from("app", "neurocare", "neurocare") {
        proj_dirs.data_dir().to_path_buf()
    } else {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".neurocare")
    }
}

fn default_database_path() -> PathBuf {
    default_data_dir().join("sessions.db")
}

fn default_baseline_temperature() -> f64 {
    37.0
}

fn default_sensor_interval_ms() -> u64 {
    1000
}

fn default_battery() -> u8 {
    75
}

impl Config {
    /// Load configuration from file and environment.
    pub fn load() -> CliResult<Self> {
        let mut config = Self::load_from(&Self::config_path())?;
        config.apply_env(std::env::var("NEUROCARE_DATABASE_PATH").ok());
        config.session.validate()?;
        Ok(config)
    }

    /// Load from a specific file, falling back to defaults if it is missing.
    pub fn load_from(path: &Path) -> CliResult<Self> {
        if !path.exists() {
            return Ok(Config::default());
        }
        let content = std::fs::read_to_string(path)?;
        Ok(toml::from_str(&content)?)
    }

    fn apply_env(&mut self, database_path: Option<String>) {
        if let Some(path) = database_path.filter(|p| !p.is_empty()) {
            self.database.path = PathBuf::from(path);
        }
    }

    /// Save configuration to file.
    pub fn save_to(&self, path: &Path) -> CliResult<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Get the config file path.
    pub fn config_path() -> PathBuf {
        if let Ok(path) = std::env::var("NEUROCARE_CONFIG") {
            PathBuf::from(path)
        } else {
            default_data_dir().join("config.toml")
        }
    }
}
