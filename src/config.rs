//! TOML configuration for the client security layer.
//!
//! Every field has a default, so an empty or missing file yields a working
//! configuration:
//! - `load(path)` - reads a specific file
//! - `load_default()` - reads `<config_dir>/fraudguard/config.toml` when it exists

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{FraudGuardError, Result};

const APP_DIR: &str = "fraudguard";
const CONFIG_FILE: &str = "config.toml";
const MAX_SESSION_TTL_SECS: i64 = 365 * 24 * 60 * 60;

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Config {
    pub network: NetworkConfig,
    pub auth: AuthConfig,
    pub monitor: MonitorConfig,
    pub storage: StorageConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct NetworkConfig {
    /// Base URL of the analysis API (`/analyze/*`, `/dashboard`, `/history`).
    pub api_base_url: String,
    /// Base URL of the auth server (`/auth/verify`, `/auth/refresh`).
    pub auth_base_url: String,
    pub request_timeout_secs: u64,
    pub user_agent: String,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            api_base_url: "http://localhost:8000".to_string(),
            auth_base_url: "http://localhost:3000".to_string(),
            request_timeout_secs: 15,
            user_agent: "FraudGuard/1.0".to_string(),
        }
    }
}

impl NetworkConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AuthConfig {
    /// Session lifetime used when the verify response carries no `exp` claim.
    pub session_ttl_secs: i64,
    /// Refresh attempts made for an expired session before forcing logout.
    pub refresh_attempts: u32,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            session_ttl_secs: 24 * 60 * 60,
            refresh_attempts: 1,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct MonitorConfig {
    pub poll_interval_secs: u64,
    pub observed_process_cap: usize,
    pub poll_timeout_secs: u64,
    pub check_installed_packages: bool,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: 120,
            observed_process_cap: 50,
            poll_timeout_secs: 30,
            check_installed_packages: true,
        }
    }
}

impl MonitorConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    pub fn poll_timeout(&self) -> Duration {
        Duration::from_secs(self.poll_timeout_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct StorageConfig {
    /// Directory holding the alert database. Defaults to `<data_dir>/fraudguard`.
    pub data_dir: Option<PathBuf>,
    pub keyring_service: String,
    pub alerts_db: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: None,
            keyring_service: "fraudguard-session".to_string(),
            alerts_db: "alerts.db".to_string(),
        }
    }
}

impl StorageConfig {
    pub fn resolved_data_dir(&self) -> Result<PathBuf> {
        match &self.data_dir {
            Some(dir) => Ok(dir.clone()),
            None => dirs::data_dir()
                .map(|d| d.join(APP_DIR))
                .ok_or_else(|| FraudGuardError::Config("No data directory on this platform".to_string())),
        }
    }

    pub fn alerts_db_path(&self) -> Result<PathBuf> {
        Ok(self.resolved_data_dir()?.join(&self.alerts_db))
    }
}

impl Config {
    /// Parse configuration from a TOML string.
    pub fn from_toml(content: &str) -> Result<Self> {
        let config: Config =
            toml::from_str(content).map_err(|e| FraudGuardError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a TOML file at the given path.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {:?}", path))
            .map_err(|e| FraudGuardError::Config(format!("{:#}", e)))?;
        let config = Self::from_toml(&content)?;
        info!("Loaded config from {:?}", path);
        Ok(config)
    }

    /// Load `<config_dir>/fraudguard/config.toml`, falling back to defaults
    /// when the file does not exist.
    pub fn load_default() -> Result<Self> {
        match Self::default_path() {
            Some(path) if path.exists() => Self::load(&path),
            Some(path) => {
                debug!("No config file at {:?}, using defaults", path);
                Ok(Self::default())
            }
            None => Ok(Self::default()),
        }
    }

    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|d| d.join(APP_DIR).join(CONFIG_FILE))
    }

    fn validate(&self) -> Result<()> {
        if self.network.request_timeout_secs == 0 {
            return Err(FraudGuardError::Config(
                "network.request_timeout_secs must be greater than zero".to_string(),
            ));
        }
        if self.monitor.poll_interval_secs == 0 {
            return Err(FraudGuardError::Config(
                "monitor.poll_interval_secs must be greater than zero".to_string(),
            ));
        }
        if !(1..=MAX_SESSION_TTL_SECS).contains(&self.auth.session_ttl_secs) {
            return Err(FraudGuardError::Config(format!(
                "auth.session_ttl_secs must be between 1 and {}",
                MAX_SESSION_TTL_SECS
            )));
        }
        for (name, value) in [
            ("network.api_base_url", &self.network.api_base_url),
            ("network.auth_base_url", &self.network.auth_base_url),
        ] {
            url::Url::parse(value)
                .map_err(|e| FraudGuardError::Config(format!("{} is not a valid URL: {}", name, e)))?;
        }
        Ok(())
    }
}
