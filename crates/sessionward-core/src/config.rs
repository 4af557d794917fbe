//! Application configuration management.
//!
//! Holds the API base URL, the demo flag, the last used username and the
//! session timing knobs. Configuration is stored at
//! `~/.config/sessionward/config.json`; environment variables override the
//! file after loading. Nothing secret is ever written here.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Application name used for config/cache directory paths
pub const APP_NAME: &str = "sessionward";

/// Config file name
const CONFIG_FILE: &str = "config.json";

/// Environment variable overriding `api_base_url`
const ENV_API_URL: &str = "SESSIONWARD_API_URL";

/// Environment variable overriding `demo_mode`
const ENV_DEMO: &str = "SESSIONWARD_DEMO";

const DEFAULT_API_BASE_URL: &str = "http://localhost:8080";

/// HTTP request timeout in seconds.
const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub api_base_url: String,
    /// Sandbox/demo context: no real session to protect, so forced logouts
    /// do not navigate to the login view.
    pub demo_mode: bool,
    pub last_username: Option<String>,
    pub request_timeout_secs: u64,
    pub session: SessionSettings,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_base_url: DEFAULT_API_BASE_URL.to_string(),
            demo_mode: false,
            last_username: None,
            request_timeout_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
            session: SessionSettings::default(),
        }
    }
}

impl Config {
    /// Load the config file (defaults when absent) and apply environment overrides.
    pub fn load() -> Result<Self> {
        let path = Self::config_path()?;
        let mut config = if path.exists() {
            let contents = std::fs::read_to_string(&path)
                .with_context(|| format!("Failed to read config file {}", path.display()))?;
            serde_json::from_str(&contents).context("Failed to parse config file")?
        } else {
            debug!(path = %path.display(), "No config file, using defaults");
            Self::default()
        };
        config.apply_env_overrides(|key| std::env::var(key).ok());
        Ok(config)
    }

    pub fn save(&self) -> Result<()> {
        let path = Self::config_path()?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let contents = serde_json::to_string_pretty(self)?;
        std::fs::write(path, contents)?;
        Ok(())
    }

    fn apply_env_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(url) = lookup(ENV_API_URL).map(|v| v.trim().to_string()) {
            if !url.is_empty() {
                self.api_base_url = url;
            }
        }
        if let Some(flag) = lookup(ENV_DEMO) {
            self.demo_mode = matches!(flag.trim().to_lowercase().as_str(), "1" | "true" | "yes" | "on");
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find config directory"))?;
        Ok(config_dir.join(APP_NAME).join(CONFIG_FILE))
    }

    /// Directory for log files
    pub fn log_dir(&self) -> Result<PathBuf> {
        let cache_dir = dirs::cache_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find cache directory"))?;
        Ok(cache_dir.join(APP_NAME).join("logs"))
    }
}

/// Timing knobs for renewal scheduling, activity-driven renewal and the
/// expiry countdown. Stored as seconds so the JSON stays readable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionSettings {
    /// Renew this long before the access credential expires.
    pub renewal_buffer_secs: u64,
    /// Below this delay the schedule is not armed at all.
    pub min_schedule_delay_secs: u64,
    /// Extra attempts after a failed scheduled renewal.
    pub schedule_retry_attempts: u32,
    pub schedule_retry_delay_secs: u64,
    /// At most one activity evaluation per window.
    pub activity_throttle_secs: u64,
    /// Activity renews only when less than this much lifetime remains.
    pub activity_renewal_threshold_secs: u64,
    /// Minimum gap between two activity-triggered renewals.
    pub activity_cooldown_secs: u64,
    pub expiry_warning_secs: u64,
    pub expiry_poll_secs: u64,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            renewal_buffer_secs: 60,
            min_schedule_delay_secs: 120,
            schedule_retry_attempts: 2,
            schedule_retry_delay_secs: 5,
            activity_throttle_secs: 30,
            activity_renewal_threshold_secs: 300,
            activity_cooldown_secs: 60,
            expiry_warning_secs: 120,
            expiry_poll_secs: 1,
        }
    }
}

impl SessionSettings {
    pub fn renewal_buffer(&self) -> Duration {
        Duration::from_secs(self.renewal_buffer_secs)
    }

    pub fn min_schedule_delay(&self) -> Duration {
        Duration::from_secs(self.min_schedule_delay_secs)
    }

    pub fn schedule_retry_delay(&self) -> Duration {
        Duration::from_secs(self.schedule_retry_delay_secs)
    }

    pub fn activity_throttle(&self) -> Duration {
        Duration::from_secs(self.activity_throttle_secs)
    }

    pub fn activity_renewal_threshold(&self) -> Duration {
        Duration::from_secs(self.activity_renewal_threshold_secs)
    }

    pub fn activity_cooldown(&self) -> Duration {
        Duration::from_secs(self.activity_cooldown_secs)
    }

    pub fn expiry_warning(&self) -> Duration {
        Duration::from_secs(self.expiry_warning_secs)
    }

    pub fn expiry_poll(&self) -> Duration {
        Duration::from_secs(self.expiry_poll_secs.max(1))
    }
}
