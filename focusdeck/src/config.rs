use crate::stats::DEFAULT_DAILY_GOAL_SECONDS;
use crate::sync::RetryPolicy;
use anyhow::{Context, Result};
use chrono::Weekday;
use directories::ProjectDirs;
use serde::Deserialize;
use std::fs;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct Config {
    pub remote: RemoteConfig,
    pub sync: SyncConfig,
    pub goals: GoalConfig,
    pub ipc: IpcConfig,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct RemoteConfig {
    /// Project URL of the row-store. Unset means an offline session.
    pub url: Option<String>,
    pub api_key: Option<String>,
    pub table: String,
    pub timeout_secs: u64,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct SyncConfig {
    pub max_attempts: u32,
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
    pub reconcile_interval_secs: u64,
    pub snapshot_interval_secs: u64,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct GoalConfig {
    pub daily_seconds: u64,
    pub week_starts_on: WeekStart,
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum WeekStart {
    #[default]
    Sunday,
    Monday,
}

impl From<WeekStart> for Weekday {
    fn from(start: WeekStart) -> Self {
        match start {
            WeekStart::Sunday => Weekday::Sun,
            WeekStart::Monday => Weekday::Mon,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct IpcConfig {
    pub socket_path: PathBuf,
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            url: None,
            api_key: None,
            table: "tasks".to_string(),
            timeout_secs: 10,
        }
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            max_attempts: 4,
            initial_backoff_ms: 500,
            max_backoff_ms: 30_000,
            reconcile_interval_secs: 60,
            snapshot_interval_secs: 5,
        }
    }
}

impl Default for GoalConfig {
    fn default() -> Self {
        Self {
            daily_seconds: DEFAULT_DAILY_GOAL_SECONDS,
            week_starts_on: WeekStart::Sunday,
        }
    }
}

impl Default for IpcConfig {
    fn default() -> Self {
        Self {
            socket_path: focusdeck_ipc::default_socket_path(),
        }
    }
}

impl SyncConfig {
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_attempts.max(1),
            initial_backoff: Duration::from_millis(self.initial_backoff_ms),
            max_backoff: Duration::from_millis(self.max_backoff_ms),
        }
    }
}

impl Config {
    pub fn from_toml_str(s: &str) -> Result<Self> {
        toml::from_str(s).context("Failed to parse config")
    }

    /// Overrides from `FOCUSDECK_URL`, `FOCUSDECK_API_KEY` and `FOCUSDECK_SOCKET`.
    pub fn apply_env(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(url) = lookup("FOCUSDECK_URL") {
            self.remote.url = Some(url);
        }
        if let Some(key) = lookup("FOCUSDECK_API_KEY") {
            self.remote.api_key = Some(key);
        }
        if let Some(socket) = lookup("FOCUSDECK_SOCKET") {
            self.ipc.socket_path = PathBuf::from(socket);
        }
    }
}

pub fn load_config() -> Result<Config> {
    let mut config = match ProjectDirs::from("dev", "focusdeck", "focusdeck") {
        Some(proj_dirs) => {
            let path = proj_dirs.config_dir().join("focusdeck.toml");
            if path.exists() {
                let config_str = fs::read_to_string(&path)
                    .with_context(|| format!("Failed to read config file at {:?}", path))?;
                Config::from_toml_str(&config_str)
                    .with_context(|| format!("Invalid config file at {:?}", path))?
            } else {
                Config::default()
            }
        }
        None => Config::default(),
    };
    config.apply_env();
    Ok(config)
}
