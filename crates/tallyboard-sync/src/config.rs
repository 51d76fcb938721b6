//! Dashboard configuration file and refresh settings.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tallyboard_filters::{ConfigError, FilterDefinition, FilterGraph};

/// Periodic refresh intervals the dashboard offers, in minutes.
pub const ALLOWED_INTERVALS: [u32; 6] = [1, 5, 10, 15, 30, 60];

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RefreshConfigError {
    #[error("refresh interval of {0} minutes is not supported (allowed: {allowed:?})", allowed = ALLOWED_INTERVALS)]
    UnsupportedInterval(u32),
}

/// A validated periodic refresh interval.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "u32", into = "u32")]
pub struct RefreshInterval(u32);

impl RefreshInterval {
    pub fn from_minutes(minutes: u32) -> Result<Self, RefreshConfigError> {
        if ALLOWED_INTERVALS.contains(&minutes) {
            Ok(Self(minutes))
        } else {
            Err(RefreshConfigError::UnsupportedInterval(minutes))
        }
    }

    pub fn minutes(self) -> u32 {
        self.0
    }

    pub fn as_duration(self) -> Duration {
        Duration::from_secs(u64::from(self.0) * 60)
    }
}

impl Default for RefreshInterval {
    fn default() -> Self {
        Self(5)
    }
}

impl TryFrom<u32> for RefreshInterval {
    type Error = RefreshConfigError;

    fn try_from(minutes: u32) -> Result<Self, Self::Error> {
        Self::from_minutes(minutes)
    }
}

impl From<RefreshInterval> for u32 {
    fn from(interval: RefreshInterval) -> Self {
        interval.0
    }
}

/// Timer settings for the refresh scheduler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RefreshConfig {
    pub interval: RefreshInterval,
    /// Quiet period after the last filter change before fetching.
    pub debounce: Duration,
    /// Quiet period after the last manual refresh request.
    pub manual_debounce: Duration,
}

impl Default for RefreshConfig {
    fn default() -> Self {
        Self {
            interval: RefreshInterval::default(),
            debounce: Duration::from_millis(300),
            manual_debounce: Duration::from_millis(500),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    #[error("cannot read {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("invalid configuration: {0}")]
    Json(#[from] serde_json::Error),
    #[error(transparent)]
    Filters(#[from] ConfigError),
    #[error(transparent)]
    Refresh(#[from] RefreshConfigError),
    #[error("slotCount must be at least 1")]
    NoSlots,
}

fn default_slot_count() -> usize {
    4
}

fn default_interval_minutes() -> u32 {
    RefreshInterval::default().minutes()
}

fn default_debounce_ms() -> u64 {
    300
}

fn default_manual_debounce_ms() -> u64 {
    500
}

fn default_state_path() -> PathBuf {
    PathBuf::from("./tallyboard-state.json")
}

fn default_backend_url() -> String {
    "http://127.0.0.1:5000".to_string()
}

/// Everything a dashboard needs at startup, as read from a JSON file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardConfig {
    pub filters: Vec<FilterDefinition>,
    #[serde(default = "default_slot_count")]
    pub slot_count: usize,
    #[serde(default = "default_interval_minutes")]
    pub refresh_interval_minutes: u32,
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,
    #[serde(default = "default_manual_debounce_ms")]
    pub manual_debounce_ms: u64,
    #[serde(default = "default_state_path")]
    pub state_path: PathBuf,
    #[serde(default = "default_backend_url")]
    pub backend_url: String,
}

impl Default for DashboardConfig {
    fn default() -> Self {
        Self {
            filters: Vec::new(),
            slot_count: default_slot_count(),
            refresh_interval_minutes: default_interval_minutes(),
            debounce_ms: default_debounce_ms(),
            manual_debounce_ms: default_manual_debounce_ms(),
            state_path: default_state_path(),
            backend_url: default_backend_url(),
        }
    }
}

impl DashboardConfig {
    /// Read and validate a configuration file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, SettingsError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| SettingsError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json(&text)
    }

    pub fn from_json(text: &str) -> Result<Self, SettingsError> {
        let config: Self = serde_json::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), SettingsError> {
        if self.slot_count == 0 {
            return Err(SettingsError::NoSlots);
        }
        self.filter_graph()?;
        self.refresh_config()?;
        Ok(())
    }

    pub fn filter_graph(&self) -> Result<FilterGraph, ConfigError> {
        FilterGraph::new(self.filters.clone())
    }

    pub fn refresh_config(&self) -> Result<RefreshConfig, RefreshConfigError> {
        Ok(RefreshConfig {
            interval: RefreshInterval::from_minutes(self.refresh_interval_minutes)?,
            debounce: Duration::from_millis(self.debounce_ms),
            manual_debounce: Duration::from_millis(self.manual_debounce_ms),
        })
    }

    /// Source columns of every declared filter, in declaration order.
    pub fn columns(&self) -> Vec<String> {
        self.filters.iter().map(|f| f.source_column.clone()).collect()
    }
}
