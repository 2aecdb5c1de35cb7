//! Configuration
//!
//! Runtime settings for scanning and the session lifecycle. Loaded from the
//! JSON file named by `HRM_CONFIG`, every field falls back to its default.

use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::constants::{CONFIG_ENV_VAR, HEARTRATE_SERVICE_UUID};

/// How many candidates a scan pass surfaces before the platform scan stops.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiscoveryPolicy {
    /// Stop scanning as soon as the first qualifying peripheral shows up.
    #[default]
    SingleCandidate,
    /// Keep scanning until explicitly stopped.
    MultiCandidate,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScanConfig {
    pub service_filter: Vec<Uuid>,
    pub discovery: DiscoveryPolicy,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            service_filter: vec![HEARTRATE_SERVICE_UUID],
            discovery: DiscoveryPolicy::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// With resume support `pause()` parks the session in `Paused` and
    /// `start()` reconnects; without it `pause()` ends the session.
    pub resume_supported: bool,
    pub connect_timeout_ms: u64,
    pub disconnect_timeout_ms: u64,
}

impl SessionConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn disconnect_timeout(&self) -> Duration {
        Duration::from_millis(self.disconnect_timeout_ms)
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            resume_supported: true,
            connect_timeout_ms: 10_000,
            disconnect_timeout_ms: 5_000,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    #[serde(flatten)]
    pub scan: ScanConfig,
    #[serde(flatten)]
    pub session: SessionConfig,
    pub event_bus_capacity: usize,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            scan: ScanConfig::default(),
            session: SessionConfig::default(),
            event_bus_capacity: 64,
        }
    }
}

impl AppConfig {
    /// Reads the configuration from a JSON file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path)
            .with_context(|| format!("could not read config file {}", path.display()))?;
        serde_json::from_str(&json)
            .with_context(|| format!("invalid config file {}", path.display()))
    }

    /// Loads the file named by `HRM_CONFIG`, or the defaults if it is unset.
    pub fn load() -> Result<Self> {
        match std::env::var_os(CONFIG_ENV_VAR) {
            Some(path) => Self::from_file(path),
            None => Ok(Self::default()),
        }
    }
}
