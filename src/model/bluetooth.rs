//! Bluetooth Model
//!
//! This module defines the data exchanged across the adapter boundary:
//! - Peripheral identities and advertisements reported by a scan
//! - The descriptors surfaced to the device selector
//! - Adapter power state

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::core::constants::HEARTRATE_SERVICE_UUID;

/// Opaque peripheral identity, stable per physical device for the lifetime of
/// the adapter.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DeviceId(String);

impl DeviceId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for DeviceId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

/// Power state reported by the adapter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdapterState {
    Unknown,
    PoweredOn,
    PoweredOff,
}

/// A single scan callback: who advertised, under which name and with which
/// services.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Advertisement {
    pub id: DeviceId,
    pub local_name: Option<String>,
    pub services: Vec<Uuid>,
}

impl Advertisement {
    /// The advertised name, if it is present and not blank.
    pub fn display_name(&self) -> Option<&str> {
        self.local_name
            .as_deref()
            .filter(|name| !name.trim().is_empty())
    }

    /// Checks the advertisement against a service filter. An empty filter
    /// accepts everything.
    pub fn matches(&self, filter: &[Uuid]) -> bool {
        filter.is_empty() || filter.iter().any(|uuid| self.services.contains(uuid))
    }
}

/// Represents a discovered Bluetooth device.
///
/// Immutable once it entered the discovered set of a scan pass.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DeviceDescriptor {
    pub id: DeviceId,
    pub name: Option<String>,
    pub advertises_heart_rate: bool,
}

impl DeviceDescriptor {
    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or("(unnamed)")
    }
}

impl From<&Advertisement> for DeviceDescriptor {
    fn from(adv: &Advertisement) -> Self {
        Self {
            id: adv.id.clone(),
            name: adv.display_name().map(str::to_owned),
            advertises_heart_rate: adv.services.contains(&HEARTRATE_SERVICE_UUID),
        }
    }
}

impl fmt::Display for DeviceDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} [{}]", self.display_name(), self.id)
    }
}
