//! Controller API
//!
//! The mutating operations the application controller dispatches user intents
//! and session events to.

use async_trait::async_trait;

use super::model::{ScannerModelApi, SessionModelApi};
use crate::core::errors::Result;
use crate::core::events::SessionEvent;
use crate::model::bluetooth::DeviceDescriptor;

/// ScannerApi trait
///
/// Discovery of peripherals advertising the heart rate service.
#[async_trait]
pub trait ScannerApi: ScannerModelApi + Send + Sync {
    /// Start (or restart) a scan pass. Clears the discovered set.
    async fn start_scan(&mut self) -> Result<()>;

    /// Stop the running scan pass. No-op when not scanning.
    async fn stop_scan(&mut self) -> Result<()>;
}

/// SessionApi trait
///
/// Lifecycle of the single active device session.
#[async_trait]
pub trait SessionApi: SessionModelApi + Send + Sync {
    /// Connect to a device, discover it and subscribe to heart rate
    /// notifications. A previous connection is torn down first.
    ///
    /// # Arguments
    ///
    /// * `device` - The descriptor of the peripheral to connect to.
    async fn select(&mut self, device: DeviceDescriptor) -> Result<()>;

    /// Reconnect to the last selected device.
    async fn start(&mut self) -> Result<()>;

    /// Drop the subscription and the connection of a subscribed session.
    async fn pause(&mut self) -> Result<()>;

    /// Disconnect and release the adapter. Never fails.
    async fn teardown(&mut self);

    /// Apply an event reported by the notification listener.
    async fn handle_event(&mut self, event: SessionEvent) -> Result<()>;
}
