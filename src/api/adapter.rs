//! Adapter Boundary
//!
//! The operations the session core needs from a BLE stack. The production
//! implementation wraps btleplug, tests use the generated `MockBleAdapter`.

use async_trait::async_trait;
use futures::stream::BoxStream;
#[cfg(test)]
use mockall::automock;
use uuid::Uuid;

use crate::core::errors::AdapterError;
use crate::model::bluetooth::{AdapterState, Advertisement, DeviceId};

pub type AdapterResult<T> = Result<T, AdapterError>;

/// Stream of adapter power states.
pub type StateStream = BoxStream<'static, AdapterState>;
/// Stream of scan callbacks, errors do not end the stream.
pub type AdvertisementStream = BoxStream<'static, AdapterResult<Advertisement>>;
/// Stream of base64 encoded characteristic values.
pub type NotificationStream = BoxStream<'static, AdapterResult<String>>;

#[cfg_attr(test, automock)]
#[async_trait]
pub trait BleAdapter: Send + Sync {
    /// Observes the adapter power state. The first item is the current
    /// state, dropping the stream detaches the listener.
    async fn observe_state(&self) -> AdapterResult<StateStream>;

    /// Starts a platform scan filtered to the given services.
    async fn start_scan(&self, services: Vec<Uuid>) -> AdapterResult<AdvertisementStream>;

    async fn stop_scan(&self) -> AdapterResult<()>;

    async fn connect(&self, id: &DeviceId) -> AdapterResult<()>;

    /// Discovers all services and characteristics of a connected device.
    async fn discover_services(&self, id: &DeviceId) -> AdapterResult<()>;

    /// Subscribes to notifications of a characteristic. The subscription is
    /// established once this returns; it ends when the stream is dropped.
    async fn monitor_characteristic(
        &self,
        id: &DeviceId,
        service: Uuid,
        characteristic: Uuid,
    ) -> AdapterResult<NotificationStream>;

    async fn cancel_connection(&self, id: &DeviceId) -> AdapterResult<()>;

    /// Releases the underlying adapter. Every later call fails with
    /// `AdapterError::Destroyed`.
    async fn destroy(&self);
}
