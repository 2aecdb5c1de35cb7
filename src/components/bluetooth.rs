//! Bluetooth Adapter Module
//!
//! Implements the adapter boundary on top of btleplug. Peripherals seen during
//! a scan are remembered by identity so later connect and monitor calls can
//! find them again.
use crate::api::adapter::{
    AdapterResult, AdvertisementStream, BleAdapter, NotificationStream, StateStream,
};
use crate::core::errors::AdapterError;
use crate::model::bluetooth::{AdapterState, Advertisement, DeviceId};

use async_trait::async_trait;
use base64::prelude::BASE64_STANDARD;
use base64::Engine;
use btleplug::api::{
    BDAddr, Central, CentralEvent, CentralState, Manager as _, Peripheral as _, ScanFilter,
};
use btleplug::platform::{Adapter, Manager, Peripheral, PeripheralId};
use futures::{future, stream, StreamExt};
use log::{info, trace, warn};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

impl From<CentralState> for AdapterState {
    fn from(state: CentralState) -> Self {
        match state {
            CentralState::PoweredOn => AdapterState::PoweredOn,
            CentralState::PoweredOff => AdapterState::PoweredOff,
            _ => AdapterState::Unknown,
        }
    }
}

/// Identity of a peripheral: its MAC address where the platform exposes one,
/// the platform id otherwise.
fn device_id(peripheral: &Peripheral) -> DeviceId {
    let address = peripheral.address();
    if address == BDAddr::default() {
        DeviceId::new(format!("{:?}", peripheral.id()))
    } else {
        DeviceId::new(address.to_string())
    }
}

type PeripheralMap = Arc<RwLock<HashMap<DeviceId, Peripheral>>>;

/// Resolves a scan event to an advertisement and remembers the peripheral.
async fn advertisement(
    adapter: &Adapter,
    peripherals: &PeripheralMap,
    id: &PeripheralId,
) -> AdapterResult<Advertisement> {
    let peripheral = adapter.peripheral(id).await?;
    let properties = peripheral.properties().await?.unwrap_or_default();
    let id = device_id(&peripheral);
    trace!("Advertisement from {} ({:?}).", id, properties.local_name);
    peripherals.write().await.insert(id.clone(), peripheral);
    Ok(Advertisement {
        id,
        local_name: properties.local_name,
        services: properties.services,
    })
}

/// The platform Bluetooth adapter.
///
/// # Fields
/// - `adapter`: The btleplug adapter in use
/// - `peripherals`: Peripherals reported by scans, by identity
/// - `destroyed`: Set once `destroy()` released the adapter
#[derive(Debug)]
pub struct BluetoothAdapter {
    adapter: Adapter,
    peripherals: PeripheralMap,
    destroyed: AtomicBool,
}

impl BluetoothAdapter {
    /// Opens the first Bluetooth adapter of the system.
    pub async fn new() -> AdapterResult<Self> {
        let manager = Manager::new().await?;
        let adapter = manager
            .adapters()
            .await?
            .into_iter()
            .next()
            .ok_or(AdapterError::NoAdapter)?;
        info!(
            "Using adapter {}.",
            adapter.adapter_info().await.unwrap_or_else(|_| "(unknown)".into())
        );
        Ok(Self {
            adapter,
            peripherals: Arc::new(RwLock::new(HashMap::new())),
            destroyed: AtomicBool::new(false),
        })
    }

    fn ensure_alive(&self) -> AdapterResult<()> {
        if self.destroyed.load(Ordering::SeqCst) {
            Err(AdapterError::Destroyed)
        } else {
            Ok(())
        }
    }

    async fn peripheral(&self, id: &DeviceId) -> AdapterResult<Peripheral> {
        self.ensure_alive()?;
        self.peripherals
            .read()
            .await
            .get(id)
            .cloned()
            .ok_or_else(|| AdapterError::UnknownDevice(id.clone()))
    }
}

#[async_trait]
impl BleAdapter for BluetoothAdapter {
    async fn observe_state(&self) -> AdapterResult<StateStream> {
        self.ensure_alive()?;
        let current: AdapterState = self.adapter.adapter_state().await?.into();
        let updates = self.adapter.events().await?.filter_map(|event| {
            future::ready(match event {
                CentralEvent::StateUpdate(state) => Some(AdapterState::from(state)),
                _ => None,
            })
        });
        Ok(stream::once(future::ready(current)).chain(updates).boxed())
    }

    async fn start_scan(&self, services: Vec<Uuid>) -> AdapterResult<AdvertisementStream> {
        self.ensure_alive()?;
        let events = self.adapter.events().await?;
        self.adapter.start_scan(ScanFilter { services }).await?;

        let adapter = self.adapter.clone();
        let peripherals = self.peripherals.clone();
        let advertisements = events.filter_map(move |event| {
            let adapter = adapter.clone();
            let peripherals = peripherals.clone();
            async move {
                match event {
                    CentralEvent::DeviceDiscovered(id) | CentralEvent::DeviceUpdated(id) => {
                        Some(advertisement(&adapter, &peripherals, &id).await)
                    }
                    _ => None,
                }
            }
        });
        Ok(advertisements.boxed())
    }

    async fn stop_scan(&self) -> AdapterResult<()> {
        self.ensure_alive()?;
        self.adapter.stop_scan().await?;
        Ok(())
    }

    async fn connect(&self, id: &DeviceId) -> AdapterResult<()> {
        let peripheral = self.peripheral(id).await?;
        if !peripheral.is_connected().await? {
            peripheral.connect().await?;
        }
        Ok(())
    }

    async fn discover_services(&self, id: &DeviceId) -> AdapterResult<()> {
        self.peripheral(id).await?.discover_services().await?;
        Ok(())
    }

    async fn monitor_characteristic(
        &self,
        id: &DeviceId,
        service: Uuid,
        characteristic: Uuid,
    ) -> AdapterResult<NotificationStream> {
        let peripheral = self.peripheral(id).await?;
        let target = peripheral
            .characteristics()
            .into_iter()
            .find(|c| c.uuid == characteristic && c.service_uuid == service)
            .ok_or(AdapterError::CharacteristicNotFound(characteristic))?;

        let notifications = peripheral.notifications().await?;
        peripheral.subscribe(&target).await?;
        Ok(notifications
            .filter(move |n| future::ready(n.uuid == characteristic))
            .map(|n| Ok(BASE64_STANDARD.encode(n.value)))
            .boxed())
    }

    async fn cancel_connection(&self, id: &DeviceId) -> AdapterResult<()> {
        self.peripheral(id).await?.disconnect().await?;
        Ok(())
    }

    async fn destroy(&self) {
        if self.destroyed.swap(true, Ordering::SeqCst) {
            return;
        }
        if let Err(e) = self.adapter.stop_scan().await {
            warn!("Stopping scan during release failed: {}", e);
        }
        self.peripherals.write().await.clear();
    }
}
