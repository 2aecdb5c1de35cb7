//! Simulated Adapter
//!
//! An in-process adapter for running the application without Bluetooth
//! hardware. It advertises one heart rate strap and streams random readings
//! once monitored.
use crate::api::adapter::{
    AdapterResult, AdvertisementStream, BleAdapter, NotificationStream, StateStream,
};
use crate::core::constants::{HEARTRATE_MEASUREMENT_UUID, HEARTRATE_SERVICE_UUID};
use crate::core::errors::AdapterError;
use crate::model::bluetooth::{AdapterState, Advertisement, DeviceId};

use async_trait::async_trait;
use base64::prelude::BASE64_STANDARD;
use base64::Engine;
use futures::{future, stream, StreamExt};
use log::debug;
use rand::Rng;
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use std::time::Duration;
use uuid::Uuid;

const SENSOR_ID: &str = "AA:BB:CC:DD:EE:FF";
const SENSOR_NAME: &str = "HRM-Sensor";
const POWER_ON_DELAY: Duration = Duration::from_millis(500);
const ADVERTISING_INTERVAL: Duration = Duration::from_millis(200);
const NOTIFICATION_INTERVAL: Duration = Duration::from_secs(1);

#[derive(Debug, Default)]
pub struct SimulatedAdapter {
    connected: Mutex<HashSet<DeviceId>>,
    destroyed: AtomicBool,
}

impl SimulatedAdapter {
    pub fn new() -> Self {
        Self::default()
    }

    fn ensure_alive(&self) -> AdapterResult<()> {
        if self.destroyed.load(Ordering::SeqCst) {
            Err(AdapterError::Destroyed)
        } else {
            Ok(())
        }
    }

    fn ensure_known(&self, id: &DeviceId) -> AdapterResult<()> {
        self.ensure_alive()?;
        if id.as_str() == SENSOR_ID {
            Ok(())
        } else {
            Err(AdapterError::UnknownDevice(id.clone()))
        }
    }

    fn connected(&self) -> AdapterResult<std::sync::MutexGuard<'_, HashSet<DeviceId>>> {
        self.connected
            .lock()
            .map_err(|e| AdapterError::Other(e.to_string()))
    }
}

fn advertisements() -> Vec<Advertisement> {
    let sensor = Advertisement {
        id: DeviceId::new(SENSOR_ID),
        local_name: Some(SENSOR_NAME.into()),
        services: vec![HEARTRATE_SERVICE_UUID],
    };
    vec![
        Advertisement {
            id: DeviceId::new("11:22:33:44:55:66"),
            local_name: None,
            services: vec![HEARTRATE_SERVICE_UUID],
        },
        sensor.clone(),
        sensor,
    ]
}

#[async_trait]
impl BleAdapter for SimulatedAdapter {
    async fn observe_state(&self) -> AdapterResult<StateStream> {
        self.ensure_alive()?;
        let powered_on = stream::once(async {
            tokio::time::sleep(POWER_ON_DELAY).await;
            AdapterState::PoweredOn
        });
        Ok(stream::once(future::ready(AdapterState::Unknown))
            .chain(powered_on)
            .chain(stream::pending())
            .boxed())
    }

    async fn start_scan(&self, services: Vec<Uuid>) -> AdapterResult<AdvertisementStream> {
        self.ensure_alive()?;
        debug!("Simulated scan for {:?}.", services);
        let adverts = stream::iter(advertisements()).then(|advert| async move {
            tokio::time::sleep(ADVERTISING_INTERVAL).await;
            Ok(advert)
        });
        Ok(adverts.chain(stream::pending()).boxed())
    }

    async fn stop_scan(&self) -> AdapterResult<()> {
        self.ensure_alive()
    }

    async fn connect(&self, id: &DeviceId) -> AdapterResult<()> {
        self.ensure_known(id)?;
        self.connected()?.insert(id.clone());
        Ok(())
    }

    async fn discover_services(&self, id: &DeviceId) -> AdapterResult<()> {
        self.ensure_known(id)?;
        if self.connected()?.contains(id) {
            Ok(())
        } else {
            Err(AdapterError::Other(format!("{} is not connected", id)))
        }
    }

    async fn monitor_characteristic(
        &self,
        id: &DeviceId,
        service: Uuid,
        characteristic: Uuid,
    ) -> AdapterResult<NotificationStream> {
        self.discover_services(id).await?;
        if service != HEARTRATE_SERVICE_UUID || characteristic != HEARTRATE_MEASUREMENT_UUID {
            return Err(AdapterError::CharacteristicNotFound(characteristic));
        }
        let readings = stream::unfold((), |()| async {
            tokio::time::sleep(NOTIFICATION_INTERVAL).await;
            let bpm: u8 = rand::thread_rng().gen_range(60..=100);
            Some((Ok(BASE64_STANDARD.encode([0x06, bpm])), ()))
        });
        Ok(readings.boxed())
    }

    async fn cancel_connection(&self, id: &DeviceId) -> AdapterResult<()> {
        self.ensure_known(id)?;
        self.connected()?.remove(id);
        Ok(())
    }

    async fn destroy(&self) {
        self.destroyed.store(true, Ordering::SeqCst);
        if let Ok(mut connected) = self.connected.lock() {
            connected.clear();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::heartrate::HeartRateMeasurement;

    fn sensor() -> DeviceId {
        DeviceId::new(SENSOR_ID)
    }

    #[tokio::test(start_paused = true)]
    async fn test_powers_on_after_delay() {
        let adapter = SimulatedAdapter::new();
        let states: Vec<_> = adapter.observe_state().await.unwrap().take(2).collect().await;
        assert_eq!(states, vec![AdapterState::Unknown, AdapterState::PoweredOn]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_monitor_requires_connection() {
        let adapter = SimulatedAdapter::new();
        assert!(adapter
            .monitor_characteristic(&sensor(), HEARTRATE_SERVICE_UUID, HEARTRATE_MEASUREMENT_UUID)
            .await
            .is_err());

        adapter.connect(&sensor()).await.unwrap();
        let mut readings = adapter
            .monitor_characteristic(&sensor(), HEARTRATE_SERVICE_UUID, HEARTRATE_MEASUREMENT_UUID)
            .await
            .unwrap();
        let value = readings.next().await.unwrap().unwrap();
        let bpm = HeartRateMeasurement::decode_base64(&value).unwrap().bpm();
        assert!((60..=100).contains(&bpm));
    }

    #[tokio::test]
    async fn test_destroy_rejects_later_calls() {
        let adapter = SimulatedAdapter::new();
        adapter.destroy().await;
        assert!(matches!(
            adapter.connect(&sensor()).await,
            Err(AdapterError::Destroyed)
        ));
    }
}
