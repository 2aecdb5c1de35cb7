//! Device Scanner
//!
//! Discovers peripherals advertising the heart rate service. The platform scan
//! is deferred until the adapter reports power on, scan callbacks are reduced
//! to named, de-duplicated candidates and published to the presentation.
use crate::api::adapter::{AdapterResult, BleAdapter};
use crate::api::controller::ScannerApi;
use crate::api::model::ScannerModelApi;
use crate::core::config::{DiscoveryPolicy, ScanConfig};
use crate::core::errors::{AdapterError, Result};
use crate::core::events::ViewUpdate;
use crate::model::bluetooth::{AdapterState, Advertisement, DeviceDescriptor};

use async_trait::async_trait;
use futures::stream::BoxStream;
use futures::{future, Stream, StreamExt};
use log::{debug, info, trace, warn};
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::broadcast::Sender;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use uuid::Uuid;

/// Reduces raw scan callbacks to the candidate sequence.
///
/// Advertisements outside the service filter or without a name are skipped,
/// every identity is emitted at most once. Scan errors are logged and do not
/// end the sequence.
pub fn candidates<S>(advertisements: S, filter: Vec<Uuid>) -> impl Stream<Item = DeviceDescriptor>
where
    S: Stream<Item = AdapterResult<Advertisement>>,
{
    let mut seen = HashSet::new();
    advertisements.filter_map(move |result| {
        let candidate = match result {
            Ok(adv) if !adv.matches(&filter) => None,
            Ok(adv) if adv.display_name().is_none() => {
                trace!("Ignoring unnamed peripheral {}", adv.id);
                None
            }
            Ok(adv) => seen
                .insert(adv.id.clone())
                .then(|| DeviceDescriptor::from(&adv)),
            Err(e) => {
                warn!("Scan error: {}", e);
                None
            }
        };
        future::ready(candidate)
    })
}

/// Waits until the adapter is powered on. The state listener is dropped as
/// soon as it fired.
async fn wait_for_power_on<A: BleAdapter + ?Sized>(adapter: &A) -> Result<()> {
    let mut states = adapter.observe_state().await?;
    while let Some(state) = states.next().await {
        if state == AdapterState::PoweredOn {
            return Ok(());
        }
        debug!("Adapter is {:?}, deferring scan.", state);
    }
    Err(AdapterError::Unavailable.into())
}

/// Manages scan passes on the shared adapter.
///
/// # Fields
/// - `adapter`: The adapter shared with the session manager
/// - `config`: Service filter and discovery policy
/// - `devices`: Discovered set of the current scan pass
/// - `scan_handle`: Task driving the current scan pass
/// - `platform_scanning`: Set while the platform scan of the pass is running
/// - `view_tx`: Channel for presentation updates
pub struct DeviceScanner<A: BleAdapter + 'static> {
    adapter: Arc<A>,
    config: ScanConfig,
    devices: Arc<RwLock<Vec<DeviceDescriptor>>>,
    scan_handle: Option<JoinHandle<()>>,
    platform_scanning: Arc<AtomicBool>,
    view_tx: Sender<ViewUpdate>,
}

impl<A: BleAdapter + 'static> Drop for DeviceScanner<A> {
    fn drop(&mut self) {
        if let Some(handle) = &self.scan_handle {
            handle.abort();
        }
    }
}

impl<A: BleAdapter + 'static> DeviceScanner<A> {
    pub fn new(adapter: Arc<A>, config: ScanConfig, view_tx: Sender<ViewUpdate>) -> Self {
        Self {
            adapter,
            config,
            devices: Arc::new(RwLock::new(Vec::new())),
            scan_handle: None,
            platform_scanning: Arc::new(AtomicBool::new(false)),
            view_tx,
        }
    }

    /// Starts a platform scan once the adapter is powered on and returns the
    /// lazy candidate sequence.
    pub async fn scan(&self) -> Result<BoxStream<'static, DeviceDescriptor>> {
        Self::scan_with(
            self.adapter.clone(),
            self.config.service_filter.clone(),
            self.platform_scanning.clone(),
        )
        .await
    }

    async fn scan_with(
        adapter: Arc<A>,
        filter: Vec<Uuid>,
        platform_scanning: Arc<AtomicBool>,
    ) -> Result<BoxStream<'static, DeviceDescriptor>> {
        wait_for_power_on(adapter.as_ref()).await?;
        let advertisements = adapter.start_scan(filter.clone()).await?;
        platform_scanning.store(true, Ordering::SeqCst);
        info!("Scanning started.");
        Ok(candidates(advertisements, filter).boxed())
    }

    async fn clear_devices(&self) {
        self.devices.write().await.clear();
        let _ = self.view_tx.send(ViewUpdate::DevicesDiscovered(Vec::new()));
    }
}

#[async_trait]
impl<A: BleAdapter + 'static> ScannerApi for DeviceScanner<A> {
    async fn start_scan(&mut self) -> Result<()> {
        self.stop_scan().await?;
        self.clear_devices().await;

        let adapter = self.adapter.clone();
        let config = self.config.clone();
        let devices = self.devices.clone();
        let platform_scanning = self.platform_scanning.clone();
        let view_tx = self.view_tx.clone();
        self.scan_handle = Some(tokio::spawn(async move {
            let result: Result<()> = async {
                let mut found = Self::scan_with(
                    adapter.clone(),
                    config.service_filter,
                    platform_scanning.clone(),
                )
                .await?;
                while let Some(desc) = found.next().await {
                    info!("Discovered {}.", desc);
                    let snapshot = {
                        let mut devices = devices.write().await;
                        devices.push(desc);
                        devices.clone()
                    };
                    let _ = view_tx.send(ViewUpdate::DevicesDiscovered(snapshot));
                    if config.discovery == DiscoveryPolicy::SingleCandidate {
                        platform_scanning.store(false, Ordering::SeqCst);
                        adapter.stop_scan().await?;
                        info!("Stopped scanning after first candidate.");
                        break;
                    }
                }
                Ok(())
            }
            .await;
            if let Err(e) = result {
                warn!("Scan terminated: {}", e);
            }
        }));
        Ok(())
    }

    async fn stop_scan(&mut self) -> Result<()> {
        if let Some(handle) = self.scan_handle.take() {
            handle.abort();
            self.clear_devices().await;
            // a pass still waiting for power on never reached the platform
            if self.platform_scanning.swap(false, Ordering::SeqCst) {
                self.adapter.stop_scan().await?;
                info!("Stopped scanning.");
            }
        }
        Ok(())
    }
}

impl<A: BleAdapter + 'static> ScannerModelApi for DeviceScanner<A> {
    fn devices(&self) -> &Arc<RwLock<Vec<DeviceDescriptor>>> {
        &self.devices
    }

    fn is_scanning(&self) -> bool {
        self.scan_handle
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::adapter::MockBleAdapter;
    use crate::core::constants::HEARTRATE_SERVICE_UUID;
    use crate::model::bluetooth::DeviceId;
    use futures::stream;
    use std::time::Duration;
    use tokio::sync::broadcast;

    fn adv(id: &str, name: Option<&str>) -> AdapterResult<Advertisement> {
        Ok(Advertisement {
            id: DeviceId::new(id),
            local_name: name.map(str::to_owned),
            services: vec![HEARTRATE_SERVICE_UUID],
        })
    }

    fn powered_on(adapter: &mut MockBleAdapter) {
        adapter.expect_observe_state().returning(|| {
            Ok(stream::iter(vec![AdapterState::Unknown, AdapterState::PoweredOn]).boxed())
        });
    }

    #[tokio::test]
    async fn test_candidates_deduplicate_by_identity() {
        let adverts = stream::iter(vec![
            adv("AA:BB:CC:DD:EE:FF", Some("HRM-Sensor")),
            adv("AA:BB:CC:DD:EE:FF", Some("HRM-Sensor")),
            adv("11:22:33:44:55:66", Some("Strap")),
        ]);
        let found: Vec<_> = candidates(adverts, vec![HEARTRATE_SERVICE_UUID])
            .collect()
            .await;
        assert_eq!(found.len(), 2);
        assert_eq!(found[0].id, DeviceId::new("AA:BB:CC:DD:EE:FF"));
        assert_eq!(found[0].name.as_deref(), Some("HRM-Sensor"));
        assert_eq!(found[1].id, DeviceId::new("11:22:33:44:55:66"));
    }

    #[tokio::test]
    async fn test_candidates_skip_unnamed_and_errors() {
        let mut other_service = adv("00:00:00:00:00:01", Some("Lamp")).unwrap();
        other_service.services = vec![Uuid::nil()];
        let adverts = stream::iter(vec![
            adv("AA:BB:CC:DD:EE:FF", None),
            adv("11:22:33:44:55:66", Some("")),
            Err(AdapterError::Other("radio hiccup".into())),
            Ok(other_service),
            adv("AA:BB:CC:DD:EE:FF", Some("HRM-Sensor")),
        ]);
        let found: Vec<_> = candidates(adverts, vec![HEARTRATE_SERVICE_UUID])
            .collect()
            .await;
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].name.as_deref(), Some("HRM-Sensor"));
        assert!(found[0].advertises_heart_rate);
    }

    #[tokio::test]
    async fn test_scan_deferred_until_powered_on() {
        let mut adapter = MockBleAdapter::new();
        adapter.expect_observe_state().times(1).returning(|| {
            Ok(stream::iter(vec![
                AdapterState::PoweredOff,
                AdapterState::Unknown,
                AdapterState::PoweredOn,
            ])
            .boxed())
        });
        adapter
            .expect_start_scan()
            .withf(|services| services == &vec![HEARTRATE_SERVICE_UUID])
            .times(1)
            .returning(|_| Ok(stream::iter(vec![adv("AA:BB:CC:DD:EE:FF", Some("HRM-Sensor"))]).boxed()));

        let (tx, _rx) = broadcast::channel(16);
        let scanner = DeviceScanner::new(Arc::new(adapter), ScanConfig::default(), tx);
        let found: Vec<_> = scanner.scan().await.unwrap().collect().await;
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].to_string(), "HRM-Sensor [AA:BB:CC:DD:EE:FF]");
    }

    #[tokio::test]
    async fn test_scan_fails_without_power_on() {
        let mut adapter = MockBleAdapter::new();
        adapter
            .expect_observe_state()
            .returning(|| Ok(stream::iter(vec![AdapterState::PoweredOff]).boxed()));
        adapter.expect_start_scan().times(0);

        let (tx, _rx) = broadcast::channel(16);
        let scanner = DeviceScanner::new(Arc::new(adapter), ScanConfig::default(), tx);
        assert!(matches!(
            scanner.scan().await,
            Err(crate::core::errors::HrmError::Adapter(AdapterError::Unavailable))
        ));
    }

    #[tokio::test]
    async fn test_start_scan_single_candidate_stops() {
        let mut adapter = MockBleAdapter::new();
        powered_on(&mut adapter);
        adapter.expect_start_scan().times(1).returning(|_| {
            Ok(stream::iter(vec![
                adv("AA:BB:CC:DD:EE:FF", Some("HRM-Sensor")),
                adv("11:22:33:44:55:66", Some("Strap")),
            ])
            .boxed())
        });
        adapter.expect_stop_scan().times(1).returning(|| Ok(()));

        let (tx, mut rx) = broadcast::channel(16);
        let mut scanner = DeviceScanner::new(Arc::new(adapter), ScanConfig::default(), tx);
        scanner.start_scan().await.unwrap();
        scanner.scan_handle.take().unwrap().await.unwrap();

        assert_eq!(scanner.devices().read().await.len(), 1);
        assert!(!scanner.is_scanning());
        assert_eq!(rx.recv().await.unwrap(), ViewUpdate::DevicesDiscovered(vec![]));
        match rx.recv().await.unwrap() {
            ViewUpdate::DevicesDiscovered(devices) => {
                assert_eq!(devices.len(), 1);
                assert_eq!(devices[0].id, DeviceId::new("AA:BB:CC:DD:EE:FF"));
            }
            other => panic!("unexpected update {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_start_scan_multi_candidate() {
        let mut adapter = MockBleAdapter::new();
        powered_on(&mut adapter);
        adapter.expect_start_scan().times(1).returning(|_| {
            Ok(stream::iter(vec![
                adv("AA:BB:CC:DD:EE:FF", Some("HRM-Sensor")),
                adv("AA:BB:CC:DD:EE:FF", Some("HRM-Sensor")),
                adv("11:22:33:44:55:66", Some("Strap")),
            ])
            .boxed())
        });
        adapter.expect_stop_scan().times(0);

        let (tx, _rx) = broadcast::channel(16);
        let config = ScanConfig {
            discovery: DiscoveryPolicy::MultiCandidate,
            ..Default::default()
        };
        let mut scanner = DeviceScanner::new(Arc::new(adapter), config, tx);
        scanner.start_scan().await.unwrap();
        scanner.scan_handle.take().unwrap().await.unwrap();
        assert_eq!(scanner.devices().read().await.len(), 2);
    }

    #[tokio::test]
    async fn test_stop_scan_cancels_pending_scan() {
        let mut adapter = MockBleAdapter::new();
        powered_on(&mut adapter);
        adapter
            .expect_start_scan()
            .returning(|_| Ok(stream::pending::<AdapterResult<Advertisement>>().boxed()));
        adapter.expect_stop_scan().times(1).returning(|| Ok(()));

        let (tx, _rx) = broadcast::channel(16);
        let mut scanner = DeviceScanner::new(Arc::new(adapter), ScanConfig::default(), tx);
        scanner.start_scan().await.unwrap();
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(scanner.is_scanning());
        scanner.stop_scan().await.unwrap();
        assert!(!scanner.is_scanning());
        assert!(scanner.devices().read().await.is_empty());
    }

    #[tokio::test]
    async fn test_stop_scan_before_power_on_skips_platform() {
        let mut adapter = MockBleAdapter::new();
        adapter
            .expect_observe_state()
            .returning(|| Ok(stream::pending::<AdapterState>().boxed()));
        adapter.expect_start_scan().times(0);
        adapter.expect_stop_scan().times(0);

        let (tx, _rx) = broadcast::channel(16);
        let mut scanner = DeviceScanner::new(Arc::new(adapter), ScanConfig::default(), tx);
        scanner.start_scan().await.unwrap();
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(scanner.is_scanning());
        assert!(scanner.stop_scan().await.is_ok());
        assert!(!scanner.is_scanning());
    }

    #[tokio::test]
    async fn test_stop_scan_failure_still_clears_devices() {
        let mut adapter = MockBleAdapter::new();
        powered_on(&mut adapter);
        adapter.expect_start_scan().times(1).returning(|_| {
            Ok(stream::iter(vec![adv("AA:BB:CC:DD:EE:FF", Some("HRM-Sensor"))])
                .chain(stream::pending())
                .boxed())
        });
        adapter
            .expect_stop_scan()
            .times(1)
            .returning(|| Err(AdapterError::Other("adapter busy".into())));

        let (tx, _rx) = broadcast::channel(16);
        let config = ScanConfig {
            discovery: DiscoveryPolicy::MultiCandidate,
            ..Default::default()
        };
        let mut scanner = DeviceScanner::new(Arc::new(adapter), config, tx);
        scanner.start_scan().await.unwrap();
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(scanner.devices().read().await.len(), 1);

        assert!(scanner.stop_scan().await.is_err());
        assert!(scanner.devices().read().await.is_empty());
        assert!(!scanner.is_scanning());
    }

    #[tokio::test]
    async fn test_stop_scan_when_idle_is_noop() {
        let adapter = MockBleAdapter::new();
        let (tx, _rx) = broadcast::channel(16);
        let mut scanner = DeviceScanner::new(Arc::new(adapter), ScanConfig::default(), tx);
        assert!(scanner.stop_scan().await.is_ok());
        assert!(!scanner.is_scanning());
    }
}
