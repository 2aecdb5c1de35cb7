//! Session Manager
//!
//! Owns the connection to the single selected heart rate sensor: connect,
//! service discovery, notification subscription, pause/resume and teardown.
//! Every notification is decoded by a listener task and reported back through
//! the event bus, so the session state itself is only touched by the
//! controller loop.
use crate::api::adapter::{BleAdapter, NotificationStream};
use crate::api::controller::SessionApi;
use crate::api::model::SessionModelApi;
use crate::core::config::SessionConfig;
use crate::core::constants::{HEARTRATE_MEASUREMENT_UUID, HEARTRATE_SERVICE_UUID};
use crate::core::errors::{AdapterError, HrmError, Result};
use crate::core::events::{AppEvent, SessionEvent, ViewUpdate};
use crate::model::bluetooth::{DeviceDescriptor, DeviceId};
use crate::model::heartrate::HeartRateMeasurement;
use crate::model::session::{Lifecycle, SessionInput, SessionState};

use async_trait::async_trait;
use futures::StreamExt;
use log::{debug, info, trace, warn};
use std::sync::Arc;
use tokio::sync::broadcast::Sender;
use tokio::task::JoinHandle;
use tokio::time::timeout;

/// An active notification subscription. Dropping it stops the listener.
#[derive(Debug)]
struct Subscription {
    generation: u64,
    listener: JoinHandle<()>,
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.listener.abort();
    }
}

/// Decodes notifications until the channel fails, reporting to the event bus.
async fn listen(generation: u64, mut notifications: NotificationStream, tx: Sender<AppEvent>) {
    let reason = loop {
        match notifications.next().await {
            Some(Ok(value)) => match HeartRateMeasurement::decode_base64(&value) {
                Ok(measurement) => {
                    debug!("Notification decoded: {}", measurement);
                    let event = SessionEvent::Measurement {
                        generation,
                        measurement,
                    };
                    if tx.send(AppEvent::Session(event)).is_err() {
                        break "event bus closed".to_owned();
                    }
                }
                Err(e) => warn!("Dropping notification {:?}: {}", value, e),
            },
            Some(Err(e)) => {
                warn!("Monitor failed: {}", e);
                break e.to_string();
            }
            None => break "notification stream ended".to_owned(),
        }
    };
    let _ = tx.send(AppEvent::Session(SessionEvent::ChannelClosed {
        generation,
        reason,
    }));
}

/// Manages the lifecycle of the single active session.
///
/// # Fields
/// - `adapter`: The adapter shared with the scanner
/// - `lifecycle`: Connection state machine
/// - `target`: The selected device, kept for `start()`
/// - `subscription`: Present iff the lifecycle is `Subscribed`
/// - `generation`: Counter tagging each subscription's events
/// - `linked`: Device whose link may still be open, until disconnection was
///   requested
/// - `last_measurement`: Most recent reading of the current target
pub struct SessionManager<A: BleAdapter + 'static> {
    adapter: Arc<A>,
    config: SessionConfig,
    lifecycle: Lifecycle,
    target: Option<DeviceDescriptor>,
    subscription: Option<Subscription>,
    generation: u64,
    linked: Option<DeviceId>,
    last_measurement: Option<HeartRateMeasurement>,
    event_bus: Sender<AppEvent>,
    view_tx: Sender<ViewUpdate>,
}

impl<A: BleAdapter + 'static> SessionManager<A> {
    pub fn new(
        adapter: Arc<A>,
        config: SessionConfig,
        event_bus: Sender<AppEvent>,
        view_tx: Sender<ViewUpdate>,
    ) -> Self {
        Self {
            adapter,
            config,
            lifecycle: Lifecycle::default(),
            target: None,
            subscription: None,
            generation: 0,
            linked: None,
            last_measurement: None,
            event_bus,
            view_tx,
        }
    }

    /// Advances the lifecycle, publishes the new state and the produced cue.
    fn transition(&mut self, input: SessionInput) -> Result<()> {
        let from = self.lifecycle.state();
        let cue = self.lifecycle.consume(input)?;
        let to = self.lifecycle.state();
        trace!("Session {:?} --{:?}--> {:?}", from, input, to);
        if to != SessionState::Subscribed {
            self.subscription = None;
        }
        let _ = self.view_tx.send(ViewUpdate::SessionState(to));
        if let Some(cue) = cue {
            let _ = self.view_tx.send(ViewUpdate::Cue(cue));
        }
        Ok(())
    }

    fn is_current(&self, generation: u64) -> bool {
        self.subscription
            .as_ref()
            .is_some_and(|s| s.generation == generation)
    }

    /// Connects to the target and subscribes to heart rate notifications.
    async fn establish(&mut self, input: SessionInput) -> Result<()> {
        let device = self.target.clone().ok_or(HrmError::NoActiveSession)?;
        self.transition(input)?;
        match self.connect_and_subscribe(&device.id).await {
            Ok(notifications) => {
                self.generation += 1;
                let generation = self.generation;
                let listener = tokio::spawn(listen(
                    generation,
                    notifications,
                    self.event_bus.clone(),
                ));
                self.subscription = Some(Subscription {
                    generation,
                    listener,
                });
                self.transition(SessionInput::SubscriptionReady)?;
                info!("Receiving heart rate from {}.", device);
                Ok(())
            }
            Err(e) => {
                warn!("Connection to {} failed: {}", device, e);
                if self.linked.is_some() {
                    self.cancel_connection(&device.id).await;
                }
                self.transition(SessionInput::Failed)?;
                Err(e)
            }
        }
    }

    async fn connect_and_subscribe(&mut self, id: &DeviceId) -> Result<NotificationStream> {
        match timeout(self.config.connect_timeout(), self.adapter.connect(id)).await {
            Ok(result) => result?,
            Err(_) => {
                // the request may still complete after the timeout
                self.linked = Some(id.clone());
                return Err(AdapterError::Timeout.into());
            }
        }
        self.linked = Some(id.clone());
        info!("Connection available with {}.", id);
        self.transition(SessionInput::Connected)?;

        self.adapter.discover_services(id).await?;
        let notifications = self
            .adapter
            .monitor_characteristic(id, HEARTRATE_SERVICE_UUID, HEARTRATE_MEASUREMENT_UUID)
            .await?;
        Ok(notifications)
    }

    /// Requests disconnection once, bounded by the disconnect timeout. The
    /// outcome is logged only.
    async fn cancel_connection(&mut self, id: &DeviceId) {
        self.linked = None;
        match timeout(
            self.config.disconnect_timeout(),
            self.adapter.cancel_connection(id),
        )
        .await
        {
            Ok(Ok(())) => info!("Device {} disconnected.", id),
            Ok(Err(e)) => warn!("Disconnecting {} failed: {}", id, e),
            Err(_) => warn!("Disconnecting {} timed out.", id),
        }
    }

    /// Drops the subscription and disconnects the current target.
    async fn disconnect(&mut self) {
        let Some(device) = self.target.clone() else {
            return;
        };
        if let Err(e) = self.transition(SessionInput::Disconnect) {
            warn!("Cannot disconnect {}: {}", device, e);
            return;
        }
        self.cancel_connection(&device.id).await;
        if let Err(e) = self.transition(SessionInput::Disconnected) {
            warn!("Session left in an unexpected state: {}", e);
        }
    }
}

#[async_trait]
impl<A: BleAdapter + 'static> SessionApi for SessionManager<A> {
    async fn select(&mut self, device: DeviceDescriptor) -> Result<()> {
        if self.lifecycle.state() == SessionState::Subscribed || self.linked.is_some() {
            self.disconnect().await;
        }
        info!("Selected {}.", device);
        self.target = Some(device);
        self.last_measurement = None;
        self.establish(SessionInput::Select).await
    }

    async fn start(&mut self) -> Result<()> {
        if !self.config.resume_supported {
            debug!("Resume is not supported, ignoring start.");
            return Ok(());
        }
        if self.target.is_none() {
            return Err(HrmError::NoActiveSession);
        }
        if self.lifecycle.state() == SessionState::Subscribed {
            debug!("Session already running.");
            return Ok(());
        }
        self.establish(SessionInput::Resume).await
    }

    async fn pause(&mut self) -> Result<()> {
        if self.lifecycle.state() != SessionState::Subscribed {
            debug!("No running session to pause.");
            return Ok(());
        }
        let input = if self.config.resume_supported {
            SessionInput::Pause
        } else {
            SessionInput::Release
        };
        self.transition(input)?;
        if let Some(device) = self.target.clone() {
            self.cancel_connection(&device.id).await;
        }
        Ok(())
    }

    async fn teardown(&mut self) {
        self.disconnect().await;
        self.adapter.destroy().await;
        info!("Bluetooth adapter released.");
    }

    async fn handle_event(&mut self, event: SessionEvent) -> Result<()> {
        match event {
            SessionEvent::Measurement {
                generation,
                measurement,
            } => {
                if !self.is_current(generation) {
                    trace!("Ignoring measurement of stale subscription {}.", generation);
                    return Ok(());
                }
                self.last_measurement = Some(measurement.clone());
                let _ = self.view_tx.send(ViewUpdate::HeartRate(measurement));
            }
            SessionEvent::ChannelClosed { generation, reason } => {
                if !self.is_current(generation) {
                    return Ok(());
                }
                warn!("Heart rate notifications stopped: {}", reason);
                self.transition(SessionInput::ChannelLost)?;
            }
        }
        Ok(())
    }
}

impl<A: BleAdapter + 'static> SessionModelApi for SessionManager<A> {
    fn state(&self) -> SessionState {
        self.lifecycle.state()
    }

    fn target(&self) -> Option<DeviceDescriptor> {
        self.target.clone()
    }

    fn last_measurement(&self) -> Option<HeartRateMeasurement> {
        self.last_measurement.clone()
    }

    fn is_subscribed(&self) -> bool {
        self.subscription.is_some()
    }
}
