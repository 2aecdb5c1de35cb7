//! Application Controller
//!
//! This module defines the controller that owns the scanner and the session
//! manager. It consumes application events one at a time, so no two lifecycle
//! operations are ever in flight together.

use crate::{
    api::controller::{ScannerApi, SessionApi},
    core::{
        errors::HrmError,
        events::{AppEvent, UiIntent},
    },
    model::bluetooth::DeviceId,
};

use anyhow::Result;
use log::{error, info, trace, warn};
use tokio::sync::broadcast::{error::RecvError, Sender};

/// Main application controller.
pub struct AppController<SC: ScannerApi, SE: SessionApi> {
    event_bus: Sender<AppEvent>,
    scanner: SC,
    session: SE,
}

impl<SC: ScannerApi, SE: SessionApi> AppController<SC, SE> {
    /// Creates a new `AppController`.
    ///
    /// # Arguments
    /// - `scanner`: The device scanner.
    /// - `session`: The session manager.
    /// - `event_bus`: The bus the presentation and the listener tasks publish on.
    pub fn new(scanner: SC, session: SE, event_bus: Sender<AppEvent>) -> Self {
        trace!("Initializing AppController.");
        Self {
            event_bus,
            scanner,
            session,
        }
    }

    pub fn event_bus(&self) -> Sender<AppEvent> {
        self.event_bus.clone()
    }

    async fn select_device(&mut self, id: DeviceId) -> Result<()> {
        let device = self
            .scanner
            .devices()
            .read()
            .await
            .iter()
            .find(|d| d.id == id)
            .cloned()
            .ok_or(HrmError::UnknownDevice(id))?;
        if let Err(e) = self.scanner.stop_scan().await {
            warn!("Could not stop scanning: {}", e);
        }
        self.session.select(device).await?;
        Ok(())
    }

    /// Dispatches application-level events to the scanner and the session.
    async fn dispatch_event(&mut self, event: AppEvent) -> Result<()> {
        match event {
            AppEvent::Ui(UiIntent::OpenDiscovery) => self.scanner.start_scan().await?,
            AppEvent::Ui(UiIntent::SelectDevice(id)) => self.select_device(id).await?,
            AppEvent::Ui(UiIntent::Start) => self.session.start().await?,
            AppEvent::Ui(UiIntent::Pause) => self.session.pause().await?,
            AppEvent::Ui(UiIntent::Shutdown) => {
                if let Err(e) = self.scanner.stop_scan().await {
                    warn!("Could not stop scanning: {}", e);
                }
                self.session.teardown().await;
            }
            AppEvent::Session(event) => self.session.handle_event(event).await?,
        }
        Ok(())
    }

    /// Asynchronous event handler.
    ///
    /// Processes events until a shutdown intent was handled or the bus closes.
    pub async fn event_handler(mut self) {
        let mut event_ch_rx = self.event_bus.subscribe();
        loop {
            let event = match event_ch_rx.recv().await {
                Ok(event) => event,
                Err(RecvError::Lagged(skipped)) => {
                    warn!("Event handler lagging, skipped {} events.", skipped);
                    continue;
                }
                Err(RecvError::Closed) => break,
            };
            let shutdown = event == AppEvent::Ui(UiIntent::Shutdown);
            if let Err(e) = self.dispatch_event(event).await {
                error!("error during event handling: {}", e);
            }
            if shutdown {
                info!("Shutting down.");
                break;
            }
        }
    }
}
