//! Heart Rate Monitor
//!
//! Console front end for a BLE heart rate strap: discover a strap, connect to
//! it and follow its readings.

use anyhow::Result;
use env_logger::Env;
use hrm_session::{
    components::{application::AppController, scanner::DeviceScanner, session::SessionManager},
    core::{
        config::AppConfig,
        constants::{LOG_LEVEL_ENV_VAR, LOG_STYLE_ENV_VAR},
    },
    view::console::ConsoleView,
};
#[cfg(not(feature = "mock"))]
use hrm_session::components::bluetooth::BluetoothAdapter;
#[cfg(feature = "mock")]
use hrm_session::components::simulated::SimulatedAdapter;
use log::info;
use std::sync::Arc;
use tokio::sync::broadcast;

/// Main entry point of the application.
///
/// Initializes logging, loads the configuration and runs the console until
/// the user quits.
fn main() -> Result<()> {
    // Initialize logger with environment-specific settings.
    env_logger::Builder::from_env(
        Env::default()
            .filter_or(LOG_LEVEL_ENV_VAR, "info")
            .write_style_or(LOG_STYLE_ENV_VAR, "always"),
    )
    .init();

    let config = AppConfig::load()?;
    info!("Configuration: {:?}", config);

    let rt = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;
    rt.block_on(run(config))
}

async fn run(config: AppConfig) -> Result<()> {
    #[cfg(feature = "mock")]
    let adapter = Arc::new(SimulatedAdapter::new());
    #[cfg(not(feature = "mock"))]
    let adapter = Arc::new(BluetoothAdapter::new().await?);

    let (event_bus, _) = broadcast::channel(config.event_bus_capacity);
    let (view_tx, view_rx) = broadcast::channel(config.event_bus_capacity);

    let scanner = DeviceScanner::new(adapter.clone(), config.scan.clone(), view_tx.clone());
    let session = SessionManager::new(adapter, config.session.clone(), event_bus.clone(), view_tx);
    let controller = AppController::new(scanner, session, event_bus.clone());

    // Subscribe before the console can publish anything.
    let handler = tokio::spawn(controller.event_handler());
    tokio::task::yield_now().await;

    let console = ConsoleView::new(event_bus, view_rx);
    console.run().await?;
    handler.await?;
    // the shutdown updates are still queued for the console
    console.close().await;
    Ok(())
}
