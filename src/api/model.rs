//! This module defines the read only API of the scanner and the session.

use std::sync::Arc;
use tokio::sync::RwLock;

use crate::model::{
    bluetooth::DeviceDescriptor, heartrate::HeartRateMeasurement, session::SessionState,
};

pub trait ScannerModelApi {
    /// The devices discovered in the current scan pass.
    fn devices(&self) -> &Arc<RwLock<Vec<DeviceDescriptor>>>;

    fn is_scanning(&self) -> bool;
}

pub trait SessionModelApi {
    fn state(&self) -> SessionState;

    /// The device the session is bound to, if one was ever selected.
    fn target(&self) -> Option<DeviceDescriptor>;

    /// The most recently decoded measurement of the current session.
    fn last_measurement(&self) -> Option<HeartRateMeasurement>;

    fn is_subscribed(&self) -> bool;
}
