//! Core Events
//!
//! This module defines the events exchanged between the presentation, the
//! application controller and the background tasks of the scanner and the
//! session.

use crate::model::{
    bluetooth::{DeviceDescriptor, DeviceId},
    heartrate::HeartRateMeasurement,
    session::{AnimationCue, SessionState},
};

/// User intents sent by the presentation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum UiIntent {
    /// Open the device selector and start discovery.
    OpenDiscovery,
    /// Connect to a discovered device.
    SelectDevice(DeviceId),
    /// Resume the session of the last selected device.
    Start,
    /// Pause the running session.
    Pause,
    /// The owning screen goes away: disconnect and release the adapter.
    Shutdown,
}

/// Events reported by the notification listener of a subscription.
///
/// Every event carries the generation of the subscription that produced it,
/// events of superseded subscriptions are discarded.
#[derive(Clone, Debug, PartialEq)]
pub enum SessionEvent {
    /// A notification was decoded.
    Measurement {
        generation: u64,
        measurement: HeartRateMeasurement,
    },
    /// The notification channel failed or ended.
    ChannelClosed { generation: u64, reason: String },
}

/// Enumeration of all application-level events.
#[derive(Clone, Debug, PartialEq)]
pub enum AppEvent {
    Ui(UiIntent),
    Session(SessionEvent),
}

/// Updates pushed to the presentation.
#[derive(Clone, Debug, PartialEq)]
pub enum ViewUpdate {
    /// The discovered set of the current scan pass changed.
    DevicesDiscovered(Vec<DeviceDescriptor>),
    /// A new heart rate reading.
    HeartRate(HeartRateMeasurement),
    SessionState(SessionState),
    Cue(AnimationCue),
}
