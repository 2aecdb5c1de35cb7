//! Error Taxonomy
//!
//! Typed errors for the adapter boundary, the heart-rate codec and the session
//! lifecycle. Controller-level code wraps these in `anyhow::Error`.

use thiserror::Error;
use uuid::Uuid;

use crate::model::bluetooth::DeviceId;
use crate::model::session::SessionState;

/// Failures surfaced by the BLE stack behind the adapter boundary.
#[derive(Debug, Error)]
pub enum AdapterError {
    #[error("bluetooth error: {0}")]
    Bluetooth(#[from] btleplug::Error),
    #[error("no bluetooth adapter available")]
    NoAdapter,
    #[error("unknown device {0}")]
    UnknownDevice(DeviceId),
    #[error("characteristic {0} not found")]
    CharacteristicNotFound(Uuid),
    #[error("adapter state stream ended before power on")]
    Unavailable,
    #[error("operation timed out")]
    Timeout,
    #[error("adapter has been destroyed")]
    Destroyed,
    #[error("{0}")]
    Other(String),
}

/// Failures decoding a Heart Rate Measurement payload.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CodecError {
    #[error("malformed payload: expected at least {expected} bytes, got {actual}")]
    MalformedPayload { expected: usize, actual: usize },
    #[error("undecodable transport encoding: {0}")]
    DecodeError(#[from] base64::DecodeError),
}

/// Errors of the scanner and session lifecycle operations.
#[derive(Debug, Error)]
pub enum HrmError {
    #[error(transparent)]
    Adapter(#[from] AdapterError),
    #[error(transparent)]
    Codec(#[from] CodecError),
    #[error("no device has been selected")]
    NoActiveSession,
    #[error("device {0} was not discovered")]
    UnknownDevice(DeviceId),
    #[error("transition not possible from state {0:?}")]
    InvalidTransition(SessionState),
}

pub type Result<T, E = HrmError> = std::result::Result<T, E>;
