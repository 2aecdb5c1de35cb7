//! Heart Rate Monitor Session
//!
//! Connects to a Bluetooth Low Energy heart rate strap, decodes its Heart Rate
//! Measurement notifications and drives the connection lifecycle of a single
//! session from user intents.

/// Core utilities shared by all modules.
pub mod core {
    /// Runtime configuration.
    pub mod config;
    /// Application-wide constants.
    pub mod constants;
    /// Error types.
    pub mod errors;
    /// Event system for inter-module communication.
    pub mod events;
    /// Custom macros for code simplification.
    pub mod macros;
}

/// Trait boundaries between the components.
pub mod api {
    /// The BLE stack boundary.
    pub mod adapter;
    /// Operations of the scanner and the session.
    pub mod controller;
    /// Read access to scanner and session state.
    pub mod model;
}

/// Data models of the application's domain.
pub mod model {
    /// Peripheral identities, advertisements and adapter state.
    pub mod bluetooth;
    /// Heart Rate Measurement codec.
    pub mod heartrate;
    /// Session lifecycle state machine.
    pub mod session;
}

/// Components implementing the API traits.
pub mod components {
    /// Controller serializing all lifecycle operations.
    pub mod application;
    /// btleplug backed adapter.
    pub mod bluetooth;
    /// Device discovery.
    pub mod scanner;
    /// Session management.
    pub mod session;
    /// Hardware-free adapter.
    #[cfg(feature = "mock")]
    pub mod simulated;
}

/// Presentation.
pub mod view {
    /// Console front end.
    pub mod console;
}
