//! Session Lifecycle Model
//!
//! The connection lifecycle of the single active session as a finite state
//! machine. Entering and leaving `Subscribed` produces the animation cues the
//! presentation uses to start and stop the pulse.

use rust_fsm::*;
use std::fmt;

use crate::core::errors::HrmError;

state_machine! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    session_lifecycle(Idle)

    Idle => {
        Select => Connecting,
        Resume => Connecting,
        Disconnect => Disconnecting
    },
    Connecting => {
        Connected => Discovering,
        Failed => Idle
    },
    Discovering => {
        SubscriptionReady => Subscribed [StartCue],
        Failed => Idle
    },
    Subscribed => {
        Pause => Paused [StopCue],
        Release => Idle [StopCue],
        ChannelLost => Idle [StopCue],
        Disconnect => Disconnecting [StopCue]
    },
    Paused => {
        Select => Connecting,
        Resume => Connecting,
        Disconnect => Disconnecting
    },
    Disconnecting => {
        Disconnected => Idle
    }
}

pub use session_lifecycle::Input as SessionInput;
/// Output signal for the heartbeat animation.
pub use session_lifecycle::Output as AnimationCue;
pub use session_lifecycle::State as SessionState;

impl SessionState {
    /// True while a connection to the peripheral is being set up or used.
    pub fn is_connected(&self) -> bool {
        matches!(
            self,
            SessionState::Connecting | SessionState::Discovering | SessionState::Subscribed
        )
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SessionState::Idle => "idle",
            SessionState::Connecting => "connecting",
            SessionState::Discovering => "discovering",
            SessionState::Subscribed => "connected",
            SessionState::Paused => "paused",
            SessionState::Disconnecting => "disconnecting",
        };
        f.write_str(name)
    }
}

/// Wraps the generated machine and turns impossible transitions into
/// `HrmError::InvalidTransition`.
pub struct Lifecycle {
    machine: session_lifecycle::StateMachine,
}

impl Default for Lifecycle {
    fn default() -> Self {
        Self {
            machine: session_lifecycle::StateMachine::new(),
        }
    }
}

impl fmt::Debug for Lifecycle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Lifecycle")
            .field("state", self.machine.state())
            .finish()
    }
}

impl Lifecycle {
    pub fn state(&self) -> SessionState {
        *self.machine.state()
    }

    /// Feeds one input to the machine and returns the cue it produced, if
    /// any. The state is unchanged when the input is rejected.
    pub fn consume(&mut self, input: SessionInput) -> Result<Option<AnimationCue>, HrmError> {
        let from = self.state();
        self.machine
            .consume(&input)
            .map_err(|_| HrmError::InvalidTransition(from))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_initial_state() {
        let lifecycle = Lifecycle::default();
        assert_eq!(lifecycle.state(), SessionState::Idle);
        assert!(!lifecycle.state().is_connected());
    }

    #[test]
    fn test_connect_cycle() {
        let mut lifecycle = Lifecycle::default();
        assert_eq!(lifecycle.consume(SessionInput::Select).unwrap(), None);
        assert_eq!(lifecycle.state(), SessionState::Connecting);
        assert_eq!(lifecycle.consume(SessionInput::Connected).unwrap(), None);
        assert_eq!(lifecycle.state(), SessionState::Discovering);
        assert_eq!(
            lifecycle.consume(SessionInput::SubscriptionReady).unwrap(),
            Some(AnimationCue::StartCue)
        );
        assert_eq!(lifecycle.state(), SessionState::Subscribed);
        assert_eq!(
            lifecycle.consume(SessionInput::Pause).unwrap(),
            Some(AnimationCue::StopCue)
        );
        assert_eq!(lifecycle.state(), SessionState::Paused);
        assert_eq!(lifecycle.consume(SessionInput::Resume).unwrap(), None);
        assert_eq!(lifecycle.state(), SessionState::Connecting);
    }

    #[test]
    fn test_failures_return_to_idle() {
        let mut lifecycle = Lifecycle::default();
        lifecycle.consume(SessionInput::Select).unwrap();
        lifecycle.consume(SessionInput::Failed).unwrap();
        assert_eq!(lifecycle.state(), SessionState::Idle);

        lifecycle.consume(SessionInput::Select).unwrap();
        lifecycle.consume(SessionInput::Connected).unwrap();
        lifecycle.consume(SessionInput::Failed).unwrap();
        assert_eq!(lifecycle.state(), SessionState::Idle);
    }

    #[test]
    fn test_teardown_from_subscribed() {
        let mut lifecycle = Lifecycle::default();
        lifecycle.consume(SessionInput::Select).unwrap();
        lifecycle.consume(SessionInput::Connected).unwrap();
        lifecycle.consume(SessionInput::SubscriptionReady).unwrap();
        assert_eq!(
            lifecycle.consume(SessionInput::Disconnect).unwrap(),
            Some(AnimationCue::StopCue)
        );
        assert_eq!(lifecycle.state(), SessionState::Disconnecting);
        lifecycle.consume(SessionInput::Disconnected).unwrap();
        assert_eq!(lifecycle.state(), SessionState::Idle);
    }

    #[test]
    fn test_invalid_transition_keeps_state() {
        let mut lifecycle = Lifecycle::default();
        let err = lifecycle.consume(SessionInput::Pause).unwrap_err();
        assert!(matches!(err, HrmError::InvalidTransition(SessionState::Idle)));
        assert_eq!(lifecycle.state(), SessionState::Idle);
        assert!(lifecycle.consume(SessionInput::ChannelLost).is_err());
    }
}
