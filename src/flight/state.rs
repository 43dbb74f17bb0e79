//! Flight lifecycle state machine states.

use std::fmt;

/// Lifecycle state of the vehicle as seen by the sequencer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlightState {
    /// On the ground, no requests issued yet.
    Grounded,
    /// Take-off requested; waiting for ack and stabilization.
    TakingOff,
    /// Virtual-stick control enabled; velocity commands are accepted.
    ControlEnabled,
    /// Neutral command sent, disable-control in progress.
    Disabling,
    /// Terminal. Nothing more is sent.
    Terminated,
}

impl FlightState {
    /// Whether velocity commands may be forwarded in this state.
    pub fn accepts_commands(self) -> bool {
        matches!(self, Self::ControlEnabled)
    }
}

impl Default for FlightState {
    fn default() -> Self {
        Self::Grounded
    }
}

impl fmt::Display for FlightState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Grounded => "GROUNDED",
            Self::TakingOff => "TAKING_OFF",
            Self::ControlEnabled => "CONTROL_ENABLED",
            Self::Disabling => "DISABLING",
            Self::Terminated => "TERMINATED",
        };
        f.write_str(name)
    }
}
