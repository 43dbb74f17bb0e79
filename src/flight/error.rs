use std::time::Duration;

use thiserror::Error;

use super::state::FlightState;

/// Flight sequencing errors.
#[derive(Debug, Error)]
pub enum FlightError {
    #[error("velocity command rejected: control is not enabled (state {0})")]
    NotEnabled(FlightState),

    #[error("take-off not acknowledged after {attempts} attempts ({elapsed:?})")]
    TakeoffFailed { attempts: u32, elapsed: Duration },

    #[error("enable-control not acknowledged after {attempts} attempts ({elapsed:?})")]
    EnableFailed { attempts: u32, elapsed: Duration },

    #[error("vehicle link lost: {consecutive} consecutive command acknowledgments failed")]
    LinkLost { consecutive: u32 },

    #[error("cannot engage from state {0}")]
    InvalidTransition(FlightState),
}

impl FlightError {
    /// Fatal errors end the control loop.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, Self::NotEnabled(_))
    }
}
