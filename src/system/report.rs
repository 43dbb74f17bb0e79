//! Run outcome reporting.

use std::fmt;

use crate::flight::FlightState;

/// Why the control loop stopped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TerminationReason {
    IterationLimit,
    Cancelled,
    /// The frame source can never deliver another frame.
    FrameSourceClosed,
    /// Too many frame failures in a row.
    FrameFailures { consecutive: usize },
    /// Velocity commands stopped being acknowledged.
    VehicleLinkLost { consecutive: u32 },
    /// Take-off or enable-control never succeeded; the loop did not run.
    EngageFailed(String),
}

impl TerminationReason {
    /// Clean exits are the iteration limit and user cancellation.
    pub fn is_clean(&self) -> bool {
        matches!(self, Self::IterationLimit | Self::Cancelled)
    }
}

impl fmt::Display for TerminationReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::IterationLimit => write!(f, "iteration limit reached"),
            Self::Cancelled => write!(f, "cancelled"),
            Self::FrameSourceClosed => write!(f, "frame source closed"),
            Self::FrameFailures { consecutive } => {
                write!(f, "{} consecutive frame failures", consecutive)
            }
            Self::VehicleLinkLost { consecutive } => {
                write!(f, "vehicle link lost after {} failed acks", consecutive)
            }
            Self::EngageFailed(reason) => write!(f, "engage failed: {}", reason),
        }
    }
}

/// Summary of a finished run.
#[derive(Debug, Clone)]
pub struct LoopSummary {
    pub reason: TerminationReason,
    pub iterations: usize,
    pub frames_read: usize,
    pub frame_failures: usize,
    pub estimates: usize,
    pub estimator_errors: usize,
    pub commands_applied: usize,
    /// `None` when flight control was disabled.
    pub final_state: Option<FlightState>,
    /// Whether disable-control was acknowledged at shutdown.
    pub disabled_cleanly: bool,
}

impl LoopSummary {
    /// Fraction of read frames that produced a pose estimate.
    pub fn tracking_ratio(&self) -> f64 {
        if self.frames_read > 0 {
            self.estimates as f64 / self.frames_read as f64
        } else {
            0.0
        }
    }
}
