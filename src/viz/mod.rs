//! Status display and instrumentation.
//!
//! Sinks observe each control iteration after the command has been applied.
//! They never feed back into control.

pub mod overlay;
pub mod rerun;

pub use overlay::{OverlayConfig, OverlayWindow};
pub use rerun::RerunPlotter;

use crate::control::VelocityCommand;
use crate::flight::FlightState;
use crate::geometry::PoseEstimate;
use crate::io::Frame;

/// Snapshot of one finished iteration.
pub struct IterationStatus<'a> {
    /// Iterations attempted so far, including this one.
    pub iteration: usize,
    pub max_iterations: usize,
    /// Frames successfully read so far.
    pub frames_read: usize,
    pub frame: Option<&'a Frame>,
    pub estimate: Option<&'a PoseEstimate>,
    pub command: VelocityCommand,
    /// `None` when flight control is disabled.
    pub flight_state: Option<FlightState>,
}

pub trait StatusSink {
    fn update(&mut self, status: &IterationStatus<'_>);

    /// Called once after the loop has terminated.
    fn finish(&mut self) {}
}
