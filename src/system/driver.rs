//! The control loop: frame in, pose estimate, bounded command out.

use std::time::{Duration, Instant};

use tracing::{debug, error, info, warn};

use crate::control::{VelocityCommand, VelocityCommander};
use crate::flight::{FlightError, FlightSequencer, VehicleTransport};
use crate::geometry::PoseEstimate;
use crate::io::{Frame, FrameRead, FrameSource};
use crate::localization::PoseEstimator;
use crate::viz::{IterationStatus, StatusSink};

use super::cancel::CancelSignal;
use super::config::PilotConfig;
use super::context::IterationContext;
use super::report::{LoopSummary, TerminationReason};
use super::ticker::{Tick, Ticker};

/// Loop cadence and limits.
#[derive(Debug, Clone)]
pub struct LoopConfig {
    pub max_iterations: usize,
    pub min_interval: Duration,
    pub max_consecutive_frame_failures: Option<usize>,
}

impl Default for LoopConfig {
    fn default() -> Self {
        Self {
            max_iterations: 100,
            min_interval: Duration::from_millis(20),
            max_consecutive_frame_failures: None,
        }
    }
}

impl From<&PilotConfig> for LoopConfig {
    fn from(config: &PilotConfig) -> Self {
        Self {
            max_iterations: config.max_iterations,
            min_interval: config.min_interval(),
            max_consecutive_frame_failures: config.max_consecutive_frame_failures,
        }
    }
}

/// Runs the capture -> estimate -> command -> dispatch cycle.
///
/// Without a sequencer the loop runs dry: commands are computed and shown
/// to the sinks but never sent.
pub struct ControlLoopDriver<F, P, T>
where
    F: FrameSource,
    P: PoseEstimator,
    T: VehicleTransport,
{
    frames: F,
    estimator: P,
    commander: VelocityCommander,
    sequencer: Option<FlightSequencer<T>>,
    cancel: CancelSignal,
    config: LoopConfig,
    sinks: Vec<Box<dyn StatusSink>>,
}

impl<F, P, T> ControlLoopDriver<F, P, T>
where
    F: FrameSource,
    P: PoseEstimator,
    T: VehicleTransport,
{
    pub fn new(
        frames: F,
        estimator: P,
        commander: VelocityCommander,
        sequencer: Option<FlightSequencer<T>>,
        cancel: CancelSignal,
        config: LoopConfig,
    ) -> Self {
        Self {
            frames,
            estimator,
            commander,
            sequencer,
            cancel,
            config,
            sinks: Vec::new(),
        }
    }

    pub fn with_sink(mut self, sink: Box<dyn StatusSink>) -> Self {
        self.sinks.push(sink);
        self
    }

    /// Engage the vehicle, loop until a termination condition holds, then
    /// shut the vehicle down.
    pub fn run(mut self) -> LoopSummary {
        info!(
            "Control loop starting: source={}, max_iterations={}, min_interval={:?}, control={}",
            self.frames.describe(),
            self.config.max_iterations,
            self.config.min_interval,
            self.sequencer.is_some()
        );
        let start = Instant::now();
        let mut ctx = IterationContext::new(self.config.max_iterations, self.config.min_interval);

        let reason = match self.engage() {
            Ok(()) => self.run_loop(&mut ctx),
            Err(reason) => reason,
        };

        let (final_state, disabled_cleanly) = match self.sequencer.as_mut() {
            Some(sequencer) => {
                let disabled = sequencer.shutdown();
                (Some(sequencer.state()), disabled)
            }
            None => (None, true),
        };

        for sink in &mut self.sinks {
            sink.finish();
        }

        let summary = LoopSummary {
            reason,
            iterations: ctx.iteration,
            frames_read: ctx.frames_read,
            frame_failures: ctx.frame_failures,
            estimates: ctx.estimates,
            estimator_errors: ctx.estimator_errors,
            commands_applied: ctx.commands_applied,
            final_state,
            disabled_cleanly,
        };
        info!(
            "Control loop finished after {:?}: {} ({} iterations, {} frames, {} estimates)",
            start.elapsed(),
            summary.reason,
            summary.iterations,
            summary.frames_read,
            summary.estimates
        );
        summary
    }

    fn engage(&mut self) -> Result<(), TerminationReason> {
        let Some(sequencer) = self.sequencer.as_mut() else {
            info!("Flight control disabled, running dry");
            return Ok(());
        };
        sequencer.engage().map_err(|e| {
            error!("Failed to engage vehicle: {}", e);
            TerminationReason::EngageFailed(e.to_string())
        })
    }

    fn run_loop(&mut self, ctx: &mut IterationContext) -> TerminationReason {
        let mut ticker = Ticker::new(ctx.min_interval);
        loop {
            if let Some(reason) = ctx.termination() {
                return reason;
            }
            if ticker.wait(&self.cancel) == Tick::Cancelled {
                info!("Cancellation requested after {} iterations", ctx.iteration);
                ctx.cancelled = true;
                continue;
            }
            self.step(ctx);
        }
    }

    fn step(&mut self, ctx: &mut IterationContext) {
        ctx.iteration += 1;

        match self.frames.read() {
            FrameRead::Ready(frame) => {
                ctx.record_frame();
                let estimate = self.estimate(ctx, &frame);
                let command = self.commander.command(estimate.as_ref());
                debug!(
                    "Iteration {}: tracked={} command=({:.4}, {:.4}, {:.4})",
                    ctx.iteration,
                    estimate.is_some(),
                    command.ascent,
                    command.roll,
                    command.pitch
                );
                self.dispatch(ctx, command);
                self.notify(ctx, Some(&frame), estimate.as_ref(), command);
            }
            FrameRead::Unavailable => {
                ctx.record_frame_failure();
                debug!("Iteration {}: no frame", ctx.iteration);
                self.dispatch(ctx, VelocityCommand::ZERO);
                if let Some(limit) = self.config.max_consecutive_frame_failures {
                    if ctx.consecutive_frame_failures >= limit {
                        error!("{} consecutive frame failures", ctx.consecutive_frame_failures);
                        ctx.fatal = Some(TerminationReason::FrameFailures {
                            consecutive: ctx.consecutive_frame_failures,
                        });
                    }
                }
                self.notify(ctx, None, None, VelocityCommand::ZERO);
            }
            FrameRead::Closed => {
                ctx.record_frame_failure();
                warn!("Frame source {} closed", self.frames.describe());
                ctx.fatal = Some(TerminationReason::FrameSourceClosed);
            }
        }
    }

    /// Estimator errors and malformed rotations both count as no estimate.
    fn estimate(&mut self, ctx: &mut IterationContext, frame: &Frame) -> Option<PoseEstimate> {
        let estimate = match self.estimator.process(frame) {
            Ok(estimate) => estimate,
            Err(e) => {
                ctx.estimator_errors += 1;
                warn!("Pose estimation failed: {:#}", e);
                None
            }
        };

        match estimate {
            Some(pose) if !pose.has_valid_rotation() => {
                warn!("Discarding estimate with non-orthonormal rotation");
                None
            }
            Some(pose) => {
                ctx.estimates += 1;
                Some(pose)
            }
            None => None,
        }
    }

    fn dispatch(&mut self, ctx: &mut IterationContext, command: VelocityCommand) {
        let Some(sequencer) = self.sequencer.as_mut() else {
            return;
        };
        match sequencer.apply(command) {
            Ok(()) => ctx.commands_applied += 1,
            Err(FlightError::LinkLost { consecutive }) => {
                error!("Vehicle link lost after {} unacknowledged commands", consecutive);
                ctx.fatal = Some(TerminationReason::VehicleLinkLost { consecutive });
            }
            Err(e) => warn!("Command not sent: {}", e),
        }
    }

    fn notify(
        &mut self,
        ctx: &IterationContext,
        frame: Option<&Frame>,
        estimate: Option<&PoseEstimate>,
        command: VelocityCommand,
    ) {
        if self.sinks.is_empty() {
            return;
        }
        let status = IterationStatus {
            iteration: ctx.iteration,
            max_iterations: ctx.max_iterations,
            frames_read: ctx.frames_read,
            frame,
            estimate,
            command,
            flight_state: self.sequencer.as_ref().map(|s| s.state()),
        };
        for sink in &mut self.sinks {
            sink.update(&status);
        }
    }
}
