//! Flight sequencer: take-off, enable control, fly, disable control.
//!
//! ```text
//! Grounded -> TakingOff -> ControlEnabled -> Disabling -> Terminated
//!     \____________\______________________________________/
//!                     (loop exit from any state)
//! ```

use std::thread;
use std::time::{Duration, Instant};

use anyhow::Result;
use serde::Deserialize;
use tracing::{debug, info, warn};

use crate::control::VelocityCommand;

use super::error::FlightError;
use super::state::FlightState;
use super::transport::{Ack, VehicleTransport};

/// Bounded retry for a lifecycle request.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub delay_ms: u64,
    /// Give up once this much time has passed since the first attempt.
    pub timeout_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 20,
            delay_ms: 300,
            timeout_ms: 30_000,
        }
    }
}

impl RetryPolicy {
    pub fn delay(&self) -> Duration {
        Duration::from_millis(self.delay_ms)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

/// Configuration for the FlightSequencer.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SequencerConfig {
    pub takeoff: RetryPolicy,
    pub enable: RetryPolicy,
    /// Hover time between the take-off ack and enabling control.
    pub stabilization_ms: u64,
    /// Consecutive failed velocity acks that count as a lost link.
    pub max_consecutive_ack_failures: u32,
}

impl Default for SequencerConfig {
    fn default() -> Self {
        Self {
            takeoff: RetryPolicy::default(),
            enable: RetryPolicy::default(),
            stabilization_ms: 5000,
            max_consecutive_ack_failures: 10,
        }
    }
}

/// Counters for the sequencer.
#[derive(Debug, Default, Clone)]
pub struct SequencerStats {
    pub takeoff_attempts: u32,
    pub enable_attempts: u32,
    pub commands_sent: usize,
    pub commands_acked: usize,
    pub ack_failures: usize,
}

/// Owns the vehicle transport and gates velocity commands on flight state.
pub struct FlightSequencer<T: VehicleTransport> {
    transport: T,
    config: SequencerConfig,
    state: FlightState,
    consecutive_failures: u32,
    stats: SequencerStats,
}

impl<T: VehicleTransport> FlightSequencer<T> {
    pub fn new(transport: T, config: SequencerConfig) -> Self {
        Self {
            transport,
            config,
            state: FlightState::Grounded,
            consecutive_failures: 0,
            stats: SequencerStats::default(),
        }
    }

    pub fn state(&self) -> FlightState {
        self.state
    }

    pub fn stats(&self) -> &SequencerStats {
        &self.stats
    }

    /// Take off and enable control.
    ///
    /// Both requests retry under their [`RetryPolicy`]. On exhaustion the
    /// sequencer becomes `Terminated` and the error is returned.
    pub fn engage(&mut self) -> Result<(), FlightError> {
        if self.state != FlightState::Grounded {
            return Err(FlightError::InvalidTransition(self.state));
        }

        self.transition(FlightState::TakingOff);
        let outcome = retry_request(&mut self.transport, "take-off", &self.config.takeoff, |t| {
            t.takeoff()
        });
        self.stats.takeoff_attempts = outcome.attempts;
        if !outcome.succeeded {
            self.transition(FlightState::Terminated);
            return Err(FlightError::TakeoffFailed {
                attempts: outcome.attempts,
                elapsed: outcome.elapsed,
            });
        }

        let stabilization = Duration::from_millis(self.config.stabilization_ms);
        info!("Take-off acknowledged, stabilizing for {:?}", stabilization);
        thread::sleep(stabilization);

        let outcome = retry_request(
            &mut self.transport,
            "enable-control",
            &self.config.enable,
            |t| t.enable_control(),
        );
        self.stats.enable_attempts = outcome.attempts;
        if !outcome.succeeded {
            self.transition(FlightState::Terminated);
            return Err(FlightError::EnableFailed {
                attempts: outcome.attempts,
                elapsed: outcome.elapsed,
            });
        }

        self.transition(FlightState::ControlEnabled);
        Ok(())
    }

    /// Forward one velocity command and wait for its acknowledgment.
    ///
    /// Only valid in `ControlEnabled`. A failed ack is tolerated until
    /// `max_consecutive_ack_failures` is reached, which yields
    /// [`FlightError::LinkLost`].
    pub fn apply(&mut self, command: VelocityCommand) -> Result<(), FlightError> {
        if !self.state.accepts_commands() {
            return Err(FlightError::NotEnabled(self.state));
        }

        self.stats.commands_sent += 1;
        let failure = match self
            .transport
            .send_velocity(command.ascent, command.roll, command.pitch)
        {
            Ok(Ack::Success) => None,
            Ok(Ack::Rejected(reply)) => Some(format!("rejected: {}", reply)),
            Err(e) => Some(format!("{:#}", e)),
        };

        match failure {
            None => {
                self.consecutive_failures = 0;
                self.stats.commands_acked += 1;
                debug!(
                    "Command acked: ascent={:.4} roll={:.4} pitch={:.4}",
                    command.ascent, command.roll, command.pitch
                );
                Ok(())
            }
            Some(reason) => {
                self.consecutive_failures += 1;
                self.stats.ack_failures += 1;
                warn!(
                    "Velocity command not acknowledged ({}/{}): {}",
                    self.consecutive_failures, self.config.max_consecutive_ack_failures, reason
                );
                if self.consecutive_failures >= self.config.max_consecutive_ack_failures {
                    Err(FlightError::LinkLost {
                        consecutive: self.consecutive_failures,
                    })
                } else {
                    Ok(())
                }
            }
        }
    }

    /// Leave the air-control lifecycle.
    ///
    /// From `ControlEnabled`: one zero command, then disable-control. From any
    /// other state nothing is sent. Returns whether disable-control was
    /// acknowledged (trivially true when there was nothing to disable).
    pub fn shutdown(&mut self) -> bool {
        match self.state {
            FlightState::Terminated => true,
            FlightState::ControlEnabled => {
                self.transition(FlightState::Disabling);

                let zero = VelocityCommand::ZERO;
                match self.transport.send_velocity(zero.ascent, zero.roll, zero.pitch) {
                    Ok(Ack::Success) => debug!("Neutral command acked"),
                    Ok(Ack::Rejected(reply)) => warn!("Neutral command rejected: {}", reply),
                    Err(e) => warn!("Neutral command failed: {:#}", e),
                }

                let disabled = match self.transport.disable_control() {
                    Ok(Ack::Success) => true,
                    Ok(Ack::Rejected(reply)) => {
                        warn!("Disable-control rejected: {}", reply);
                        false
                    }
                    Err(e) => {
                        warn!("Disable-control failed: {:#}", e);
                        false
                    }
                };

                self.transition(FlightState::Terminated);
                disabled
            }
            _ => {
                self.transition(FlightState::Terminated);
                true
            }
        }
    }

    fn transition(&mut self, next: FlightState) {
        info!("Flight state {} -> {}", self.state, next);
        self.state = next;
    }
}

impl<T: VehicleTransport> Drop for FlightSequencer<T> {
    fn drop(&mut self) {
        self.shutdown();
    }
}

struct RetryOutcome {
    succeeded: bool,
    attempts: u32,
    elapsed: Duration,
}

fn retry_request<T, F>(
    transport: &mut T,
    what: &str,
    policy: &RetryPolicy,
    mut op: F,
) -> RetryOutcome
where
    T: VehicleTransport,
    F: FnMut(&mut T) -> Result<Ack>,
{
    let start = Instant::now();
    let max_attempts = policy.max_attempts.max(1);
    let mut attempts = 0;

    loop {
        attempts += 1;
        match op(transport) {
            Ok(Ack::Success) => {
                return RetryOutcome {
                    succeeded: true,
                    attempts,
                    elapsed: start.elapsed(),
                };
            }
            Ok(Ack::Rejected(reply)) => {
                warn!("{} attempt {}/{} rejected: {}", what, attempts, max_attempts, reply);
            }
            Err(e) => {
                warn!("{} attempt {}/{} failed: {:#}", what, attempts, max_attempts, e);
            }
        }

        if attempts >= max_attempts || start.elapsed() + policy.delay() > policy.timeout() {
            return RetryOutcome {
                succeeded: false,
                attempts,
                elapsed: start.elapsed(),
            };
        }
        thread::sleep(policy.delay());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{Reply, ScriptedVehicle, VehicleCall};

    fn fast_config() -> SequencerConfig {
        let policy = RetryPolicy {
            max_attempts: 5,
            delay_ms: 0,
            timeout_ms: 10_000,
        };
        SequencerConfig {
            takeoff: policy.clone(),
            enable: policy,
            stabilization_ms: 0,
            max_consecutive_ack_failures: 3,
        }
    }

    fn engaged(vehicle: ScriptedVehicle) -> FlightSequencer<ScriptedVehicle> {
        let mut seq = FlightSequencer::new(vehicle, fast_config());
        seq.engage().unwrap();
        seq
    }

    #[test]
    fn test_engage_reaches_control_enabled() {
        let vehicle = ScriptedVehicle::new();
        let log = vehicle.log();
        let seq = engaged(vehicle);

        assert_eq!(seq.state(), FlightState::ControlEnabled);
        assert_eq!(log.calls(), vec![VehicleCall::Takeoff, VehicleCall::EnableControl]);
    }

    #[test]
    fn test_takeoff_retries_until_acknowledged() {
        let vehicle = ScriptedVehicle::new().with_takeoff_failures(3);
        let log = vehicle.log();
        let seq = engaged(vehicle);

        assert_eq!(seq.stats().takeoff_attempts, 4);
        assert_eq!(log.count(&VehicleCall::Takeoff), 4);
        assert_eq!(seq.state(), FlightState::ControlEnabled);
    }

    #[test]
    fn test_takeoff_retries_are_bounded() {
        let vehicle = ScriptedVehicle::new().with_takeoff_failures(u32::MAX);
        let log = vehicle.log();
        let mut seq = FlightSequencer::new(vehicle, fast_config());

        let err = seq.engage().unwrap_err();
        assert!(matches!(err, FlightError::TakeoffFailed { attempts: 5, .. }));
        assert!(err.is_fatal());
        assert_eq!(seq.state(), FlightState::Terminated);
        assert_eq!(log.count(&VehicleCall::Takeoff), 5);
        assert_eq!(log.count(&VehicleCall::EnableControl), 0);
    }

    #[test]
    fn test_takeoff_timeout_stops_retrying() {
        let vehicle = ScriptedVehicle::new().with_takeoff_failures(u32::MAX);
        let log = vehicle.log();
        let mut config = fast_config();
        config.takeoff = RetryPolicy {
            max_attempts: 1000,
            delay_ms: 20,
            timeout_ms: 50,
        };
        let mut seq = FlightSequencer::new(vehicle, config);

        assert!(matches!(seq.engage(), Err(FlightError::TakeoffFailed { .. })));
        assert!(log.count(&VehicleCall::Takeoff) < 10);
    }

    #[test]
    fn test_enable_failure_is_fatal() {
        let vehicle = ScriptedVehicle::new().with_enable_failures(u32::MAX);
        let mut seq = FlightSequencer::new(vehicle, fast_config());

        assert!(matches!(
            seq.engage(),
            Err(FlightError::EnableFailed { attempts: 5, .. })
        ));
        assert_eq!(seq.state(), FlightState::Terminated);
    }

    #[test]
    fn test_apply_rejected_outside_control_enabled() {
        let vehicle = ScriptedVehicle::new();
        let log = vehicle.log();
        let mut seq = FlightSequencer::new(vehicle, fast_config());
        let cmd = VelocityCommand::new(0.001, 0.0, 0.0);

        // Grounded
        assert!(matches!(
            seq.apply(cmd),
            Err(FlightError::NotEnabled(FlightState::Grounded))
        ));

        // Terminated
        seq.shutdown();
        assert!(matches!(
            seq.apply(cmd),
            Err(FlightError::NotEnabled(FlightState::Terminated))
        ));
        assert!(log.calls().is_empty());
    }

    #[test]
    fn test_apply_rejected_in_transitional_states() {
        for state in [FlightState::TakingOff, FlightState::Disabling] {
            let mut seq = FlightSequencer::new(ScriptedVehicle::new(), fast_config());
            seq.state = state;
            let err = seq.apply(VelocityCommand::ZERO).unwrap_err();
            assert!(matches!(err, FlightError::NotEnabled(s) if s == state));
            assert!(!err.is_fatal());
            seq.state = FlightState::Terminated;
        }
    }

    #[test]
    fn test_apply_forwards_command() {
        let vehicle = ScriptedVehicle::new();
        let log = vehicle.log();
        let mut seq = engaged(vehicle);
        let cmd = VelocityCommand::new(0.001, -0.002, 0.003);

        seq.apply(cmd).unwrap();
        assert_eq!(log.calls().last(), Some(&VehicleCall::Velocity(cmd)));
        assert_eq!(seq.stats().commands_acked, 1);
    }

    #[test]
    fn test_shutdown_sends_one_zero_then_disable() {
        let vehicle = ScriptedVehicle::new();
        let log = vehicle.log();
        let mut seq = engaged(vehicle);
        seq.apply(VelocityCommand::new(0.0, 0.004, 0.0)).unwrap();

        assert!(seq.shutdown());
        assert_eq!(seq.state(), FlightState::Terminated);
        let calls = log.calls();
        assert_eq!(
            &calls[calls.len() - 2..],
            &[
                VehicleCall::Velocity(VelocityCommand::ZERO),
                VehicleCall::DisableControl
            ]
        );

        // Idempotent: a second shutdown (and the drop) sends nothing.
        assert!(seq.shutdown());
        drop(seq);
        assert_eq!(log.calls().len(), calls.len());
    }

    #[test]
    fn test_shutdown_from_grounded_sends_nothing() {
        let vehicle = ScriptedVehicle::new();
        let log = vehicle.log();
        let mut seq = FlightSequencer::new(vehicle, fast_config());

        assert!(seq.shutdown());
        assert_eq!(seq.state(), FlightState::Terminated);
        assert!(log.calls().is_empty());
    }

    #[test]
    fn test_consecutive_ack_failures_lose_link() {
        let vehicle = ScriptedVehicle::new().with_velocity_replies([
            Reply::Reject,
            Reply::Error,
            Reply::Ok,
            Reply::Reject,
            Reply::Error,
        ]);
        let mut seq = engaged(vehicle);
        let cmd = VelocityCommand::ZERO;

        assert!(seq.apply(cmd).is_ok());
        assert!(seq.apply(cmd).is_ok());
        // Success resets the streak.
        assert!(seq.apply(cmd).is_ok());
        assert!(seq.apply(cmd).is_ok());
        assert!(seq.apply(cmd).is_ok());
        assert_eq!(seq.stats().ack_failures, 4);
    }

    #[test]
    fn test_link_lost_at_threshold() {
        let vehicle = ScriptedVehicle::new().with_velocity_default(Reply::Error);
        let mut seq = engaged(vehicle);

        assert!(seq.apply(VelocityCommand::ZERO).is_ok());
        assert!(seq.apply(VelocityCommand::ZERO).is_ok());
        let err = seq.apply(VelocityCommand::ZERO).unwrap_err();
        assert!(matches!(err, FlightError::LinkLost { consecutive: 3 }));
        assert!(err.is_fatal());
        // Still enabled: the caller decides to shut down.
        assert_eq!(seq.state(), FlightState::ControlEnabled);
    }

    #[test]
    fn test_engage_twice_is_invalid() {
        let mut seq = engaged(ScriptedVehicle::new());
        assert!(matches!(
            seq.engage(),
            Err(FlightError::InvalidTransition(FlightState::ControlEnabled))
        ));
    }
}
