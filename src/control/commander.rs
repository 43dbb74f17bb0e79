//! Velocity commander: proportional correction with per-axis clamping.

use anyhow::{Result, bail};
use serde::Deserialize;

use crate::geometry::PoseEstimate;

/// Velocity correction sent to the vehicle.
///
/// Axes use the vehicle's stick convention: `ascent` (up/down),
/// `roll` (left/right), `pitch` (back/forward).
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct VelocityCommand {
    pub ascent: f64,
    pub roll: f64,
    pub pitch: f64,
}

impl VelocityCommand {
    /// Fail-safe neutral command.
    pub const ZERO: Self = Self {
        ascent: 0.0,
        roll: 0.0,
        pitch: 0.0,
    };

    pub fn new(ascent: f64, roll: f64, pitch: f64) -> Self {
        Self {
            ascent,
            roll,
            pitch,
        }
    }

    pub fn is_zero(&self) -> bool {
        *self == Self::ZERO
    }
}

/// Tuning for the proportional regulator.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CommanderConfig {
    /// The camera centre is divided by this before becoming a correction.
    pub gain_divisor: f64,
    /// Symmetric per-axis bound on every emitted command.
    pub bound: f64,
    /// Force ascent to zero (horizontal-only hold).
    pub lock_ascent: bool,
}

impl Default for CommanderConfig {
    fn default() -> Self {
        Self {
            gain_divisor: 20.0,
            bound: 0.005,
            lock_ascent: false,
        }
    }
}

/// Clamp `value` into `[-bound, bound]`.
///
/// NaN maps to zero so that a corrupted estimate can never escape the bound.
#[inline]
pub fn clamp_symmetric(value: f64, bound: f64) -> f64 {
    if value.is_nan() {
        return 0.0;
    }
    value.clamp(-bound, bound)
}

/// Converts pose estimates into bounded velocity commands.
#[derive(Debug, Clone)]
pub struct VelocityCommander {
    config: CommanderConfig,
}

impl VelocityCommander {
    pub fn new(config: CommanderConfig) -> Result<Self> {
        if !(config.bound.is_finite() && config.bound > 0.0) {
            bail!("velocity bound must be positive and finite, got {}", config.bound);
        }
        if !(config.gain_divisor.is_finite() && config.gain_divisor > 0.0) {
            bail!(
                "gain divisor must be positive and finite, got {}",
                config.gain_divisor
            );
        }
        Ok(Self { config })
    }

    pub fn bound(&self) -> f64 {
        self.config.bound
    }

    /// Unclamped correction: the negated, scaled camera centre mapped onto
    /// the vehicle axes.
    pub fn raw_correction(&self, estimate: &PoseEstimate) -> VelocityCommand {
        let c = estimate.camera_center() / self.config.gain_divisor;
        VelocityCommand {
            ascent: -c.y,
            roll: -c.x,
            pitch: -c.z,
        }
    }

    /// Bounded command for this iteration. No estimate means no motion.
    pub fn command(&self, estimate: Option<&PoseEstimate>) -> VelocityCommand {
        let Some(estimate) = estimate else {
            return VelocityCommand::ZERO;
        };

        let raw = self.raw_correction(estimate);
        let bound = self.config.bound;
        let ascent = if self.config.lock_ascent {
            0.0
        } else {
            clamp_symmetric(raw.ascent, bound)
        };

        VelocityCommand {
            ascent,
            roll: clamp_symmetric(raw.roll, bound),
            pitch: clamp_symmetric(raw.pitch, bound),
        }
    }
}
