//! Pose-to-velocity control law.
//!
//! Turns a map-relative pose estimate into a bounded proportional velocity
//! correction that pulls the vehicle back toward the map origin.

pub mod commander;

pub use commander::{CommanderConfig, VelocityCommand, VelocityCommander, clamp_symmetric};
