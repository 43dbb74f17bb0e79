//! Geometry types shared by the localization and control layers.

pub mod pose;

pub use pose::{PoseEstimate, is_rotation};
