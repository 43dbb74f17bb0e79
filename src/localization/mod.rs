//! Interface to the localization service.
//!
//! The control loop only needs "given a frame, where is the camera relative
//! to the map, if known". How that is computed belongs to the service.

pub mod map;
pub mod map_localizer;

pub use map::LandmarkMap;
pub use map_localizer::{LocalizerConfig, MapLocalizer};

use anyhow::Result;

use crate::geometry::PoseEstimate;
use crate::io::Frame;

/// Map-relative pose estimation for a single frame.
///
/// `Ok(None)` is an expected outcome (tracking lost, too few features).
/// `Err` means the estimator failed on this frame; callers treat it like
/// `Ok(None)`.
pub trait PoseEstimator {
    fn process(&mut self, frame: &Frame) -> Result<Option<PoseEstimate>>;
}

impl<P: PoseEstimator + ?Sized> PoseEstimator for Box<P> {
    fn process(&mut self, frame: &Frame) -> Result<Option<PoseEstimate>> {
        (**self).process(frame)
    }
}
