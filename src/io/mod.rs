//! Inputs and outputs around the control loop: frame sources, calibration,
//! and the trajectory log.

pub mod calibration;
pub mod capture;
pub mod frame;
pub mod image_sequence;
pub mod trajectory_log;

pub use calibration::Calibration;
pub use capture::CaptureSource;
pub use frame::{Frame, FrameRead, FrameSource, Rescaled, scale_image};
pub use image_sequence::ImageSequenceSource;
pub use trajectory_log::TrajectoryLog;
