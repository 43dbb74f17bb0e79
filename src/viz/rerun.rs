//! Rerun-based flight plots.
//!
//! Entity hierarchy:
//!     status               - Iteration, tracking and flight state
//!     camera/image         - Frame as seen by the localizer
//!     world/
//!         origin           - Map origin (hold target)
//!         camera           - Current camera pose
//!         trajectory       - Camera centre history
//!     plots/
//!         position/{x,y,z} - Camera centre
//!         heading          - Camera heading about the map's vertical axis
//!         command/{ascent,roll,pitch}

use anyhow::{Context, Result};
use nalgebra::{Rotation3, UnitQuaternion, Vector3};
use opencv::core::Mat;
use opencv::imgproc;
use opencv::prelude::*;
use rerun::{RecordingStream, external::glam};

use crate::geometry::PoseEstimate;

use super::{IterationStatus, StatusSink};

pub struct RerunPlotter {
    rec: RecordingStream,
    start_timestamp_ns: Option<u64>,
    trajectory: Vec<Vector3<f64>>,
}

impl RerunPlotter {
    /// Spawn a viewer process and connect to it.
    pub fn spawn(app_name: &str) -> Result<Self> {
        let rec = rerun::RecordingStreamBuilder::new(app_name)
            .spawn()
            .context("Failed to spawn rerun viewer")?;
        Ok(Self::new(rec))
    }

    pub fn new(rec: RecordingStream) -> Self {
        // OpenCV camera convention: X right, Y down, Z forward.
        rec.log_static("world", &rerun::ViewCoordinates::RDF()).ok();
        rec.log_static(
            "world/origin",
            &rerun::Points3D::new([[0.0f32, 0.0, 0.0]])
                .with_colors([[255u8, 200, 0]])
                .with_radii([0.05f32]),
        )
        .ok();

        Self {
            rec,
            start_timestamp_ns: None,
            trajectory: Vec::new(),
        }
    }

    /// Set the timeline position relative to the first logged frame.
    fn set_time(&mut self, iteration: usize, timestamp_ns: Option<u64>) {
        self.rec.set_time_sequence("iteration", iteration as i64);
        if let Some(timestamp_ns) = timestamp_ns {
            let start_ns = *self.start_timestamp_ns.get_or_insert(timestamp_ns);
            let relative_sec = timestamp_ns.saturating_sub(start_ns) as f64 / 1e9;
            self.rec.set_duration_secs("time", relative_sec);
        }
    }

    fn log_status(&self, status: &IterationStatus<'_>) {
        let tracking = if status.estimate.is_some() {
            "**TRACKING**"
        } else {
            "**LOST**"
        };
        let flight = status
            .flight_state
            .map(|s| s.to_string())
            .unwrap_or_else(|| "DRY_RUN".to_string());
        let text = format!(
            "{} | Flight: {} | Iteration: {}/{} | Frames: {}",
            tracking, flight, status.iteration, status.max_iterations, status.frames_read
        );
        self.rec
            .log(
                "status",
                &rerun::TextDocument::new(text).with_media_type(rerun::MediaType::markdown()),
            )
            .ok();
    }

    fn log_image(&self, image: &Mat) {
        if let Ok((data, width, height)) = mat_to_rgb(image) {
            self.rec
                .log("camera/image", &rerun::Image::from_rgb24(data, [width, height]))
                .ok();
        }
    }

    fn log_camera_pose(&self, estimate: &PoseEstimate) {
        let center = estimate.camera_center();
        let q = world_quaternion(estimate);
        let translation = glam::Vec3::new(center.x as f32, center.y as f32, center.z as f32);
        let rotation = glam::Quat::from_xyzw(q.i as f32, q.j as f32, q.k as f32, q.w as f32);

        self.rec
            .log(
                "world/camera",
                &rerun::Transform3D::from_translation_rotation(translation, rotation),
            )
            .ok();

        for (axis, value) in [("x", center.x), ("y", center.y), ("z", center.z)] {
            self.rec
                .log(
                    format!("plots/position/{}", axis),
                    &rerun::Scalars::new([value]),
                )
                .ok();
        }
        self.rec
            .log(
                "plots/heading",
                &rerun::Scalars::new([heading_degrees(estimate)]),
            )
            .ok();
    }

    fn log_trajectory(&self) {
        if self.trajectory.len() < 2 {
            return;
        }
        let pts: Vec<[f32; 3]> = self
            .trajectory
            .iter()
            .map(|p| [p.x as f32, p.y as f32, p.z as f32])
            .collect();

        self.rec
            .log(
                "world/trajectory",
                &rerun::LineStrips3D::new([pts])
                    .with_colors([[128u8, 128, 128]])
                    .with_radii([0.005f32]),
            )
            .ok();
    }
}

impl StatusSink for RerunPlotter {
    fn update(&mut self, status: &IterationStatus<'_>) {
        self.set_time(status.iteration, status.frame.map(|f| f.timestamp_ns));
        self.log_status(status);

        if let Some(frame) = status.frame {
            self.log_image(&frame.image);
        }

        if let Some(estimate) = status.estimate {
            self.log_camera_pose(estimate);
            self.trajectory.push(estimate.camera_center());
            self.log_trajectory();
        }

        let cmd = status.command;
        for (axis, value) in [("ascent", cmd.ascent), ("roll", cmd.roll), ("pitch", cmd.pitch)] {
            self.rec
                .log(format!("plots/command/{}", axis), &rerun::Scalars::new([value]))
                .ok();
        }
    }

    fn finish(&mut self) {
        let _ = self.rec.flush_blocking();
    }
}

/// Camera orientation in the map frame.
fn world_quaternion(estimate: &PoseEstimate) -> UnitQuaternion<f64> {
    let rotation = Rotation3::from_matrix_unchecked(estimate.world_rotation());
    UnitQuaternion::from_rotation_matrix(&rotation)
}

/// Angle of the camera's optical axis in the map's X-Z plane, degrees.
/// Zero when looking along +Z.
pub fn heading_degrees(estimate: &PoseEstimate) -> f64 {
    let forward = estimate.world_rotation() * Vector3::z();
    forward.x.atan2(forward.z).to_degrees()
}

/// Convert a BGR (or gray) Mat to packed RGB bytes.
fn mat_to_rgb(mat: &Mat) -> Result<(Vec<u8>, u32, u32), opencv::Error> {
    let mut rgb = Mat::default();
    let code = if mat.channels() == 1 {
        imgproc::COLOR_GRAY2RGB
    } else {
        imgproc::COLOR_BGR2RGB
    };
    imgproc::cvt_color_def(mat, &mut rgb, code)?;

    let data = rgb.data_bytes()?.to_vec();
    Ok((data, rgb.cols() as u32, rgb.rows() as u32))
}
