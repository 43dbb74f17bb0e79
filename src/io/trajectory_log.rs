//! Per-iteration CSV log of estimates and commands.

use std::fs::File;
use std::path::Path;

use anyhow::{Context, Result};
use csv::Writer;
use serde::Serialize;
use tracing::warn;

use crate::viz::{IterationStatus, StatusSink};

#[derive(Debug, Serialize)]
struct TrajectoryRow {
    iteration: usize,
    timestamp_ns: Option<u64>,
    tracked: bool,
    tx: Option<f64>,
    ty: Option<f64>,
    tz: Option<f64>,
    center_x: Option<f64>,
    center_y: Option<f64>,
    center_z: Option<f64>,
    ascent: f64,
    roll: f64,
    pitch: f64,
    flight_state: String,
}

impl TrajectoryRow {
    fn from_status(status: &IterationStatus<'_>) -> Self {
        let t = status.estimate.map(|e| e.translation);
        let c = status.estimate.map(|e| e.camera_center());
        Self {
            iteration: status.iteration,
            timestamp_ns: status.frame.map(|f| f.timestamp_ns),
            tracked: status.estimate.is_some(),
            tx: t.map(|t| t.x),
            ty: t.map(|t| t.y),
            tz: t.map(|t| t.z),
            center_x: c.map(|c| c.x),
            center_y: c.map(|c| c.y),
            center_z: c.map(|c| c.z),
            ascent: status.command.ascent,
            roll: status.command.roll,
            pitch: status.command.pitch,
            flight_state: status
                .flight_state
                .map(|s| s.to_string())
                .unwrap_or_else(|| "DRY_RUN".to_string()),
        }
    }
}

/// Appends one CSV row per iteration.
pub struct TrajectoryLog {
    writer: Writer<File>,
    write_failed: bool,
}

impl TrajectoryLog {
    pub fn create<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let writer = Writer::from_path(path)
            .with_context(|| format!("Failed to create trajectory log {:?}", path))?;
        Ok(Self {
            writer,
            write_failed: false,
        })
    }
}

impl StatusSink for TrajectoryLog {
    fn update(&mut self, status: &IterationStatus<'_>) {
        if self.write_failed {
            return;
        }
        if let Err(e) = self.writer.serialize(TrajectoryRow::from_status(status)) {
            warn!("Trajectory log disabled after write error: {}", e);
            self.write_failed = true;
        }
    }

    fn finish(&mut self) {
        if let Err(e) = self.writer.flush() {
            warn!("Failed to flush trajectory log: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::control::VelocityCommand;
    use crate::flight::FlightState;
    use crate::geometry::PoseEstimate;
    use nalgebra::{Matrix3, Vector3};

    #[test]
    fn test_rows_leave_missing_estimates_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("trajectory.csv");
        let pose = PoseEstimate::new(Matrix3::identity(), Vector3::new(1.0, 2.0, 3.0));

        let mut log = TrajectoryLog::create(&path).unwrap();
        log.update(&IterationStatus {
            iteration: 1,
            max_iterations: 2,
            frames_read: 1,
            frame: None,
            estimate: Some(&pose),
            command: VelocityCommand::new(0.0, 0.005, -0.005),
            flight_state: Some(FlightState::ControlEnabled),
        });
        log.update(&IterationStatus {
            iteration: 2,
            max_iterations: 2,
            frames_read: 1,
            frame: None,
            estimate: None,
            command: VelocityCommand::ZERO,
            flight_state: None,
        });
        log.finish();

        let mut reader = csv::Reader::from_path(&path).unwrap();
        let headers = reader.headers().unwrap().clone();
        assert_eq!(&headers[0], "iteration");
        assert_eq!(&headers[12], "flight_state");

        let rows: Vec<csv::StringRecord> = reader.records().map(|r| r.unwrap()).collect();
        assert_eq!(rows.len(), 2);
        assert_eq!(&rows[0][2], "true");
        assert_eq!(&rows[0][6], "-1.0");
        assert_eq!(&rows[0][12], "CONTROL_ENABLED");
        assert_eq!(&rows[1][2], "false");
        assert_eq!(&rows[1][3], "");
        assert_eq!(&rows[1][12], "DRY_RUN");
    }
}
