//! Top-level run configuration.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result, bail};
use serde::Deserialize;

use crate::control::CommanderConfig;
use crate::flight::{LinkConfig, SequencerConfig};
use crate::localization::LocalizerConfig;

/// Everything needed to assemble a run. Missing YAML keys take defaults.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PilotConfig {
    /// Drone bridge host, camera index, video file, URL or image directory.
    pub video_source: String,
    /// Read video from the bridge's stream on `link.video_port`.
    pub drone_camera: bool,
    pub max_iterations: usize,
    pub min_interval_ms: u64,
    pub frame_scale: f64,

    pub display: bool,
    pub display_scale: f64,
    pub mirror_display: bool,
    pub quit_key: char,

    /// Fly the vehicle. When false the loop runs dry.
    pub control: bool,
    pub plot: bool,

    pub calibration_path: PathBuf,
    pub map_path: PathBuf,
    pub trajectory_csv: Option<PathBuf>,
    /// Stop after this many frame failures in a row. Unlimited if unset.
    pub max_consecutive_frame_failures: Option<usize>,

    pub commander: CommanderConfig,
    pub sequencer: SequencerConfig,
    pub link: LinkConfig,
    pub localizer: LocalizerConfig,
}

impl Default for PilotConfig {
    fn default() -> Self {
        Self {
            video_source: "10.0.0.4".to_string(),
            drone_camera: true,
            max_iterations: 100,
            min_interval_ms: 20,
            frame_scale: 0.7,
            display: false,
            display_scale: 0.5,
            mirror_display: false,
            quit_key: 'q',
            control: true,
            plot: false,
            calibration_path: PathBuf::from("calibration.yaml"),
            map_path: PathBuf::from("map.yaml"),
            trajectory_csv: None,
            max_consecutive_frame_failures: None,
            commander: CommanderConfig::default(),
            sequencer: SequencerConfig::default(),
            link: LinkConfig::default(),
            localizer: LocalizerConfig::default(),
        }
    }
}

impl PilotConfig {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let text = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config: {}", path.display()))?;
        Self::from_yaml_str(&text).with_context(|| format!("Invalid config: {}", path.display()))
    }

    pub fn from_yaml_str(text: &str) -> Result<Self> {
        // An empty document deserializes to unit, not a map.
        if text.trim().is_empty() {
            return Ok(Self::default());
        }
        let config: Self = serde_yaml::from_str(text)?;
        Ok(config)
    }

    pub fn min_interval(&self) -> Duration {
        Duration::from_millis(self.min_interval_ms)
    }

    pub fn validate(&self) -> Result<()> {
        if !(self.frame_scale > 0.0 && self.frame_scale.is_finite()) {
            bail!("frame_scale must be positive, got {}", self.frame_scale);
        }
        if !(self.display_scale > 0.0 && self.display_scale.is_finite()) {
            bail!("display_scale must be positive, got {}", self.display_scale);
        }
        if !(self.commander.bound > 0.0 && self.commander.bound.is_finite()) {
            bail!("commander.bound must be positive, got {}", self.commander.bound);
        }
        if !(self.commander.gain_divisor > 0.0 && self.commander.gain_divisor.is_finite()) {
            bail!(
                "commander.gain_divisor must be positive, got {}",
                self.commander.gain_divisor
            );
        }
        if self.sequencer.max_consecutive_ack_failures == 0 {
            bail!("sequencer.max_consecutive_ack_failures must be at least 1");
        }
        if self.max_consecutive_frame_failures == Some(0) {
            bail!("max_consecutive_frame_failures must be at least 1");
        }
        if self.video_source.trim().is_empty() {
            bail!("video_source is empty");
        }
        if self.control && !self.drone_camera {
            bail!("control needs drone_camera: video_source is the bridge host");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_defaults() {
        let config = PilotConfig::default();
        assert_eq!(config.video_source, "10.0.0.4");
        assert_eq!(config.max_iterations, 100);
        assert_eq!(config.min_interval(), Duration::from_millis(20));
        assert_relative_eq!(config.frame_scale, 0.7);
        assert_relative_eq!(config.display_scale, 0.5);
        assert_relative_eq!(config.commander.bound, 0.005);
        assert_eq!(config.quit_key, 'q');
        assert!(config.control);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_yaml_keeps_defaults() {
        let config = PilotConfig::from_yaml_str(
            "max_iterations: 5\ncommander:\n  bound: 0.01\nsequencer:\n  takeoff:\n    max_attempts: 3\n",
        )
        .unwrap();
        assert_eq!(config.max_iterations, 5);
        assert_relative_eq!(config.commander.bound, 0.01);
        assert_relative_eq!(config.commander.gain_divisor, 20.0);
        assert_eq!(config.sequencer.takeoff.max_attempts, 3);
        assert_eq!(config.sequencer.takeoff.delay_ms, 300);
        assert_eq!(config.sequencer.enable.max_attempts, 20);
        assert_eq!(config.link.control_port, 9998);
    }

    #[test]
    fn test_empty_yaml_is_default() {
        let config = PilotConfig::from_yaml_str("  \n").unwrap();
        assert_eq!(config.max_iterations, 100);
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pilot.yaml");
        fs::write(&path, "video_source: flight.mp4\ndrone_camera: false\n").unwrap();

        let config = PilotConfig::load(&path).unwrap();
        assert_eq!(config.video_source, "flight.mp4");
        assert!(!config.drone_camera);
        assert!(PilotConfig::load(dir.path().join("missing.yaml")).is_err());
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut config = PilotConfig::default();
        config.commander.bound = 0.0;
        assert!(config.validate().is_err());

        let mut config = PilotConfig::default();
        config.frame_scale = -1.0;
        assert!(config.validate().is_err());

        let mut config = PilotConfig::default();
        config.max_consecutive_frame_failures = Some(0);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_offline_replay_must_run_dry() {
        let mut config = PilotConfig::default();
        config.video_source = "frames/".to_string();
        config.drone_camera = false;
        assert!(config.validate().is_err());

        config.control = false;
        assert!(config.validate().is_ok());
    }
}
