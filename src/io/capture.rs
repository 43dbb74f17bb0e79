//! Live capture through OpenCV's `VideoCapture`.

use anyhow::{Result, bail};
use opencv::core::Mat;
use opencv::prelude::*;
use opencv::videoio::{self, VideoCapture};
use tracing::{info, warn};

use super::frame::{Frame, FrameRead, FrameSource};

/// Camera device, video file, network stream or the vehicle's video feed.
pub struct CaptureSource {
    capture: VideoCapture,
    label: String,
    consecutive_failures: usize,
}

impl CaptureSource {
    /// Open `source`: an integer is a device index, anything else a
    /// file path or stream URL.
    pub fn open(source: &str) -> Result<Self> {
        let capture = match source.trim().parse::<i32>() {
            Ok(index) => VideoCapture::new(index, videoio::CAP_ANY)?,
            Err(_) => VideoCapture::from_file(source, videoio::CAP_ANY)?,
        };
        Self::from_capture(capture, source)
    }

    /// Open a raw stream URL with the FFmpeg backend (vehicle video feed).
    pub fn open_stream(url: &str) -> Result<Self> {
        let capture = VideoCapture::from_file(url, videoio::CAP_FFMPEG)?;
        Self::from_capture(capture, url)
    }

    fn from_capture(capture: VideoCapture, label: &str) -> Result<Self> {
        if !capture.is_opened()? {
            bail!("Failed to open video source {}", label);
        }
        info!("Opened video source {}", label);
        Ok(Self {
            capture,
            label: label.to_string(),
            consecutive_failures: 0,
        })
    }

    fn note_failure(&mut self, reason: &str) -> FrameRead {
        self.consecutive_failures += 1;
        if should_warn(self.consecutive_failures) {
            warn!(
                "Error retrieving video stream from {} ({}, {} in a row)",
                self.label, reason, self.consecutive_failures
            );
        }
        FrameRead::Unavailable
    }
}

impl FrameSource for CaptureSource {
    fn read(&mut self) -> FrameRead {
        let mut image = Mat::default();
        match self.capture.read(&mut image) {
            Ok(true) if !image.empty() => {
                self.consecutive_failures = 0;
                FrameRead::Ready(Frame::captured_now(image))
            }
            Ok(_) => self.note_failure("no frame"),
            Err(e) => self.note_failure(&e.to_string()),
        }
    }

    fn describe(&self) -> String {
        format!("capture:{}", self.label)
    }
}

/// First failure of a streak and then every 50th.
fn should_warn(streak: usize) -> bool {
    streak == 1 || streak % 50 == 0
}
