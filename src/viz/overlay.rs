//! OpenCV preview window with a frame counter and quit hint.

use anyhow::Result;
use opencv::core::{self, Mat, Point, Scalar};
use opencv::highgui;
use opencv::imgproc;
use opencv::prelude::*;
use serde::Deserialize;
use tracing::{info, warn};

use crate::io::scale_image;
use crate::system::CancelHandle;

use super::{IterationStatus, StatusSink};

const WINDOW_NAME: &str = "vslam-pilot";

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct OverlayConfig {
    /// Resize factor for display only; the localizer never sees it.
    pub display_scale: f64,
    /// Flip horizontally (front-facing webcams).
    pub mirror: bool,
    pub quit_key: char,
}

impl Default for OverlayConfig {
    fn default() -> Self {
        Self {
            display_scale: 0.5,
            mirror: false,
            quit_key: 'q',
        }
    }
}

/// Shows each frame and turns a quit key press into cancellation.
pub struct OverlayWindow {
    config: OverlayConfig,
    cancel: CancelHandle,
    opened: bool,
}

impl OverlayWindow {
    pub fn new(config: OverlayConfig, cancel: CancelHandle) -> Self {
        Self {
            config,
            cancel,
            opened: false,
        }
    }

    fn show(&mut self, status: &IterationStatus<'_>) -> Result<()> {
        let Some(frame) = status.frame else {
            return Ok(());
        };
        if !self.opened {
            highgui::named_window(WINDOW_NAME, highgui::WINDOW_AUTOSIZE)?;
            self.opened = true;
        }

        let mut canvas = render(&frame.image, &self.config, status.frames_read)?;
        if status.estimate.is_none() {
            put_line(&mut canvas, "No pose", 2, Scalar::new(0.0, 0.0, 255.0, 0.0))?;
        }
        highgui::imshow(WINDOW_NAME, &canvas)?;

        let key = highgui::wait_key(1)?;
        if is_quit_key(key, self.config.quit_key) {
            info!("Quit key '{}' pressed in preview window", self.config.quit_key);
            self.cancel.cancel();
        }
        Ok(())
    }
}

impl StatusSink for OverlayWindow {
    fn update(&mut self, status: &IterationStatus<'_>) {
        if let Err(e) = self.show(status) {
            warn!("Preview window update failed: {:#}", e);
        }
    }

    fn finish(&mut self) {
        if self.opened {
            if let Err(e) = highgui::destroy_all_windows() {
                warn!("Failed to close preview window: {}", e);
            }
            self.opened = false;
        }
    }
}

/// Scaled, optionally mirrored copy of `image` with the status text drawn on.
/// `scale_image` always returns a fresh buffer, so the source is untouched.
pub fn render(image: &Mat, config: &OverlayConfig, frames_read: usize) -> Result<Mat> {
    let scaled = scale_image(image, config.display_scale)?;
    let mut canvas = if config.mirror {
        let mut flipped = Mat::default();
        core::flip(&scaled, &mut flipped, 1)?;
        flipped
    } else {
        scaled
    };

    let white = Scalar::new(255.0, 255.0, 255.0, 0.0);
    put_line(&mut canvas, &format!("{} frames read", frames_read), 0, white)?;
    put_line(
        &mut canvas,
        &format!("Press '{}' to quit", config.quit_key),
        1,
        white,
    )?;
    Ok(canvas)
}

fn put_line(canvas: &mut Mat, text: &str, line: i32, color: Scalar) -> Result<()> {
    imgproc::put_text(
        canvas,
        text,
        Point::new(10, 25 + 25 * line),
        imgproc::FONT_HERSHEY_SIMPLEX,
        0.6,
        color,
        2,
        imgproc::LINE_AA,
        false,
    )?;
    Ok(())
}

/// `wait_key` returns -1 when no key was pressed; only the low byte is the key.
fn is_quit_key(key: i32, quit_key: char) -> bool {
    key >= 0 && (key & 0xFF) as u32 == quit_key as u32
}
