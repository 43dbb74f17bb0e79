//! Frame intake: the `FrameSource` contract and the rescaling adapter.

use std::time::{SystemTime, UNIX_EPOCH};

use anyhow::Result;
use opencv::core::{Mat, Size};
use opencv::imgproc;
use opencv::prelude::*;
use tracing::warn;

/// A captured image and its capture time.
#[derive(Debug, Clone)]
pub struct Frame {
    pub image: Mat,
    /// Wall-clock capture time, nanoseconds since the Unix epoch.
    pub timestamp_ns: u64,
}

impl Frame {
    pub fn new(image: Mat, timestamp_ns: u64) -> Self {
        Self {
            image,
            timestamp_ns,
        }
    }

    /// Stamp `image` with the current wall-clock time.
    pub fn captured_now(image: Mat) -> Self {
        Self::new(image, now_ns())
    }

    pub fn width(&self) -> i32 {
        self.image.cols()
    }

    pub fn height(&self) -> i32 {
        self.image.rows()
    }
}

/// Outcome of a single read.
#[derive(Debug)]
pub enum FrameRead {
    Ready(Frame),
    /// Nothing this time; the next read may succeed.
    Unavailable,
    /// The source will never produce another frame.
    Closed,
}

/// Camera transport abstraction.
///
/// Implementations report transport problems as `Unavailable` and log them
/// instead of returning errors; the control loop treats them as recoverable.
pub trait FrameSource {
    fn read(&mut self) -> FrameRead;

    /// Short description for logs.
    fn describe(&self) -> String;
}

impl<S: FrameSource + ?Sized> FrameSource for Box<S> {
    fn read(&mut self) -> FrameRead {
        (**self).read()
    }

    fn describe(&self) -> String {
        (**self).describe()
    }
}

/// Resizes every frame by a fixed factor before handing it on.
pub struct Rescaled<S> {
    inner: S,
    scale: f64,
}

impl<S: FrameSource> Rescaled<S> {
    pub fn new(inner: S, scale: f64) -> Self {
        Self { inner, scale }
    }
}

impl<S: FrameSource> FrameSource for Rescaled<S> {
    fn read(&mut self) -> FrameRead {
        match self.inner.read() {
            FrameRead::Ready(frame) => match scale_image(&frame.image, self.scale) {
                Ok(image) => FrameRead::Ready(Frame::new(image, frame.timestamp_ns)),
                Err(e) => {
                    warn!("Failed to rescale frame: {:#}", e);
                    FrameRead::Unavailable
                }
            },
            other => other,
        }
    }

    fn describe(&self) -> String {
        format!("{} (x{:.2})", self.inner.describe(), self.scale)
    }
}

/// Uniformly rescale `image` into a new buffer. A factor of exactly 1.0
/// skips the resize and returns a deep copy.
pub fn scale_image(image: &Mat, scale: f64) -> Result<Mat> {
    if scale == 1.0 || image.empty() {
        return Ok(image.try_clone()?);
    }
    let mut resized = Mat::default();
    imgproc::resize(
        image,
        &mut resized,
        Size::default(),
        scale,
        scale,
        imgproc::INTER_LINEAR,
    )?;
    Ok(resized)
}

pub(crate) fn now_ns() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos() as u64)
        .unwrap_or(0)
}
