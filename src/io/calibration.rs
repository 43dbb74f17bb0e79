//! Camera calibration loaded once at startup.
//!
//! YAML layout (row-major):
//!
//! ```yaml
//! intrinsic: [fx, 0, cx, 0, fy, cy, 0, 0, 1]
//! extrinsic: [r11, r12, r13, t1, r21, r22, r23, t2, r31, r32, r33, t3]  # 3x4 or 4x4
//! distortion: [k1, k2, p1, p2, k3]                                       # optional
//! ```
//!
//! Only the intrinsics and distortion feed localization. The extrinsic is
//! parsed and validated so a malformed calibration file is rejected early,
//! but poses stay in the camera frame and nothing downstream applies it.

use std::fs::File;
use std::path::Path;

use anyhow::{Context, Result, bail};
use nalgebra::{Matrix3, Vector3};
use serde::Deserialize;

use crate::geometry::is_rotation;

/// OpenCV accepts 4, 5, 8, 12 or 14 distortion coefficients.
const DISTORTION_LENGTHS: [usize; 6] = [0, 4, 5, 8, 12, 14];

#[derive(Debug, Deserialize)]
struct CalibrationYaml {
    intrinsic: Vec<f64>,
    extrinsic: Vec<f64>,
    #[serde(default)]
    distortion: Vec<f64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Calibration {
    /// Pinhole camera matrix K.
    pub intrinsic: Matrix3<f64>,
    /// Rigid camera extrinsic `[R | t]`.
    pub extrinsic_rotation: Matrix3<f64>,
    pub extrinsic_translation: Vector3<f64>,
    pub distortion: Vec<f64>,
}

impl Calibration {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let raw: CalibrationYaml = serde_yaml::from_reader(
            File::open(path).with_context(|| format!("Failed to open {:?}", path))?,
        )
        .with_context(|| format!("Failed to parse calibration {:?}", path))?;
        Self::from_raw(raw).with_context(|| format!("Invalid calibration {:?}", path))
    }

    pub fn from_yaml_str(text: &str) -> Result<Self> {
        Self::from_raw(serde_yaml::from_str(text)?)
    }

    fn from_raw(raw: CalibrationYaml) -> Result<Self> {
        let intrinsic = intrinsic_from(&raw.intrinsic)?;
        let (extrinsic_rotation, extrinsic_translation) = extrinsic_from(&raw.extrinsic)?;
        if !DISTORTION_LENGTHS.contains(&raw.distortion.len()) {
            bail!(
                "Expected 0, 4, 5, 8, 12 or 14 distortion coefficients, got {}",
                raw.distortion.len()
            );
        }

        Ok(Self {
            intrinsic,
            extrinsic_rotation,
            extrinsic_translation,
            distortion: raw.distortion,
        })
    }

    pub fn fx(&self) -> f64 {
        self.intrinsic[(0, 0)]
    }

    pub fn fy(&self) -> f64 {
        self.intrinsic[(1, 1)]
    }

    pub fn cx(&self) -> f64 {
        self.intrinsic[(0, 2)]
    }

    pub fn cy(&self) -> f64 {
        self.intrinsic[(1, 2)]
    }

    /// Intrinsics for images resized by `scale`. Distortion is scale-free.
    pub fn scaled(&self, scale: f64) -> Self {
        let mut intrinsic = self.intrinsic;
        for row in 0..2 {
            for col in 0..3 {
                intrinsic[(row, col)] *= scale;
            }
        }
        Self {
            intrinsic,
            ..self.clone()
        }
    }
}

fn intrinsic_from(data: &[f64]) -> Result<Matrix3<f64>> {
    if data.len() != 9 {
        bail!("Expected 9 intrinsic values (3x3 row-major), got {}", data.len());
    }
    let k = Matrix3::from_row_slice(data);
    if k[(0, 0)] <= 0.0 || k[(1, 1)] <= 0.0 {
        bail!("Focal lengths must be positive (fx={}, fy={})", k[(0, 0)], k[(1, 1)]);
    }
    if k[(2, 0)] != 0.0 || k[(2, 1)] != 0.0 || (k[(2, 2)] - 1.0).abs() > 1e-9 {
        bail!("Intrinsic last row must be [0, 0, 1]");
    }
    Ok(k)
}

fn extrinsic_from(data: &[f64]) -> Result<(Matrix3<f64>, Vector3<f64>)> {
    let rows = match data.len() {
        12 => 3,
        16 => 4,
        n => bail!("Expected 12 (3x4) or 16 (4x4) extrinsic values, got {}", n),
    };
    if rows == 4 && data[12..16] != [0.0, 0.0, 0.0, 1.0] {
        bail!("Extrinsic last row must be [0, 0, 0, 1]");
    }

    #[rustfmt::skip]
    let rotation = Matrix3::new(
        data[0], data[1], data[2],
        data[4], data[5], data[6],
        data[8], data[9], data[10],
    );
    if !is_rotation(&rotation) {
        bail!("Extrinsic rotation is not orthonormal");
    }
    let translation = Vector3::new(data[3], data[7], data[11]);
    Ok((rotation, translation))
}
