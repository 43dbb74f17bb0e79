//! Map-relative camera pose as reported by the localization service.

use nalgebra::{Matrix3, Vector3};

/// Tolerance used when checking that a rotation matrix is orthonormal.
const ORTHONORMAL_EPS: f64 = 1e-6;

/// Camera pose relative to the map origin.
///
/// Follows the OpenCV extrinsic convention (world-to-camera):
/// `x_cam = rotation * x_world + translation`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PoseEstimate {
    pub rotation: Matrix3<f64>,
    pub translation: Vector3<f64>,
}

impl PoseEstimate {
    pub fn new(rotation: Matrix3<f64>, translation: Vector3<f64>) -> Self {
        Self {
            rotation,
            translation,
        }
    }

    pub fn identity() -> Self {
        Self::new(Matrix3::identity(), Vector3::zeros())
    }

    /// Camera centre in world coordinates: `c = -Rᵀ t`.
    pub fn camera_center(&self) -> Vector3<f64> {
        -(self.rotation.transpose() * self.translation)
    }

    /// Camera orientation in the world frame (`Rᵀ`).
    pub fn world_rotation(&self) -> Matrix3<f64> {
        self.rotation.transpose()
    }

    /// Whether `rotation` is orthonormal with determinant +1.
    pub fn has_valid_rotation(&self) -> bool {
        is_rotation(&self.rotation)
    }
}

/// Checks `RᵀR = I` and `det(R) = 1` within a small tolerance.
pub fn is_rotation(r: &Matrix3<f64>) -> bool {
    let should_be_identity = r.transpose() * r;
    (should_be_identity - Matrix3::identity()).abs().max() < ORTHONORMAL_EPS
        && (r.determinant() - 1.0).abs() < ORTHONORMAL_EPS
}
