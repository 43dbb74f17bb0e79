//! Localization against a prebuilt landmark map through OpenCV.
//!
//! ORB features of the frame are matched to the map descriptors (2-NN with
//! ratio test), then `solvePnPRansac` recovers the world-to-camera pose.
//! The map is never modified.

use anyhow::Result;
use nalgebra::{Matrix3, Vector3};
use opencv::calib3d;
use opencv::core::{self, DMatch, KeyPoint, Mat, Point2f, Point3d, Ptr, Vector};
use opencv::features2d::{self, BFMatcher};
use opencv::imgproc;
use opencv::prelude::*;
use serde::Deserialize;
use tracing::debug;

use crate::geometry::PoseEstimate;
use crate::io::{Calibration, Frame};

use super::PoseEstimator;
use super::map::LandmarkMap;

/// Localizer tuning.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LocalizerConfig {
    pub n_features: i32,
    /// Ratio test threshold (best / second best).
    pub nn_ratio: f32,
    /// Max Hamming distance for an accepted match.
    pub max_descriptor_distance: f32,
    /// Fewer correspondences than this and PnP is not attempted.
    pub min_matches: usize,
    pub min_inliers: usize,
    pub ransac_iterations: i32,
    pub reprojection_error_px: f32,
    pub confidence: f64,
}

impl Default for LocalizerConfig {
    fn default() -> Self {
        Self {
            n_features: 2000,
            nn_ratio: 0.75,
            max_descriptor_distance: 100.0,
            min_matches: 12,
            min_inliers: 10,
            ransac_iterations: 100,
            reprojection_error_px: 8.0,
            confidence: 0.99,
        }
    }
}

pub struct MapLocalizer {
    orb: Ptr<features2d::ORB>,
    matcher: BFMatcher,
    map: LandmarkMap,
    camera_matrix: Mat,
    dist_coeffs: Mat,
    config: LocalizerConfig,
}

impl MapLocalizer {
    /// `calibration` must describe the images this localizer will receive,
    /// i.e. already scaled to the pose-estimation frame size.
    pub fn new(
        map: LandmarkMap,
        calibration: &Calibration,
        config: LocalizerConfig,
    ) -> Result<Self> {
        let orb = features2d::ORB::create(
            config.n_features,
            1.2,
            8,
            31,
            0,
            2,
            features2d::ORB_ScoreType::HARRIS_SCORE,
            31,
            20,
        )?;
        let matcher = BFMatcher::new(core::NORM_HAMMING, false)?;

        let k = &calibration.intrinsic;
        let camera_matrix = Mat::from_slice_2d(&[
            [k[(0, 0)], k[(0, 1)], k[(0, 2)]],
            [k[(1, 0)], k[(1, 1)], k[(1, 2)]],
            [k[(2, 0)], k[(2, 1)], k[(2, 2)]],
        ])?;
        let dist_coeffs = if calibration.distortion.is_empty() {
            Mat::zeros(1, 5, core::CV_64F)?.to_mat()?
        } else {
            Mat::from_slice(&calibration.distortion)?.try_clone()?
        };

        debug!(
            "Map localizer ready: {} landmarks, {}-byte descriptors",
            map.len(),
            map.descriptor_len()
        );

        Ok(Self {
            orb,
            matcher,
            map,
            camera_matrix,
            dist_coeffs,
            config,
        })
    }

    /// 3D-2D correspondences between the map and this frame's features.
    fn correspondences(&mut self, image: &Mat) -> Result<(Vec<Vector3<f64>>, Vec<Point2f>)> {
        let gray = to_gray(image)?;
        let mut keypoints = Vector::<KeyPoint>::new();
        let mut descriptors = Mat::default();
        self.orb.detect_and_compute(
            &gray,
            &Mat::default(),
            &mut keypoints,
            &mut descriptors,
            false,
        )?;
        if descriptors.empty() || keypoints.len() < self.config.min_matches {
            return Ok((Vec::new(), Vec::new()));
        }

        let mut knn = Vector::<Vector<DMatch>>::new();
        self.matcher.knn_train_match(
            &descriptors,
            &self.map.descriptors,
            &mut knn,
            2,
            &Mat::default(),
            false,
        )?;

        let mut points3d = Vec::new();
        let mut points2d = Vec::new();
        for candidates in knn.iter() {
            let Ok(best) = candidates.get(0) else {
                continue;
            };
            let second = candidates.get(1).ok().map(|m| m.distance);
            if !passes_ratio_test(
                best.distance,
                second,
                self.config.nn_ratio,
                self.config.max_descriptor_distance,
            ) {
                continue;
            }
            let kp = keypoints.get(best.query_idx as usize)?;
            points3d.push(self.map.points[best.train_idx as usize]);
            points2d.push(kp.pt());
        }

        debug!(
            "{} keypoints, {} map correspondences",
            keypoints.len(),
            points3d.len()
        );
        Ok((points3d, points2d))
    }

    /// PnP-RANSAC on correspondences; `None` when too weak to trust.
    fn solve_pose(
        &self,
        points3d: &[Vector3<f64>],
        points2d: &[Point2f],
    ) -> Result<Option<PoseEstimate>> {
        if points3d.len() < self.config.min_matches.max(4) {
            return Ok(None);
        }

        let pts3d: Vec<Point3d> = points3d
            .iter()
            .map(|p| Point3d::new(p.x, p.y, p.z))
            .collect();
        let obj_points = Mat::from_slice(&pts3d)?.try_clone()?;
        let img_points = Mat::from_slice(points2d)?.try_clone()?;

        let mut rvec = Mat::default();
        let mut tvec = Mat::default();
        let mut inliers = Mat::default();
        let found = calib3d::solve_pnp_ransac(
            &obj_points,
            &img_points,
            &self.camera_matrix,
            &self.dist_coeffs,
            &mut rvec,
            &mut tvec,
            false,
            self.config.ransac_iterations,
            self.config.reprojection_error_px,
            self.config.confidence,
            &mut inliers,
            calib3d::SOLVEPNP_ITERATIVE,
        )?;

        let n_inliers = inliers.rows().max(0) as usize;
        if !found || n_inliers < self.config.min_inliers {
            debug!("PnP rejected: found={}, inliers={}", found, n_inliers);
            return Ok(None);
        }

        let mut rot_mat = Mat::default();
        calib3d::rodrigues(&rvec, &mut rot_mat, &mut core::no_array())?;
        let rotation = mat3_to_matrix3(&rot_mat)?;
        let translation = Vector3::new(
            *tvec.at::<f64>(0)?,
            *tvec.at::<f64>(1)?,
            *tvec.at::<f64>(2)?,
        );

        let pose = PoseEstimate::new(rotation, translation);
        if !pose.has_valid_rotation() || !translation.iter().all(|v| v.is_finite()) {
            return Ok(None);
        }
        debug!("PnP accepted with {} inliers", n_inliers);
        Ok(Some(pose))
    }
}

impl PoseEstimator for MapLocalizer {
    fn process(&mut self, frame: &Frame) -> Result<Option<PoseEstimate>> {
        let (points3d, points2d) = self.correspondences(&frame.image)?;
        self.solve_pose(&points3d, &points2d)
    }
}

/// Lowe's ratio test plus an absolute distance gate.
fn passes_ratio_test(best: f32, second: Option<f32>, ratio: f32, max_distance: f32) -> bool {
    if best > max_distance {
        return false;
    }
    match second {
        Some(second) => best < ratio * second,
        None => true,
    }
}

fn to_gray(image: &Mat) -> Result<Mat> {
    let code = match image.channels() {
        1 => return Ok(image.try_clone()?),
        4 => imgproc::COLOR_BGRA2GRAY,
        _ => imgproc::COLOR_BGR2GRAY,
    };
    let mut gray = Mat::default();
    imgproc::cvt_color_def(image, &mut gray, code)?;
    Ok(gray)
}

/// Convert OpenCV 3x3 Mat to nalgebra Matrix3.
fn mat3_to_matrix3(mat: &Mat) -> Result<Matrix3<f64>> {
    let mut arr = [0.0f64; 9];
    for (i, v) in arr.iter_mut().enumerate() {
        *v = *mat.at::<f64>(i as i32)?;
    }
    Ok(Matrix3::from_row_slice(&arr))
}
