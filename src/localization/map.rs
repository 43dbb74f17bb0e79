//! Read-only landmark map produced by the offline mapping step.
//!
//! ```yaml
//! points:      [[x, y, z], ...]          # world coordinates
//! descriptors: [[b0, b1, ..., b31], ...] # one ORB descriptor per point
//! ```

use std::fs::File;
use std::path::Path;

use anyhow::{Context, Result, bail};
use nalgebra::Vector3;
use opencv::core::Mat;
use opencv::prelude::*;
use serde::Deserialize;

#[derive(Debug, Deserialize)]
struct MapYaml {
    points: Vec<[f64; 3]>,
    descriptors: Vec<Vec<u8>>,
}

/// 3D landmarks with one binary descriptor each.
pub struct LandmarkMap {
    pub points: Vec<Vector3<f64>>,
    /// N x D `CV_8U`, row `i` describes `points[i]`.
    pub descriptors: Mat,
}

impl LandmarkMap {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let raw: MapYaml = serde_yaml::from_reader(
            File::open(path).with_context(|| format!("Failed to open map {:?}", path))?,
        )
        .with_context(|| format!("Failed to parse map {:?}", path))?;
        Self::from_raw(raw).with_context(|| format!("Invalid map {:?}", path))
    }

    pub fn from_yaml_str(text: &str) -> Result<Self> {
        Self::from_raw(serde_yaml::from_str(text)?)
    }

    fn from_raw(raw: MapYaml) -> Result<Self> {
        if raw.points.is_empty() {
            bail!("Map has no points");
        }
        if raw.points.len() != raw.descriptors.len() {
            bail!(
                "Map has {} points but {} descriptors",
                raw.points.len(),
                raw.descriptors.len()
            );
        }
        let width = raw.descriptors[0].len();
        if width == 0 || raw.descriptors.iter().any(|d| d.len() != width) {
            bail!("Map descriptors must all have the same non-zero length");
        }

        let descriptors = Mat::from_slice_2d(&raw.descriptors)?;
        let points = raw
            .points
            .iter()
            .map(|p| Vector3::new(p[0], p[1], p[2]))
            .collect();

        Ok(Self {
            points,
            descriptors,
        })
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn descriptor_len(&self) -> i32 {
        self.descriptors.cols()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_map() {
        let text = "\
points: [[0.0, 0.0, 1.0], [1.0, 2.0, 3.0]]
descriptors: [[1, 2, 3, 4], [255, 0, 255, 0]]
";
        let map = LandmarkMap::from_yaml_str(text).unwrap();
        assert_eq!(map.len(), 2);
        assert_eq!(map.descriptor_len(), 4);
        assert_eq!(map.descriptors.rows(), 2);
        assert_eq!(*map.descriptors.at_2d::<u8>(1, 0).unwrap(), 255);
        assert_eq!(map.points[1], Vector3::new(1.0, 2.0, 3.0));
    }

    #[test]
    fn test_rejects_mismatched_lengths() {
        let text = "points: [[0, 0, 1]]\ndescriptors: [[1, 2], [3, 4]]\n";
        assert!(LandmarkMap::from_yaml_str(text).is_err());
    }

    #[test]
    fn test_rejects_ragged_descriptors() {
        let text = "points: [[0, 0, 1], [0, 1, 1]]\ndescriptors: [[1, 2], [3]]\n";
        assert!(LandmarkMap::from_yaml_str(text).is_err());
    }

    #[test]
    fn test_rejects_empty_map() {
        assert!(LandmarkMap::from_yaml_str("points: []\ndescriptors: []\n").is_err());
    }
}
