use thiserror::Error;

use super::landmarks::{LandmarkIndexSet, RawLandmarks};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ExtractError {
    #[error("Landmark index {index} out of bounds ({available} landmarks found).")]
    OutOfBounds { index: usize, available: usize },

    #[error("Coordinate count mismatch. Expected {expected}, got {actual}.")]
    CoordinateCountMismatch { expected: usize, actual: usize },
}

/// Flat `[x0, y0, z0, x1, y1, z1, ...]` coordinates in index-set order.
///
/// Only [`extract_features`] builds one, so its length always matches the
/// index set it came from.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureVector {
    coords: Vec<f32>,
}

impl FeatureVector {
    pub fn as_slice(&self) -> &[f32] {
        &self.coords
    }

    pub fn len(&self) -> usize {
        self.coords.len()
    }

    pub fn is_empty(&self) -> bool {
        self.coords.is_empty()
    }

    /// Number of (x, y, z) triples.
    pub fn landmark_count(&self) -> usize {
        self.coords.len() / 3
    }
}

/// Pick the landmarks named by `indices` out of the full detector output.
///
/// Stops at the first index the detector did not produce; no partial vector
/// is ever returned.
pub fn extract_features(
    landmarks: &RawLandmarks,
    indices: &LandmarkIndexSet,
) -> Result<FeatureVector, ExtractError> {
    let mut coords = Vec::with_capacity(indices.coordinate_count());
    for index in indices.iter() {
        let lm = landmarks.get(index).ok_or(ExtractError::OutOfBounds {
            index,
            available: landmarks.len(),
        })?;
        coords.extend_from_slice(&[lm.x, lm.y, lm.z]);
    }
    check_coordinate_count(coords, indices.coordinate_count())
}

fn check_coordinate_count(coords: Vec<f32>, expected: usize) -> Result<FeatureVector, ExtractError> {
    if coords.len() != expected {
        return Err(ExtractError::CoordinateCountMismatch {
            expected,
            actual: coords.len(),
        });
    }
    Ok(FeatureVector { coords })
}
