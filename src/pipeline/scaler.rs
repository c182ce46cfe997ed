use ndarray::{Array1, Array3, ArrayView1};
use serde::Deserialize;
use thiserror::Error;

use super::features::FeatureVector;

#[derive(Error, Debug)]
pub enum NormalizeError {
    #[error("Normalizer expects {expected} features, got {actual}")]
    Shape { expected: usize, actual: usize },

    #[error("Invalid scaler parameters: {0}")]
    InvalidParams(String),

    #[error("Scaler JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
enum ScalerKind {
    #[default]
    Standard,
    MinMax,
}

/// On-disk form of a fitted scaler (the `mean_`/`scale_`/`min_` attributes).
#[derive(Debug, Deserialize)]
struct ScalerParams {
    #[serde(default)]
    kind: ScalerKind,
    #[serde(default)]
    mean: Option<Vec<f32>>,
    #[serde(default)]
    min: Option<Vec<f32>>,
    #[serde(default)]
    scale: Option<Vec<f32>>,
}

/// Pre-fitted per-feature affine transform. Never refit at request time.
#[derive(Debug, Clone, PartialEq)]
pub enum Normalizer {
    /// `(x - mean) / scale`
    Standard { mean: Array1<f32>, scale: Array1<f32> },
    /// `x * scale + min`
    MinMax { min: Array1<f32>, scale: Array1<f32> },
}

impl Normalizer {
    pub fn standard(mean: Vec<f32>, scale: Vec<f32>) -> Result<Self, NormalizeError> {
        check_params(&mean, &scale)?;
        // Constant features were fitted with zero variance; leave them unscaled.
        let scale = scale
            .into_iter()
            .map(|s| if s == 0.0 { 1.0 } else { s })
            .collect::<Vec<_>>();
        Ok(Normalizer::Standard {
            mean: Array1::from(mean),
            scale: Array1::from(scale),
        })
    }

    pub fn min_max(min: Vec<f32>, scale: Vec<f32>) -> Result<Self, NormalizeError> {
        check_params(&min, &scale)?;
        Ok(Normalizer::MinMax {
            min: Array1::from(min),
            scale: Array1::from(scale),
        })
    }

    pub fn from_json(text: &str) -> Result<Self, NormalizeError> {
        let params: ScalerParams = serde_json::from_str(text)?;
        match params.kind {
            ScalerKind::Standard => {
                let (mean, scale) = match (params.mean, params.scale) {
                    (Some(m), Some(s)) => (m, s),
                    // with_std=False
                    (Some(m), None) => {
                        let n = m.len();
                        (m, vec![1.0; n])
                    }
                    // with_mean=False
                    (None, Some(s)) => (vec![0.0; s.len()], s),
                    (None, None) => {
                        return Err(NormalizeError::InvalidParams(
                            "standard scaler needs `mean` or `scale`".to_string(),
                        ))
                    }
                };
                Self::standard(mean, scale)
            }
            ScalerKind::MinMax => match (params.min, params.scale) {
                (Some(min), Some(scale)) => Self::min_max(min, scale),
                _ => Err(NormalizeError::InvalidParams(
                    "min_max scaler needs `min` and `scale`".to_string(),
                )),
            },
        }
    }

    /// Number of features the transform was fitted on.
    pub fn n_features(&self) -> usize {
        match self {
            Normalizer::Standard { scale, .. } | Normalizer::MinMax { scale, .. } => scale.len(),
        }
    }

    pub fn transform(&self, features: &FeatureVector) -> Result<NormalizedVector, NormalizeError> {
        if features.len() != self.n_features() {
            return Err(NormalizeError::Shape {
                expected: self.n_features(),
                actual: features.len(),
            });
        }
        let x = ArrayView1::from(features.as_slice());
        let values = match self {
            Normalizer::Standard { mean, scale } => (&x - mean) / scale,
            Normalizer::MinMax { min, scale } => &x * scale + min,
        };
        Ok(NormalizedVector { values })
    }
}

fn check_params(offset: &[f32], scale: &[f32]) -> Result<(), NormalizeError> {
    if scale.is_empty() {
        return Err(NormalizeError::InvalidParams("no features".to_string()));
    }
    if offset.len() != scale.len() {
        return Err(NormalizeError::InvalidParams(format!(
            "offset has {} entries but scale has {}",
            offset.len(),
            scale.len()
        )));
    }
    if offset.iter().chain(scale).any(|v| !v.is_finite()) {
        return Err(NormalizeError::InvalidParams("non-finite parameter".to_string()));
    }
    Ok(())
}

/// Output of [`Normalizer::transform`]; the only thing a classifier accepts.
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedVector {
    values: Array1<f32>,
}

impl NormalizedVector {
    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn values(&self) -> ArrayView1<'_, f32> {
        self.values.view()
    }

    /// Reshape to the classifier's `(1, sequence_length, 3)` coordinate input.
    pub fn to_sequence(&self, sequence_length: usize) -> Result<Array3<f32>, NormalizeError> {
        self.values
            .view()
            .into_shape_with_order((1, sequence_length, 3))
            .map(|v| v.to_owned())
            .map_err(|_| NormalizeError::Shape {
                expected: sequence_length * 3,
                actual: self.values.len(),
            })
    }
}
