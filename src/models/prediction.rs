use serde::{Deserialize, Serialize};

use crate::pipeline::Prediction;

/// Uniform `(emotion, confidence, error)` triple returned for every request.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct PredictionResult {
    pub emotion: String,
    pub confidence: Option<f32>,
    pub error: Option<String>,
}

impl From<&Prediction> for PredictionResult {
    fn from(p: &Prediction) -> Self {
        Self {
            emotion: p.label().to_string(),
            confidence: p.confidence(),
            error: p.error_message().map(str::to_string),
        }
    }
}

impl From<Prediction> for PredictionResult {
    fn from(p: Prediction) -> Self {
        Self::from(&p)
    }
}

/// Body of `POST /api/detect-emotion` when the prediction succeeded.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct DetectEmotionResponse {
    pub emotion: String,
    pub confidence: Option<f32>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct DetectEmotionRequest {
    pub image: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct ErrorResponse {
    pub error: String,
}

impl ErrorResponse {
    pub fn new(error: impl Into<String>) -> Self {
        Self { error: error.into() }
    }
}
