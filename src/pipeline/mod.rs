pub mod classifier;
pub mod face_mesh;
pub mod features;
pub mod labels;
pub mod landmarks;
pub mod scaler;

use anyhow::{Context, Result};
use image::RgbImage;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::time::Instant;
use thiserror::Error;
use tracing::{info, warn};

use classifier::{Classifier, PositionalIndices};
use face_mesh::LandmarkDetector;
use features::{extract_features, ExtractError, FeatureVector};
use labels::{LabelDecoder, LabelError};
use landmarks::LandmarkIndexSet;
use scaler::{NormalizeError, Normalizer};

pub const ERROR_LABEL: &str = "Error";
pub const NO_FACE_LABEL: &str = "No Face Detected";
pub const LANDMARK_ERROR_LABEL: &str = "Landmark Error";
pub const COORD_COUNT_ERROR_LABEL: &str = "Coord Count Error";
pub const PREDICTION_ERROR_LABEL: &str = "Prediction Error";

pub const NOT_LOADED_MESSAGE: &str = "Model or resources not loaded.";
pub const DECODE_FAILURE_MESSAGE: &str = "Could not decode image.";

/// Terminal state of one inference request.
#[derive(Debug, Clone, PartialEq)]
pub enum Prediction {
    Emotion { label: String, confidence: f32 },
    NoFaceDetected,
    NotLoaded,
    DecodeFailure,
    LandmarkOutOfBounds(String),
    CoordinateCountMismatch(String),
    /// Anything unexpected from detection, normalization, classification or
    /// decoding, with the underlying message.
    PredictionFailed(String),
}

impl Prediction {
    /// The label channel of the legacy `(label, confidence, error)` triple.
    pub fn label(&self) -> &str {
        match self {
            Prediction::Emotion { label, .. } => label,
            Prediction::NoFaceDetected => NO_FACE_LABEL,
            Prediction::NotLoaded | Prediction::DecodeFailure => ERROR_LABEL,
            Prediction::LandmarkOutOfBounds(_) => LANDMARK_ERROR_LABEL,
            Prediction::CoordinateCountMismatch(_) => COORD_COUNT_ERROR_LABEL,
            Prediction::PredictionFailed(_) => PREDICTION_ERROR_LABEL,
        }
    }

    pub fn confidence(&self) -> Option<f32> {
        match self {
            Prediction::Emotion { confidence, .. } => Some(*confidence),
            _ => None,
        }
    }

    pub fn error_message(&self) -> Option<&str> {
        match self {
            Prediction::Emotion { .. } | Prediction::NoFaceDetected => None,
            Prediction::NotLoaded => Some(NOT_LOADED_MESSAGE),
            Prediction::DecodeFailure => Some(DECODE_FAILURE_MESSAGE),
            Prediction::LandmarkOutOfBounds(msg)
            | Prediction::CoordinateCountMismatch(msg)
            | Prediction::PredictionFailed(msg) => Some(msg),
        }
    }

    pub fn is_error(&self) -> bool {
        self.error_message().is_some()
    }

    pub fn into_result(self) -> crate::models::prediction::PredictionResult {
        self.into()
    }
}

#[derive(Error, Debug)]
pub enum LoadError {
    #[error("{kind} file not found at {path:?}")]
    Missing { kind: &'static str, path: PathBuf },

    #[error("Failed to read {kind} at {path:?}: {source}")]
    Io {
        kind: &'static str,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to load {kind}: {message}")]
    Model { kind: &'static str, message: String },

    #[error(transparent)]
    Scaler(#[from] NormalizeError),

    #[error(transparent)]
    Labels(#[from] LabelError),

    #[error("Landmark index set is empty")]
    EmptyIndexSet,

    #[error("Scaler was fitted on {scaler} features but the landmark set yields {expected}")]
    FeatureCountMismatch { scaler: usize, expected: usize },
}

fn require_file(kind: &'static str, path: &Path) -> Result<(), LoadError> {
    if !path.is_file() {
        return Err(LoadError::Missing { kind, path: path.to_path_buf() });
    }
    Ok(())
}

fn read_artifact(kind: &'static str, path: &Path) -> Result<String, LoadError> {
    require_file(kind, path)?;
    std::fs::read_to_string(path).map_err(|source| LoadError::Io {
        kind,
        path: path.to_path_buf(),
        source,
    })
}

pub fn load_normalizer(path: &Path) -> Result<Normalizer, LoadError> {
    Ok(Normalizer::from_json(&read_artifact("scaler", path)?)?)
}

pub fn load_labels(path: &Path) -> Result<LabelDecoder, LoadError> {
    Ok(LabelDecoder::from_json(&read_artifact("label encoder", path)?)?)
}

/// Everything inference needs, loaded once at startup and shared read-only.
pub struct PipelineResources {
    index_set: LandmarkIndexSet,
    positions: PositionalIndices,
    detector: Box<dyn LandmarkDetector>,
    normalizer: Normalizer,
    classifier: Box<dyn Classifier>,
    labels: LabelDecoder,
}

impl PipelineResources {
    pub fn new(
        index_set: LandmarkIndexSet,
        detector: Box<dyn LandmarkDetector>,
        normalizer: Normalizer,
        classifier: Box<dyn Classifier>,
        labels: LabelDecoder,
    ) -> Result<Self, LoadError> {
        if index_set.is_empty() {
            return Err(LoadError::EmptyIndexSet);
        }
        if normalizer.n_features() != index_set.coordinate_count() {
            return Err(LoadError::FeatureCountMismatch {
                scaler: normalizer.n_features(),
                expected: index_set.coordinate_count(),
            });
        }
        let positions = PositionalIndices::for_len(index_set.len());
        Ok(Self {
            index_set,
            positions,
            detector,
            normalizer,
            classifier,
            labels,
        })
    }

    /// Load every artifact named by `cfg`. Any missing file is fatal.
    #[cfg(feature = "onnx")]
    pub fn load(cfg: &crate::utils::config::Config) -> Result<Self, LoadError> {
        info!("Loading model, scaler, and encoder from {:?}", cfg.model_dir);
        require_file("classifier", &cfg.classifier)?;
        require_file("scaler", &cfg.scaler)?;
        require_file("label encoder", &cfg.encoder)?;
        require_file("face detector", &cfg.face_detector)?;
        require_file("face landmark model", &cfg.face_landmarks)?;

        let normalizer = load_normalizer(&cfg.scaler)?;
        let labels = load_labels(&cfg.encoder)?;
        let classifier = classifier::OrtClassifier::load(&cfg.classifier, cfg.intra_threads)
            .map_err(|e| LoadError::Model { kind: "classifier", message: format!("{:#}", e) })?;
        info!("Loaded model, scaler, and encoder ({} classes)", labels.len());

        let detector = face_mesh::OrtFaceMesh::load(
            &cfg.face_detector,
            &cfg.face_landmarks,
            cfg.face_mesh,
            cfg.intra_threads,
        )
        .map_err(|e| LoadError::Model { kind: "face mesh", message: format!("{:#}", e) })?;

        let resources = Self::new(
            cfg.landmark_indices.clone(),
            Box::new(detector),
            normalizer,
            Box::new(classifier),
            labels,
        )?;
        info!("Expecting {} landmarks per face for prediction", resources.sequence_length());
        Ok(resources)
    }

    pub fn sequence_length(&self) -> usize {
        self.index_set.len()
    }

    pub fn index_set(&self) -> &LandmarkIndexSet {
        &self.index_set
    }

    pub fn classes(&self) -> &[String] {
        self.labels.classes()
    }

    /// Run one image through decode, detect, extract, normalize, classify
    /// and label decoding. Never panics and never returns a partial result.
    pub fn predict(&self, image_bytes: &[u8]) -> Prediction {
        let started = Instant::now();
        let prediction = match catch_unwind(AssertUnwindSafe(|| self.run_stages(image_bytes))) {
            Ok(Ok(prediction)) => prediction,
            Ok(Err(e)) => Prediction::PredictionFailed(format!("{:#}", e)),
            Err(panic) => Prediction::PredictionFailed(panic_message(panic.as_ref())),
        };
        let elapsed_ms = started.elapsed().as_secs_f64() * 1000.0;
        match &prediction {
            Prediction::Emotion { label, confidence } => {
                info!(label = %label, confidence = *confidence, elapsed_ms, "emotion predicted")
            }
            Prediction::NoFaceDetected => info!(elapsed_ms, "no face detected"),
            other => warn!(
                label = other.label(),
                error = other.error_message().unwrap_or_default(),
                elapsed_ms,
                "prediction failed"
            ),
        }
        prediction
    }

    fn run_stages(&self, image_bytes: &[u8]) -> Result<Prediction> {
        let Some(image) = decode_image(image_bytes) else {
            return Ok(Prediction::DecodeFailure);
        };

        let Some(landmarks) = self.detector.detect(&image)? else {
            return Ok(Prediction::NoFaceDetected);
        };

        let features = match extract_features(&landmarks, &self.index_set) {
            Ok(features) => features,
            Err(e @ ExtractError::OutOfBounds { .. }) => {
                return Ok(Prediction::LandmarkOutOfBounds(e.to_string()))
            }
            Err(e @ ExtractError::CoordinateCountMismatch { .. }) => {
                return Ok(Prediction::CoordinateCountMismatch(e.to_string()))
            }
        };

        let (label, confidence) = self.classify(&features)?;
        Ok(Prediction::Emotion { label, confidence })
    }

    fn classify(&self, features: &FeatureVector) -> Result<(String, f32)> {
        let normalized = self.normalizer.transform(features)?;
        let probs = self.classifier.predict(&normalized, &self.positions)?;
        self.labels.check_class_count(probs.len())?;
        let (index, confidence) = probs
            .argmax()
            .context("Classifier returned no usable probabilities")?;
        let label = self.labels.decode(index)?;
        Ok((label.to_string(), confidence))
    }
}

/// Entry point for callers that may hold no resources (startup failed or has
/// not finished).
pub fn predict_emotion(resources: Option<&PipelineResources>, image_bytes: &[u8]) -> Prediction {
    match resources {
        Some(resources) => resources.predict(image_bytes),
        None => {
            warn!("{}", NOT_LOADED_MESSAGE);
            Prediction::NotLoaded
        }
    }
}

/// Any format the `image` crate understands, flattened to 8-bit RGB.
pub fn decode_image(bytes: &[u8]) -> Option<RgbImage> {
    image::load_from_memory(bytes).ok().map(|img| img.to_rgb8())
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "inference panicked".to_string()
    }
}
