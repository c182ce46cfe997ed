use std::env;
use std::path::PathBuf;

use crate::pipeline::face_mesh::FaceMeshOptions;
use crate::pipeline::landmarks::LandmarkIndexSet;

const DEFAULT_CORS_ORIGINS: &[&str] = &["http://localhost:3000", "http://127.0.0.1:3000"];

#[derive(Clone, Debug)]
pub struct Config {
    pub port: u16,
    pub model_dir: PathBuf,
    pub classifier: PathBuf,
    pub scaler: PathBuf,
    pub encoder: PathBuf,
    pub face_detector: PathBuf,
    pub face_landmarks: PathBuf,
    pub face_mesh: FaceMeshOptions,
    pub intra_threads: usize,
    pub landmark_indices: LandmarkIndexSet,
    pub cors_origins: Vec<String>,
    pub max_upload_bytes: usize,
}

fn parsed<T: std::str::FromStr>(key: &str) -> Option<T> {
    env::var(key).ok().and_then(|v| v.trim().parse().ok())
}

fn flag(key: &str) -> Option<bool> {
    env::var(key).ok().and_then(|v| match v.trim() {
        "1" | "true" | "TRUE" | "yes" => Some(true),
        "0" | "false" | "FALSE" | "no" => Some(false),
        _ => None,
    })
}

impl Config {
    pub fn from_env() -> Self {
        let port = parsed("EMOTION_PORT").unwrap_or(5000);
        let model_dir = PathBuf::from(
            env::var("EMOTION_MODEL_DIR").unwrap_or_else(|_| "emotion_transformer_model".to_string()),
        );
        // Relative file names resolve inside the model directory; absolute ones are kept.
        let artifact = |key: &str, default: &str| {
            model_dir.join(env::var(key).unwrap_or_else(|_| default.to_string()))
        };
        let classifier = artifact("EMOTION_CLASSIFIER", "emotion_classifier.onnx");
        let scaler = artifact("EMOTION_SCALER", "landmark_scaler.json");
        let encoder = artifact("EMOTION_ENCODER", "label_encoder.json");
        let face_detector = artifact("EMOTION_FACE_DETECTOR", "face_detection.onnx");
        let face_landmarks = artifact("EMOTION_FACE_LANDMARKS", "face_landmark.onnx");

        let defaults = FaceMeshOptions::default();
        let face_mesh = FaceMeshOptions {
            max_num_faces: defaults.max_num_faces,
            refine_landmarks: flag("EMOTION_REFINE_LANDMARKS").unwrap_or(defaults.refine_landmarks),
            min_detection_confidence: parsed("EMOTION_MIN_DETECTION_CONFIDENCE")
                .unwrap_or(defaults.min_detection_confidence),
            min_tracking_confidence: parsed("EMOTION_MIN_TRACKING_CONFIDENCE")
                .unwrap_or(defaults.min_tracking_confidence),
        };

        let intra_threads = parsed("EMOTION_INTRA_THREADS").filter(|&n: &usize| n > 0).unwrap_or(1);
        let landmark_indices = env::var("EMOTION_LANDMARK_INDICES")
            .ok()
            .and_then(|v| LandmarkIndexSet::parse(&v))
            .unwrap_or_else(LandmarkIndexSet::emotion);
        let cors_origins = env::var("EMOTION_CORS_ORIGINS")
            .ok()
            .map(|v| {
                v.split(',')
                    .map(|s| s.trim().to_string())
                    .filter(|s| !s.is_empty())
                    .collect::<Vec<_>>()
            })
            .filter(|v| !v.is_empty())
            .unwrap_or_else(|| DEFAULT_CORS_ORIGINS.iter().map(|s| s.to_string()).collect());
        let max_upload_bytes = parsed("EMOTION_MAX_UPLOAD_BYTES").unwrap_or(16 * 1024 * 1024);

        Self {
            port,
            model_dir,
            classifier,
            scaler,
            encoder,
            face_detector,
            face_landmarks,
            face_mesh,
            intra_threads,
            landmark_indices,
            cors_origins,
            max_upload_bytes,
        }
    }
}
