#![allow(dead_code)]

use std::io::Cursor;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use anyhow::{bail, Result};
use image::{DynamicImage, ImageBuffer, ImageOutputFormat, Rgb, RgbImage};
use landmark_emotion::api::routes;
use landmark_emotion::pipeline::classifier::{ClassProbabilities, Classifier, PositionalIndices};
use landmark_emotion::pipeline::face_mesh::{LandmarkDetector, REFINED_MESH_POINTS};
use landmark_emotion::pipeline::labels::LabelDecoder;
use landmark_emotion::pipeline::landmarks::{Landmark, LandmarkIndexSet, RawLandmarks};
use landmark_emotion::pipeline::scaler::{NormalizedVector, Normalizer};
use landmark_emotion::pipeline::PipelineResources;
use landmark_emotion::AppState;
use tempfile::TempDir;
use tokio::net::TcpListener;

pub const CLASSES: &[&str] = &["angry", "happy", "neutral", "sad"];

/// Synthetic mesh with `n` points; point `i` sits near `(i, i, -i) / 1000`.
pub fn mesh(n: usize) -> RawLandmarks {
    (0..n)
        .map(|i| {
            let f = i as f32 / 1000.0;
            Landmark::new(f, f + 0.0005, -f)
        })
        .collect::<Vec<_>>()
        .into()
}

/// Returns a fixed mesh size, or no face at all.
pub struct StubDetector {
    pub points: Option<usize>,
    pub calls: Arc<AtomicUsize>,
}

impl StubDetector {
    pub fn face(points: usize) -> Self {
        Self { points: Some(points), calls: Arc::new(AtomicUsize::new(0)) }
    }

    pub fn no_face() -> Self {
        Self { points: None, calls: Arc::new(AtomicUsize::new(0)) }
    }
}

impl LandmarkDetector for StubDetector {
    fn detect(&self, _image: &RgbImage) -> Result<Option<RawLandmarks>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.points.map(mesh))
    }
}

pub struct FailingDetector;

impl LandmarkDetector for FailingDetector {
    fn detect(&self, _image: &RgbImage) -> Result<Option<RawLandmarks>> {
        bail!("detector session crashed")
    }
}

/// Checks the input contract and returns fixed probabilities.
pub struct StubClassifier {
    pub probs: Vec<f32>,
    pub sequence_length: usize,
}

impl Classifier for StubClassifier {
    fn predict(&self, features: &NormalizedVector, positions: &PositionalIndices) -> Result<ClassProbabilities> {
        if positions.len() != self.sequence_length {
            bail!("expected {} positions, got {}", self.sequence_length, positions.len());
        }
        if features.to_sequence(positions.len()).is_err() {
            bail!("features do not reshape to (1, {}, 3)", positions.len());
        }
        let expected: Vec<i64> = (0..self.sequence_length as i64).collect();
        if positions.as_array().row(0).to_vec() != expected {
            bail!("positions are not 0..N");
        }
        Ok(ClassProbabilities::new(self.probs.clone()))
    }
}

pub struct PanickingClassifier;

impl Classifier for PanickingClassifier {
    fn predict(&self, _features: &NormalizedVector, _positions: &PositionalIndices) -> Result<ClassProbabilities> {
        panic!("tensor shape exploded")
    }
}

pub fn labels() -> LabelDecoder {
    LabelDecoder::new(CLASSES.iter().map(|s| s.to_string()).collect()).unwrap()
}

pub fn identity_normalizer(features: usize) -> Normalizer {
    Normalizer::standard(vec![0.0; features], vec![1.0; features]).unwrap()
}

/// Resources over the built-in landmark set with the given seams.
pub fn resources_with(detector: Box<dyn LandmarkDetector>, classifier: Box<dyn Classifier>) -> PipelineResources {
    let index_set = LandmarkIndexSet::emotion();
    let normalizer = identity_normalizer(index_set.coordinate_count());
    PipelineResources::new(index_set, detector, normalizer, classifier, labels()).unwrap()
}

pub fn happy_classifier() -> StubClassifier {
    StubClassifier {
        probs: vec![0.05, 0.8, 0.1, 0.05],
        sequence_length: LandmarkIndexSet::emotion().len(),
    }
}

/// One face, refined mesh, classifier favouring "happy".
pub fn happy_resources() -> PipelineResources {
    resources_with(Box::new(StubDetector::face(REFINED_MESH_POINTS)), Box::new(happy_classifier()))
}

pub fn png_bytes(width: u32, height: u32) -> Vec<u8> {
    let img: RgbImage = ImageBuffer::from_pixel(width, height, Rgb([200, 150, 120]));
    let mut buf = Vec::new();
    DynamicImage::ImageRgb8(img)
        .write_to(&mut Cursor::new(&mut buf), ImageOutputFormat::Png)
        .unwrap();
    buf
}

pub fn jpeg_bytes(width: u32, height: u32) -> Vec<u8> {
    let img: RgbImage = ImageBuffer::from_pixel(width, height, Rgb([90, 60, 40]));
    let mut buf = Vec::new();
    DynamicImage::ImageRgb8(img)
        .write_to(&mut Cursor::new(&mut buf), ImageOutputFormat::Jpeg(90))
        .unwrap();
    buf
}

/// Write scaler and encoder JSON into a temp model directory.
pub fn write_artifacts(scaler_json: &str, encoder_json: &str) -> (TempDir, PathBuf, PathBuf) {
    let tmp = TempDir::new().unwrap();
    let scaler = tmp.path().join("landmark_scaler.json");
    let encoder = tmp.path().join("label_encoder.json");
    std::fs::write(&scaler, scaler_json).unwrap();
    std::fs::write(&encoder, encoder_json).unwrap();
    (tmp, scaler, encoder)
}

pub fn app_state(resources: Option<PipelineResources>) -> Arc<AppState> {
    Arc::new(AppState {
        started_at: std::time::Instant::now(),
        cors_origins: vec![
            "http://localhost:3000".to_string(),
            "http://127.0.0.1:3000".to_string(),
        ],
        max_upload_bytes: 16 * 1024 * 1024,
        resources: resources.map(Arc::new),
    })
}

/// Serve the router on an ephemeral port and return a client for it.
pub async fn spawn_server(state: Arc<AppState>) -> TestClient {
    let app = routes::router(state);
    let addr = SocketAddr::from(([127, 0, 0, 1], 0));
    let listener = TcpListener::bind(&addr).await.unwrap();
    let port = listener.local_addr().unwrap().port();
    tokio::spawn(async move {
        axum::serve(listener, app.into_make_service()).await.unwrap();
    });
    TestClient::new(port)
}

/// Helper to make HTTP requests to test server
pub struct TestClient {
    pub base_url: String,
    pub client: reqwest::Client,
}

impl TestClient {
    pub fn new(port: u16) -> Self {
        Self {
            base_url: format!("http://127.0.0.1:{}", port),
            client: reqwest::Client::new(),
        }
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    pub async fn get(&self, path: &str) -> reqwest::Result<reqwest::Response> {
        self.client.get(self.url(path)).send().await
    }

    pub async fn post_json(&self, path: &str, json: &serde_json::Value) -> reqwest::Result<reqwest::Response> {
        self.client.post(self.url(path)).json(json).send().await
    }

    /// Multipart upload with the image under the `file` field.
    pub async fn upload(&self, path: &str, filename: &str, bytes: Vec<u8>) -> reqwest::Result<reqwest::Response> {
        let part = reqwest::multipart::Part::bytes(bytes).file_name(filename.to_string());
        let form = reqwest::multipart::Form::new().part("file", part);
        self.client.post(self.url(path)).multipart(form).send().await
    }
}
