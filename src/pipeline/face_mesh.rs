use anyhow::{ensure, Result};
use image::RgbImage;
#[cfg(feature = "onnx")]
use anyhow::Context;
#[cfg(feature = "onnx")]
use image::imageops::FilterType;
#[cfg(feature = "onnx")]
use ndarray::Array4;
#[cfg(feature = "onnx")]
use ort::session::{builder::GraphOptimizationLevel, Session};
#[cfg(feature = "onnx")]
use ort::value::{Tensor, ValueType};
#[cfg(feature = "onnx")]
use parking_lot::Mutex;
#[cfg(feature = "onnx")]
use std::path::Path;
#[cfg(feature = "onnx")]
use tracing::{debug, info};

#[cfg(feature = "onnx")]
use super::landmarks::Landmark;
use super::landmarks::RawLandmarks;

/// Landmarks in the base face mesh.
pub const BASE_MESH_POINTS: usize = 468;
/// Base mesh plus the ten refined iris points.
pub const REFINED_MESH_POINTS: usize = 478;

const IRIS_POINTS: usize = 5;

/// Eye contours whose mean depth is assigned to the matching iris points
/// (468..=472 and 473..=477).
const LEFT_EYE_CONTOUR: [usize; 16] = [33, 7, 163, 144, 145, 153, 154, 155, 133, 246, 161, 160, 159, 158, 157, 173];
const RIGHT_EYE_CONTOUR: [usize; 16] = [263, 249, 390, 373, 374, 380, 381, 382, 362, 466, 388, 387, 386, 385, 384, 398];

#[cfg(feature = "onnx")]
const DETECTOR_WIDTH: u32 = 320;
#[cfg(feature = "onnx")]
const DETECTOR_HEIGHT: u32 = 240;
#[cfg(feature = "onnx")]
const DEFAULT_MESH_SIZE: u32 = 192;
#[cfg(feature = "onnx")]
const ROI_PADDING: f32 = 0.25;
#[cfg(feature = "onnx")]
const NMS_IOU: f32 = 0.3;

/// Returns the full landmark set of the first detected face, or `None` when
/// no face clears the confidence thresholds.
pub trait LandmarkDetector: Send + Sync {
    fn detect(&self, image: &RgbImage) -> Result<Option<RawLandmarks>>;
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FaceMeshOptions {
    pub max_num_faces: usize,
    /// Keep the refined iris points (478-point output) instead of cutting
    /// back to the 468-point base mesh.
    pub refine_landmarks: bool,
    pub min_detection_confidence: f32,
    pub min_tracking_confidence: f32,
}

impl Default for FaceMeshOptions {
    fn default() -> Self {
        Self {
            max_num_faces: 1,
            refine_landmarks: true,
            min_detection_confidence: 0.6,
            min_tracking_confidence: 0.6,
        }
    }
}

impl FaceMeshOptions {
    pub fn validate(&self) -> Result<()> {
        ensure!(self.max_num_faces >= 1, "max_num_faces must be at least 1");
        for (name, v) in [
            ("min_detection_confidence", self.min_detection_confidence),
            ("min_tracking_confidence", self.min_tracking_confidence),
        ] {
            ensure!((0.0..=1.0).contains(&v), "{} must be within [0, 1], got {}", name, v);
        }
        Ok(())
    }

    /// Landmark count a detection is trimmed to.
    pub fn mesh_points(&self) -> usize {
        if self.refine_landmarks {
            REFINED_MESH_POINTS
        } else {
            BASE_MESH_POINTS
        }
    }
}

#[cfg(feature = "onnx")]
#[derive(Debug, Clone, Copy, PartialEq)]
struct FaceBox {
    x1: f32,
    y1: f32,
    x2: f32,
    y2: f32,
    confidence: f32,
}

/// Pixel-space crop fed to the mesh model.
#[cfg(feature = "onnx")]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Roi {
    x: u32,
    y: u32,
    width: u32,
    height: u32,
}

/// Two-stage face mesh: an UltraFace box detector followed by the face
/// landmark network on the first box.
#[cfg(feature = "onnx")]
pub struct OrtFaceMesh {
    detector: Mutex<Session>,
    mesh: Mutex<Session>,
    mesh_size: u32,
    options: FaceMeshOptions,
}

#[cfg(feature = "onnx")]
impl OrtFaceMesh {
    pub fn load(
        detector_path: &Path,
        mesh_path: &Path,
        options: FaceMeshOptions,
        intra_threads: usize,
    ) -> Result<Self> {
        options.validate()?;
        let detector = Session::builder()?
            .with_optimization_level(GraphOptimizationLevel::Level3)?
            .with_intra_threads(intra_threads)?
            .commit_from_file(detector_path)
            .with_context(|| format!("Failed to create face detector session from {:?}", detector_path))?;
        let mesh = Session::builder()?
            .with_optimization_level(GraphOptimizationLevel::Level3)?
            .with_intra_threads(intra_threads)?
            .commit_from_file(mesh_path)
            .with_context(|| format!("Failed to create face mesh session from {:?}", mesh_path))?;
        let mesh_size = match mesh.inputs.first().map(|i| &i.input_type) {
            Some(ValueType::Tensor { shape, .. }) => mesh_input_size(shape),
            _ => DEFAULT_MESH_SIZE,
        };
        info!(
            "Face mesh loaded: detector={:?} mesh={:?} ({}x{}) options={:?}",
            detector_path, mesh_path, mesh_size, mesh_size, options
        );
        Ok(Self {
            detector: Mutex::new(detector),
            mesh: Mutex::new(mesh),
            mesh_size,
            options,
        })
    }

    fn detect_faces(&self, image: &RgbImage) -> Result<Vec<FaceBox>> {
        let resized = image::imageops::resize(image, DETECTOR_WIDTH, DETECTOR_HEIGHT, FilterType::Triangle);
        let input = Array4::from_shape_fn(
            (1, 3, DETECTOR_HEIGHT as usize, DETECTOR_WIDTH as usize),
            |(_, c, y, x)| (resized.get_pixel(x as u32, y as u32)[c] as f32 - 127.0) / 128.0,
        );
        let input = Tensor::from_array(input).context("Failed to create detector input tensor")?;

        let mut session = self.detector.lock();
        let outputs = session
            .run(ort::inputs![input])
            .context("Face detector inference failed")?;
        let (_, scores) = outputs
            .get("scores")
            .context("Face detector has no `scores` output")?
            .try_extract_tensor::<f32>()
            .context("Detector scores are not f32")?;
        let (_, boxes) = outputs
            .get("boxes")
            .context("Face detector has no `boxes` output")?
            .try_extract_tensor::<f32>()
            .context("Detector boxes are not f32")?;

        let candidates = decode_detections(
            scores,
            boxes,
            image.width() as f32,
            image.height() as f32,
            self.options.min_detection_confidence,
        );
        let mut faces: Vec<FaceBox> = nms(&candidates, NMS_IOU)
            .into_iter()
            .map(|i| candidates[i])
            .collect();
        faces.truncate(self.options.max_num_faces);
        debug!("Face detector: {} candidates, {} kept", candidates.len(), faces.len());
        Ok(faces)
    }

    fn mesh_landmarks(&self, image: &RgbImage, face: &FaceBox) -> Result<Option<RawLandmarks>> {
        let Some(roi) = square_roi(face, ROI_PADDING, image.width(), image.height()) else {
            return Ok(None);
        };
        let crop = image::imageops::crop_imm(image, roi.x, roi.y, roi.width, roi.height).to_image();
        let size = self.mesh_size;
        let resized = image::imageops::resize(&crop, size, size, FilterType::Triangle);
        let input = Array4::from_shape_fn(
            (1, size as usize, size as usize, 3),
            |(_, y, x, c)| resized.get_pixel(x as u32, y as u32)[c] as f32 / 127.5 - 1.0,
        );
        let input = Tensor::from_array(input).context("Failed to create mesh input tensor")?;

        let mut session = self.mesh.lock();
        let outputs = session
            .run(ort::inputs![input])
            .context("Face mesh inference failed")?;

        let mut coords: Option<Vec<f32>> = None;
        let mut face_flag: Option<f32> = None;
        let mut left_iris: Option<Vec<f32>> = None;
        let mut right_iris: Option<Vec<f32>> = None;
        // Unnamed iris outputs arrive left first, as in the attention mesh export.
        let mut unnamed_iris: Vec<Vec<f32>> = Vec::new();
        for (name, value) in outputs.iter() {
            let Ok((_, data)) = value.try_extract_tensor::<f32>() else {
                continue;
            };
            let name = name.to_ascii_lowercase();
            if data.len() == 1 {
                face_flag = Some(data[0]);
            } else if data.len() == IRIS_POINTS * 2 || data.len() == IRIS_POINTS * 3 {
                if name.contains("left") {
                    left_iris = Some(data.to_vec());
                } else if name.contains("right") {
                    right_iris = Some(data.to_vec());
                } else {
                    unnamed_iris.push(data.to_vec());
                }
            } else if data.len() >= BASE_MESH_POINTS * 3
                && coords.as_ref().map_or(true, |c| data.len() > c.len())
            {
                coords = Some(data.to_vec());
            }
        }
        drop(outputs);
        drop(session);
        let mut unnamed_iris = unnamed_iris.into_iter();
        let left_iris = left_iris.or_else(|| unnamed_iris.next());
        let right_iris = right_iris.or_else(|| unnamed_iris.next());
        let mut coords = coords.context("Face mesh produced no landmark tensor")?;

        if let Some(logit) = face_flag {
            let presence = sigmoid(logit);
            if presence < self.options.min_tracking_confidence {
                debug!("Face presence {:.3} below tracking threshold", presence);
                return Ok(None);
            }
        }

        if self.options.refine_landmarks && coords.len() == BASE_MESH_POINTS * 3 {
            if let (Some(left), Some(right)) = (&left_iris, &right_iris) {
                coords = refine_mesh(&coords, left, right);
            }
        }

        let points = map_mesh_points(&coords, roi, self.mesh_size, image.width(), image.height());
        let mut landmarks = RawLandmarks::new(points);
        landmarks.truncate(self.options.mesh_points());
        Ok(Some(landmarks))
    }
}

#[cfg(feature = "onnx")]
impl LandmarkDetector for OrtFaceMesh {
    fn detect(&self, image: &RgbImage) -> Result<Option<RawLandmarks>> {
        let faces = self.detect_faces(image)?;
        match faces.first() {
            Some(face) => self.mesh_landmarks(image, face),
            None => Ok(None),
        }
    }
}

/// Scores are `[face_bg, face]` pairs, boxes normalized `[x1, y1, x2, y2]`.
#[cfg(feature = "onnx")]
fn decode_detections(scores: &[f32], boxes: &[f32], width: f32, height: f32, threshold: f32) -> Vec<FaceBox> {
    let n = (scores.len() / 2).min(boxes.len() / 4);
    (0..n)
        .filter(|&i| scores[i * 2 + 1] >= threshold)
        .map(|i| FaceBox {
            x1: boxes[i * 4] * width,
            y1: boxes[i * 4 + 1] * height,
            x2: boxes[i * 4 + 2] * width,
            y2: boxes[i * 4 + 3] * height,
            confidence: scores[i * 2 + 1],
        })
        .collect()
}

#[cfg(feature = "onnx")]
fn nms(boxes: &[FaceBox], iou_threshold: f32) -> Vec<usize> {
    let mut indices: Vec<usize> = (0..boxes.len()).collect();
    indices.sort_by(|&a, &b| {
        boxes[b]
            .confidence
            .partial_cmp(&boxes[a].confidence)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    let mut keep = Vec::new();
    let mut suppressed = vec![false; boxes.len()];
    for (pos, &ia) in indices.iter().enumerate() {
        if suppressed[ia] {
            continue;
        }
        keep.push(ia);
        for &ib in indices.iter().skip(pos + 1) {
            if !suppressed[ib] && calculate_iou(&boxes[ia], &boxes[ib]) > iou_threshold {
                suppressed[ib] = true;
            }
        }
    }
    keep
}

#[cfg(feature = "onnx")]
fn calculate_iou(a: &FaceBox, b: &FaceBox) -> f32 {
    let x1 = a.x1.max(b.x1);
    let y1 = a.y1.max(b.y1);
    let x2 = a.x2.min(b.x2);
    let y2 = a.y2.min(b.y2);
    if x2 <= x1 || y2 <= y1 {
        return 0.0;
    }
    let intersection = (x2 - x1) * (y2 - y1);
    let area_a = (a.x2 - a.x1) * (a.y2 - a.y1);
    let area_b = (b.x2 - b.x1) * (b.y2 - b.y1);
    let union = area_a + area_b - intersection;
    if union <= 0.0 {
        return 0.0;
    }
    intersection / union
}

/// Pad the box, make it square around its center and clamp to the image.
#[cfg(feature = "onnx")]
fn square_roi(face: &FaceBox, padding: f32, width: u32, height: u32) -> Option<Roi> {
    let cx = (face.x1 + face.x2) / 2.0;
    let cy = (face.y1 + face.y2) / 2.0;
    let side = (face.x2 - face.x1).max(face.y2 - face.y1) * (1.0 + padding);
    let x1 = (cx - side / 2.0).max(0.0);
    let y1 = (cy - side / 2.0).max(0.0);
    let x2 = (cx + side / 2.0).min(width as f32);
    let y2 = (cy + side / 2.0).min(height as f32);
    if x2 - x1 < 1.0 || y2 - y1 < 1.0 {
        return None;
    }
    Some(Roi {
        x: x1 as u32,
        y: y1 as u32,
        width: (x2 - x1) as u32,
        height: (y2 - y1) as u32,
    })
}

/// Square NHWC input side from the model's declared `[1, H, W, 3]` shape.
/// Dynamic or unexpected shapes fall back to 192.
#[cfg(feature = "onnx")]
fn mesh_input_size(dims: &[i64]) -> u32 {
    match dims {
        [_, h, w, 3] if *h > 0 && h == w => *h as u32,
        _ => DEFAULT_MESH_SIZE,
    }
}

/// Append the two iris point sets to the 468-point base mesh, giving the
/// 478-point refined layout. Iris tensors hold five `(x, y)` or `(x, y, z)`
/// points in mesh-input space; depth always comes from the mean depth of the
/// matching eye contour.
pub fn refine_mesh(mesh: &[f32], left_iris: &[f32], right_iris: &[f32]) -> Vec<f32> {
    let mut refined = Vec::with_capacity(REFINED_MESH_POINTS * 3);
    refined.extend_from_slice(&mesh[..(BASE_MESH_POINTS * 3).min(mesh.len())]);
    for (iris, contour) in [(left_iris, &LEFT_EYE_CONTOUR), (right_iris, &RIGHT_EYE_CONTOUR)] {
        let depths: Vec<f32> = contour
            .iter()
            .filter_map(|&i| mesh.get(i * 3 + 2).copied())
            .collect();
        let z = if depths.is_empty() {
            0.0
        } else {
            depths.iter().sum::<f32>() / depths.len() as f32
        };
        let dims = (iris.len() / IRIS_POINTS).max(2);
        for p in iris.chunks_exact(dims).take(IRIS_POINTS) {
            refined.extend_from_slice(&[p[0], p[1], z]);
        }
    }
    refined
}

/// Mesh-space (0..mesh_size) points back to image-normalized coordinates.
#[cfg(feature = "onnx")]
fn map_mesh_points(coords: &[f32], roi: Roi, mesh_size: u32, width: u32, height: u32) -> Vec<Landmark> {
    let sx = roi.width as f32 / mesh_size as f32;
    let sy = roi.height as f32 / mesh_size as f32;
    let (w, h) = (width as f32, height as f32);
    coords
        .chunks_exact(3)
        .map(|p| Landmark {
            x: (roi.x as f32 + p[0] * sx) / w,
            y: (roi.y as f32 + p[1] * sy) / h,
            z: p[2] * sx / w,
        })
        .collect()
}

#[cfg(feature = "onnx")]
fn sigmoid(x: f32) -> f32 {
    1.0 / (1.0 + (-x).exp())
}
