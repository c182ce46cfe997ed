#[cfg(feature = "onnx")]
use anyhow::{bail, Context};
use anyhow::Result;
use ndarray::Array2;
#[cfg(feature = "onnx")]
use ort::session::{builder::GraphOptimizationLevel, Session};
#[cfg(feature = "onnx")]
use ort::tensor::TensorElementType;
#[cfg(feature = "onnx")]
use ort::value::{DynValue, Tensor, ValueType};
#[cfg(feature = "onnx")]
use parking_lot::Mutex;
#[cfg(feature = "onnx")]
use std::path::Path;
#[cfg(feature = "onnx")]
use tracing::info;

use super::scaler::NormalizedVector;

/// Static `0..N` sequence-position input, shaped as a batch of one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PositionalIndices {
    positions: Array2<i64>,
}

impl PositionalIndices {
    pub fn for_len(sequence_length: usize) -> Self {
        let positions = Array2::from_shape_fn((1, sequence_length), |(_, i)| i as i64);
        Self { positions }
    }

    pub fn len(&self) -> usize {
        self.positions.ncols()
    }

    pub fn is_empty(&self) -> bool {
        self.positions.ncols() == 0
    }

    pub fn as_array(&self) -> &Array2<i64> {
        &self.positions
    }
}

/// Raw classifier output for one image, one entry per known class.
#[derive(Debug, Clone, PartialEq)]
pub struct ClassProbabilities {
    probs: Vec<f32>,
}

impl ClassProbabilities {
    pub fn new(probs: Vec<f32>) -> Self {
        Self { probs }
    }

    pub fn as_slice(&self) -> &[f32] {
        &self.probs
    }

    pub fn len(&self) -> usize {
        self.probs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.probs.is_empty()
    }

    /// Index and value of the first maximum. NaN entries never win.
    pub fn argmax(&self) -> Option<(usize, f32)> {
        let mut best: Option<(usize, f32)> = None;
        for (i, &p) in self.probs.iter().enumerate() {
            if p.is_nan() {
                continue;
            }
            if best.map_or(true, |(_, b)| p > b) {
                best = Some((i, p));
            }
        }
        best
    }
}

/// Dual-input emotion classifier: `(1, N, 3)` coordinates + `(1, N)` positions.
pub trait Classifier: Send + Sync {
    fn predict(
        &self,
        features: &NormalizedVector,
        positions: &PositionalIndices,
    ) -> Result<ClassProbabilities>;
}

#[cfg(feature = "onnx")]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PositionType {
    I64,
    I32,
    F32,
}

/// ONNX export of the trained classifier.
#[cfg(feature = "onnx")]
pub struct OrtClassifier {
    session: Mutex<Session>,
    coords_input: String,
    positions_input: String,
    positions_type: PositionType,
}

#[cfg(feature = "onnx")]
impl OrtClassifier {
    pub fn load(model_path: &Path, intra_threads: usize) -> Result<Self> {
        let session = Session::builder()?
            .with_optimization_level(GraphOptimizationLevel::Level3)?
            .with_intra_threads(intra_threads)?
            .commit_from_file(model_path)
            .with_context(|| format!("Failed to create classifier session from {:?}", model_path))?;

        if session.inputs.len() != 2 {
            bail!(
                "Classifier must take coordinates and positions, found {} inputs",
                session.inputs.len()
            );
        }
        let coords_input = session.inputs[0].name.clone();
        let positions_input = session.inputs[1].name.clone();
        let positions_type = match &session.inputs[1].input_type {
            ValueType::Tensor { ty: TensorElementType::Int64, .. } => PositionType::I64,
            ValueType::Tensor { ty: TensorElementType::Int32, .. } => PositionType::I32,
            ValueType::Tensor { ty: TensorElementType::Float32, .. } => PositionType::F32,
            other => bail!("Unsupported positional input type {:?}", other),
        };
        info!(
            "Classifier loaded from {:?}: inputs [{}, {} ({:?})]",
            model_path, coords_input, positions_input, positions_type
        );

        Ok(Self {
            session: Mutex::new(session),
            coords_input,
            positions_input,
            positions_type,
        })
    }

    fn positions_value(&self, positions: &PositionalIndices) -> Result<DynValue> {
        let arr = positions.as_array();
        let value = match self.positions_type {
            PositionType::I64 => Tensor::from_array(arr.clone())?.into_dyn(),
            PositionType::I32 => Tensor::from_array(arr.mapv(|v| v as i32))?.into_dyn(),
            PositionType::F32 => Tensor::from_array(arr.mapv(|v| v as f32))?.into_dyn(),
        };
        Ok(value)
    }
}

#[cfg(feature = "onnx")]
impl Classifier for OrtClassifier {
    fn predict(
        &self,
        features: &NormalizedVector,
        positions: &PositionalIndices,
    ) -> Result<ClassProbabilities> {
        let coords = Tensor::from_array(features.to_sequence(positions.len())?)
            .context("Failed to create coordinate tensor")?;
        let positions = self.positions_value(positions)?;

        let mut session = self.session.lock();
        let outputs = session
            .run(ort::inputs![
                self.coords_input.as_str() => coords,
                self.positions_input.as_str() => positions
            ])
            .context("Classifier inference failed")?;
        let (shape, data) = outputs[0]
            .try_extract_tensor::<f32>()
            .context("Classifier output is not an f32 tensor")?;

        // (1, classes) for a batch of one; take the first row.
        let classes = shape.last().copied().unwrap_or(0).max(0) as usize;
        Ok(ClassProbabilities::new(data[..classes.min(data.len())].to_vec()))
    }
}
