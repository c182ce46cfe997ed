use serde::Deserialize;
use std::collections::HashSet;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum LabelError {
    #[error("Class index {index} is not a known label ({classes} classes)")]
    UnknownIndex { index: usize, classes: usize },

    #[error("Classifier produced {actual} probabilities but the encoder knows {expected} classes")]
    ClassCountMismatch { expected: usize, actual: usize },

    #[error("Invalid label encoder: {0}")]
    Invalid(String),

    #[error("Label encoder JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Deserialize)]
#[serde(untagged)]
enum EncoderFile {
    Classes { classes: Vec<String> },
    Bare(Vec<String>),
}

/// Fitted class-index -> emotion-name mapping.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LabelDecoder {
    classes: Vec<String>,
}

impl LabelDecoder {
    pub fn new(classes: Vec<String>) -> Result<Self, LabelError> {
        if classes.is_empty() {
            return Err(LabelError::Invalid("no classes".to_string()));
        }
        let mut seen = HashSet::new();
        if let Some(dup) = classes.iter().find(|c| !seen.insert(c.as_str())) {
            return Err(LabelError::Invalid(format!("duplicate class {:?}", dup)));
        }
        Ok(Self { classes })
    }

    /// Accepts `["angry", "happy"]` or `{"classes": ["angry", "happy"]}`.
    pub fn from_json(text: &str) -> Result<Self, LabelError> {
        let classes = match serde_json::from_str::<EncoderFile>(text)? {
            EncoderFile::Classes { classes } | EncoderFile::Bare(classes) => classes,
        };
        Self::new(classes)
    }

    pub fn len(&self) -> usize {
        self.classes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.classes.is_empty()
    }

    pub fn classes(&self) -> &[String] {
        &self.classes
    }

    pub fn decode(&self, index: usize) -> Result<&str, LabelError> {
        self.classes
            .get(index)
            .map(String::as_str)
            .ok_or(LabelError::UnknownIndex {
                index,
                classes: self.classes.len(),
            })
    }

    pub fn check_class_count(&self, actual: usize) -> Result<(), LabelError> {
        if actual != self.classes.len() {
            return Err(LabelError::ClassCountMismatch {
                expected: self.classes.len(),
                actual,
            });
        }
        Ok(())
    }
}
