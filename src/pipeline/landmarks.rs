use serde::{Deserialize, Serialize};

/// Landmark positions the classifier was trained on: lips, brows, both eyes,
/// both irises (refined mesh only), nose bridge, cheeks, forehead and chin.
const EMOTION_LANDMARKS: &[usize] = &[
    61, 146, 91, 181, 84, 17, 314, 405, 321, 375, 291,
    78, 191, 80, 81, 82, 13, 312, 311, 310, 415, 308,
    70, 63, 105, 66, 107, 55, 65, 52, 53, 46,
    336, 296, 334, 293, 300, 285, 295, 282, 283, 276,
    33, 7, 163, 144, 145, 153, 154, 155, 133, 173, 157, 158, 159, 160, 161, 246,
    474, 475, 476, 477,
    362, 382, 381, 380, 374, 373, 390, 249, 263, 466, 388, 387, 386, 385, 384, 398,
    469, 470, 471, 472,
    1, 4, 5, 6, 197, 195, 94, 323, 98, 327,
    205, 425, 10, 152,
];

/// A single detector-estimated point. `x`/`y` are normalized to the image
/// size, `z` is relative depth on roughly the same scale as `x`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Landmark {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl Landmark {
    pub fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }
}

/// Full detector output for one face, indexed by detector landmark id.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawLandmarks {
    points: Vec<Landmark>,
}

impl RawLandmarks {
    pub fn new(points: Vec<Landmark>) -> Self {
        Self { points }
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Landmark> {
        self.points.get(index)
    }

    pub fn points(&self) -> &[Landmark] {
        &self.points
    }

    pub fn truncate(&mut self, len: usize) {
        self.points.truncate(len);
    }
}

impl From<Vec<Landmark>> for RawLandmarks {
    fn from(points: Vec<Landmark>) -> Self {
        Self::new(points)
    }
}

/// Sorted, de-duplicated landmark ids. The order here is the canonical
/// feature order the classifier expects.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LandmarkIndexSet {
    indices: Vec<usize>,
}

impl LandmarkIndexSet {
    pub fn new<I: IntoIterator<Item = usize>>(indices: I) -> Self {
        let mut indices: Vec<usize> = indices.into_iter().collect();
        indices.sort_unstable();
        indices.dedup();
        Self { indices }
    }

    /// The subset the bundled emotion classifier was trained on (96 points).
    pub fn emotion() -> Self {
        Self::new(EMOTION_LANDMARKS.iter().copied())
    }

    /// Parse a comma separated list such as `"61, 146, 91"`.
    pub fn parse(list: &str) -> Option<Self> {
        let parsed: Result<Vec<usize>, _> = list
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::parse)
            .collect();
        match parsed {
            Ok(v) if !v.is_empty() => Some(Self::new(v)),
            _ => None,
        }
    }

    /// N, the classifier's sequence length.
    pub fn len(&self) -> usize {
        self.indices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }

    pub fn max_index(&self) -> Option<usize> {
        self.indices.last().copied()
    }

    /// Minimum detector landmark count needed to fill every index.
    pub fn required_landmarks(&self) -> usize {
        self.max_index().map_or(0, |m| m + 1)
    }

    /// Number of coordinates in a feature vector built from this set.
    pub fn coordinate_count(&self) -> usize {
        self.indices.len() * 3
    }

    pub fn iter(&self) -> impl Iterator<Item = usize> + '_ {
        self.indices.iter().copied()
    }

    pub fn as_slice(&self) -> &[usize] {
        &self.indices
    }
}

impl Default for LandmarkIndexSet {
    fn default() -> Self {
        Self::emotion()
    }
}
