//! Pure vector math: normalization, similarity metrics, validity checks.
//!
//! Also provides the little-endian f32 BLOB codec used by SQLite-style
//! backends to persist embedding vectors.
//!
//! Two deliberately different strictness levels apply:
//! - [`is_valid_vector`] is the write-time and query-time gate; stores reject
//!   vectors that fail it.
//! - [`normalize`] is a best-effort smoothing step and never fails: a zero
//!   or non-finite input maps to an all-zero vector of the same length.

use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::VectorError;

/// Similarity metric for vector search.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Metric {
    /// `(a · b) / (‖a‖‖b‖)`, range [-1, 1]. The default.
    Cosine,
    /// Inverted L2 distance `1 / (1 + d)`, range (0, 1]; 1.0 at distance zero.
    Euclidean,
    /// Raw dot product, unbounded. Only relatively comparable.
    Dot,
}

impl Metric {
    pub fn as_str(self) -> &'static str {
        match self {
            Metric::Cosine => "cosine",
            Metric::Euclidean => "euclidean",
            Metric::Dot => "dot",
        }
    }
}

impl Default for Metric {
    fn default() -> Self {
        Metric::Cosine
    }
}

impl FromStr for Metric {
    type Err = VectorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "cosine" => Ok(Metric::Cosine),
            "euclidean" => Ok(Metric::Euclidean),
            "dot" => Ok(Metric::Dot),
            other => Err(VectorError::UnknownMetric(other.to_string())),
        }
    }
}

/// True iff `v` is non-empty and every component is finite.
pub fn is_valid_vector(v: &[f32]) -> bool {
    !v.is_empty() && v.iter().all(|x| x.is_finite())
}

/// Scale `v` to unit L2 norm.
///
/// A zero-norm or non-finite input returns an all-zero vector of the same
/// length rather than an error.
pub fn normalize(v: &[f32]) -> Vec<f32> {
    if v.iter().any(|x| !x.is_finite()) {
        return vec![0.0; v.len()];
    }
    let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm < f32::EPSILON {
        return vec![0.0; v.len()];
    }
    v.iter().map(|x| x / norm).collect()
}

/// Compute the similarity of `a` and `b` under `metric`.
///
/// Fails with [`VectorError::DimensionMismatch`] when the lengths differ.
pub fn similarity(a: &[f32], b: &[f32], metric: Metric) -> Result<f32, VectorError> {
    if a.len() != b.len() {
        return Err(VectorError::DimensionMismatch {
            left: a.len(),
            right: b.len(),
        });
    }
    Ok(match metric {
        Metric::Cosine => cosine(a, b),
        Metric::Euclidean => 1.0 / (1.0 + euclidean_distance(a, b)),
        Metric::Dot => dot(a, b),
    })
}

fn dot(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b.iter()).map(|(x, y)| x * y).sum()
}

fn cosine(a: &[f32], b: &[f32]) -> f32 {
    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;

    for (x, y) in a.iter().zip(b.iter()) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom < f32::EPSILON {
        return 0.0;
    }
    dot / denom
}

fn euclidean_distance(a: &[f32], b: &[f32]) -> f32 {
    a.iter()
        .zip(b.iter())
        .map(|(x, y)| (x - y) * (x - y))
        .sum::<f32>()
        .sqrt()
}

/// Encode a float vector as a BLOB (little-endian f32 bytes).
///
/// Each `f32` is stored as 4 bytes in little-endian order, producing a BLOB
/// of `vec.len() × 4` bytes.
pub fn vec_to_blob(vec: &[f32]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(vec.len() * 4);
    for &v in vec {
        bytes.extend_from_slice(&v.to_le_bytes());
    }
    bytes
}

/// Decode a BLOB back into a float vector.
///
/// Reverses [`vec_to_blob`]: reads 4-byte little-endian `f32` values.
pub fn blob_to_vec(blob: &[u8]) -> Vec<f32> {
    blob.chunks_exact(4)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect()
}
