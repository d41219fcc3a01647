//! Face embeddings, enrollment sets and nearest-neighbour matching.

use anyhow::{anyhow, Result};
use ndarray::{ArrayViewD, Axis};
use serde::{Deserialize, Serialize};
use std::ops::Deref;
use tracing::{debug, warn};

/// Number of components produced by the face embedding model
pub const EMBEDDING_DIM: usize = 192;

/// Face feature vector
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Embedding(Vec<f32>);

impl Embedding {
    pub fn new(values: Vec<f32>) -> Self {
        Self(values)
    }

    /// Euclidean norm
    pub fn norm(&self) -> f32 {
        self.0.iter().map(|v| v * v).sum::<f32>().sqrt()
    }

    /// Unit-length copy. A zero vector is returned unchanged.
    pub fn l2_normalized(&self) -> Embedding {
        Embedding(l2_normalize(&self.0))
    }

    pub fn into_inner(self) -> Vec<f32> {
        self.0
    }
}

impl Deref for Embedding {
    type Target = [f32];

    fn deref(&self) -> &[f32] {
        &self.0
    }
}

impl From<Vec<f32>> for Embedding {
    fn from(values: Vec<f32>) -> Self {
        Self(values)
    }
}

pub fn l2_normalize(values: &[f32]) -> Vec<f32> {
    let norm = values.iter().map(|v| v * v).sum::<f32>().sqrt();
    if norm > 0.0 {
        values.iter().map(|v| v / norm).collect()
    } else {
        values.to_vec()
    }
}

/// Euclidean distance between two equal-length vectors
pub fn euclidean_distance(a: &[f32], b: &[f32]) -> f32 {
    a.iter()
        .zip(b)
        .map(|(x, y)| {
            let diff = x - y;
            diff * diff
        })
        .sum::<f32>()
        .sqrt()
}

/// Read batch row 0 of an embedder output (`[batch, dim]` or flat `[dim]`)
/// and L2-normalize it.
pub fn extract_embedding(output: ArrayViewD<'_, f32>) -> Result<Embedding> {
    let row = match output.ndim() {
        1 => output,
        2 if output.shape()[0] > 0 => output.index_axis_move(Axis(0), 0),
        _ => {
            return Err(anyhow!(
                "Unexpected embedding output shape {:?}",
                output.shape()
            ))
        }
    };

    let values: Vec<f32> = row.iter().copied().collect();
    if values.len() != EMBEDDING_DIM {
        debug!(
            dim = values.len(),
            expected = EMBEDDING_DIM,
            "Embedding dimension differs from the default model"
        );
    }
    Ok(Embedding(l2_normalize(&values)))
}

/// Collects embeddings for one identity during a capture session
#[derive(Debug, Clone)]
pub struct EnrollmentSession {
    name: String,
    embeddings: Vec<Embedding>,
}

impl EnrollmentSession {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            embeddings: Vec::new(),
        }
    }

    /// Append one embedding; every detected face contributes, no dedup or cap
    pub fn push(&mut self, embedding: Embedding) {
        telemetry::metrics::ENROLLED_EMBEDDINGS.inc();
        self.embeddings.push(embedding);
    }

    pub fn len(&self) -> usize {
        self.embeddings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.embeddings.is_empty()
    }

    /// Freeze the collected embeddings for matching
    pub fn finish(self) -> EnrollmentSet {
        tracing::info!(
            identity = %self.name,
            embeddings = self.embeddings.len(),
            "Enrollment finished"
        );
        EnrollmentSet {
            name: self.name,
            embeddings: self.embeddings,
        }
    }
}

/// Read-only reference embeddings for one enrolled identity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnrollmentSet {
    name: String,
    embeddings: Vec<Embedding>,
}

impl EnrollmentSet {
    pub fn new(name: impl Into<String>, embeddings: Vec<Embedding>) -> Self {
        Self {
            name: name.into(),
            embeddings,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn embeddings(&self) -> &[Embedding] {
        &self.embeddings
    }

    pub fn len(&self) -> usize {
        self.embeddings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.embeddings.is_empty()
    }
}

/// Result of checking one query face against an enrollment set
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FaceVerdict {
    pub matched: bool,

    /// Smallest normalized distance, `None` when nothing was comparable
    pub min_distance: Option<f32>,

    /// Identity name on a match, `NOT <name>` otherwise
    pub label: String,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FaceEmbeddingMatcher {
    pub threshold: f32,
}

impl Default for FaceEmbeddingMatcher {
    fn default() -> Self {
        Self { threshold: 0.9 }
    }
}

impl FaceEmbeddingMatcher {
    pub fn new(threshold: f32) -> Self {
        Self { threshold }
    }

    /// Minimum distance between the normalized query and each normalized
    /// enrolled embedding. `None` for an empty set.
    pub fn min_distance(&self, query: &[f32], set: &EnrollmentSet) -> Option<f32> {
        let query = l2_normalize(query);

        set.embeddings()
            .iter()
            .filter_map(|known| {
                if known.len() != query.len() {
                    warn!(
                        enrolled = known.len(),
                        query = query.len(),
                        "Skipping enrolled embedding with mismatched dimension"
                    );
                    return None;
                }
                Some(euclidean_distance(&l2_normalize(known), &query))
            })
            .filter(|d| !d.is_nan())
            .min_by(|a, b| a.total_cmp(b))
    }

    /// True iff the minimum distance is strictly below the threshold
    pub fn matches(&self, query: &[f32], set: &EnrollmentSet) -> bool {
        self.verify(query, set).matched
    }

    pub fn verify(&self, query: &[f32], set: &EnrollmentSet) -> FaceVerdict {
        let min_distance = self.min_distance(query, set);
        let matched = min_distance.is_some_and(|d| d < self.threshold);

        debug!(
            identity = %set.name(),
            min_distance = ?min_distance,
            threshold = self.threshold,
            matched,
            "Compared query face"
        );
        telemetry::metrics::FACE_MATCHES
            .with_label_values(&[if matched { "match" } else { "no_match" }])
            .inc();

        FaceVerdict {
            matched,
            min_distance,
            label: if matched {
                set.name().to_string()
            } else {
                format!("NOT {}", set.name())
            },
        }
    }
}
