//! Vector index seam.
//!
//! A [`VectorIndex`] is a persistent nearest-neighbour store holding named,
//! isolated collections. Implementations own their storage exclusively: a
//! handle must be closed before another may open the same path.

use crate::types::RecordPayload;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum IndexError {
    /// Storage unreachable or held by another handle.
    #[error("index unavailable: {0}")]
    Unavailable(String),
    #[error("collection not found: {0}")]
    CollectionNotFound(String),
    #[error("dimension mismatch in collection {collection}: expected {expected}, got {actual}")]
    DimensionMismatch {
        collection: String,
        expected: usize,
        actual: usize,
    },
    #[error("point {id} in collection {collection} has non-finite values")]
    NonFiniteVector { collection: String, id: String },
    #[error("index storage error: {0}")]
    Storage(String),
}

/// Distance metric a collection is created with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Distance {
    /// Cosine similarity; higher scores are closer.
    Cosine,
    /// Raw dot product; higher scores are closer.
    Dot,
    /// Negated Euclidean distance, so higher scores are still closer.
    Euclid,
}

impl Distance {
    pub fn as_str(&self) -> &'static str {
        match self {
            Distance::Cosine => "cosine",
            Distance::Dot => "dot",
            Distance::Euclid => "euclid",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "cosine" => Some(Distance::Cosine),
            "dot" => Some(Distance::Dot),
            "euclid" => Some(Distance::Euclid),
            _ => None,
        }
    }

    /// Score `a` against `b` under this metric (higher = closer).
    pub fn score(&self, a: &[f32], b: &[f32]) -> f32 {
        match self {
            Distance::Cosine => crate::types::cosine_similarity(a, b),
            Distance::Dot => a.iter().zip(b).map(|(x, y)| x * y).sum(),
            Distance::Euclid => -a
                .iter()
                .zip(b)
                .map(|(x, y)| (x - y).powi(2))
                .sum::<f32>()
                .sqrt(),
        }
    }
}

impl fmt::Display for Distance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A vector plus payload to upsert.
#[derive(Debug, Clone)]
pub struct Point {
    pub id: String,
    pub vector: Vec<f32>,
    pub payload: RecordPayload,
}

/// A ranked query hit.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredPoint {
    pub id: String,
    pub score: f32,
    pub payload: RecordPayload,
}

/// Declared schema and size of a collection.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CollectionInfo {
    pub name: String,
    pub dimension: usize,
    pub distance: Distance,
    pub points_count: u64,
}

pub trait VectorIndex {
    fn collection_exists(&self, name: &str) -> Result<bool, IndexError>;

    /// Create a collection. Creating one that already exists is an error;
    /// use [`collection_exists`](Self::collection_exists) first.
    fn create_collection(
        &mut self,
        name: &str,
        dimension: usize,
        distance: Distance,
    ) -> Result<(), IndexError>;

    /// Drop a collection and every point in it. Returns whether it existed.
    fn delete_collection(&mut self, name: &str) -> Result<bool, IndexError>;

    /// Insert or replace points by id. Durable once this returns.
    ///
    /// Every point is validated first; a wrong-length or non-finite vector
    /// rejects the whole batch and nothing is written.
    fn upsert(&mut self, collection: &str, points: Vec<Point>) -> Result<(), IndexError>;

    /// Up to `limit` points ranked by descending score, skipping any below
    /// `score_floor` when given.
    fn query(
        &self,
        collection: &str,
        vector: &[f32],
        limit: usize,
        score_floor: Option<f32>,
    ) -> Result<Vec<ScoredPoint>, IndexError>;

    fn collection_info(&self, collection: &str) -> Result<CollectionInfo, IndexError>;

    /// Release the underlying storage so another handle may open it.
    fn close(self) -> Result<(), IndexError>
    where
        Self: Sized;
}

/// Reject a point whose vector cannot be stored in a collection of
/// `dimension`.
pub fn check_point(collection: &str, dimension: usize, point: &Point) -> Result<(), IndexError> {
    if point.vector.len() != dimension {
        return Err(IndexError::DimensionMismatch {
            collection: collection.to_string(),
            expected: dimension,
            actual: point.vector.len(),
        });
    }
    if point.vector.iter().any(|v| !v.is_finite()) {
        return Err(IndexError::NonFiniteVector {
            collection: collection.to_string(),
            id: point.id.clone(),
        });
    }
    Ok(())
}
