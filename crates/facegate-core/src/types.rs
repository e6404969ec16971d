use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Face embedding vector (512-dimensional for ArcFace).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Embedding {
    pub values: Vec<f32>,
    /// Model version that produced this embedding (e.g., "w600k_r50").
    pub model_version: Option<String>,
}

impl Embedding {
    pub fn new(values: Vec<f32>) -> Self {
        Self {
            values,
            model_version: None,
        }
    }

    /// Cosine similarity in [-1, 1]. Higher = more similar.
    ///
    /// Returns 0.0 when either vector has zero magnitude.
    pub fn similarity(&self, other: &Embedding) -> f32 {
        cosine_similarity(&self.values, &other.values)
    }

    /// Cosine distance (`1 - similarity`), in [0, 2].
    pub fn cosine_distance(&self, other: &Embedding) -> f32 {
        1.0 - self.similarity(other)
    }
}

impl From<Vec<f32>> for Embedding {
    fn from(values: Vec<f32>) -> Self {
        Self::new(values)
    }
}

/// Cosine similarity over raw slices. Always processes every dimension.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;

    for (x, y) in a.iter().zip(b.iter()) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom > 0.0 {
        dot / denom
    } else {
        0.0
    }
}

/// One enrolled face. An identity may own many records (one per photo).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnrollmentRecord {
    /// Fresh UUID, never derived from the label.
    pub record_id: String,
    pub identity_label: String,
    pub embedding: Embedding,
    /// Where the embedding came from (usually the image path).
    pub source_reference: String,
    pub enrolled_at: DateTime<Utc>,
}

impl EnrollmentRecord {
    pub fn new(identity_label: &str, embedding: Embedding, source_reference: &str) -> Self {
        Self {
            record_id: uuid::Uuid::new_v4().to_string(),
            identity_label: identity_label.to_string(),
            embedding,
            source_reference: source_reference.to_string(),
            enrolled_at: Utc::now(),
        }
    }

    /// Payload stored alongside the vector in the index.
    pub fn payload(&self) -> RecordPayload {
        RecordPayload {
            identity_label: self.identity_label.clone(),
            source_reference: self.source_reference.clone(),
            enrolled_at: self.enrolled_at,
        }
    }
}

/// Non-vector part of an enrollment record, as persisted by a `VectorIndex`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordPayload {
    pub identity_label: String,
    pub source_reference: String,
    pub enrolled_at: DateTime<Utc>,
}

/// Result of matching a query embedding against a collection.
#[derive(Debug, Clone, PartialEq)]
pub struct MatchResult {
    pub matched: bool,
    /// Label of the matched identity (if any).
    pub identity_label: Option<String>,
    /// ID of the matched record (if any).
    pub record_id: Option<String>,
    /// Similarity of the accepted candidate; 0.0 when not matched.
    pub score: f32,
    /// Best similarity observed when nothing cleared the threshold.
    /// Diagnostic only, never part of the decision.
    pub nearest: Option<f32>,
}

impl MatchResult {
    pub fn no_match(nearest: Option<f32>) -> Self {
        Self {
            matched: false,
            identity_label: None,
            record_id: None,
            score: 0.0,
            nearest,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cosine_similarity_identical() {
        let a = Embedding::new(vec![1.0, 0.0, 0.0]);
        let b = Embedding::new(vec![1.0, 0.0, 0.0]);
        assert!((a.similarity(&b) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_cosine_similarity_scale_invariant() {
        let a = Embedding::new(vec![1.0, 2.0, 3.0]);
        let b = Embedding::new(vec![2.0, 4.0, 6.0]);
        assert!((a.similarity(&b) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_cosine_similarity_orthogonal() {
        let a = Embedding::new(vec![1.0, 0.0]);
        let b = Embedding::new(vec![0.0, 1.0]);
        assert!(a.similarity(&b).abs() < 1e-6);
        assert!((a.cosine_distance(&b) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_cosine_similarity_opposite() {
        let a = Embedding::new(vec![1.0, 0.0]);
        let b = Embedding::new(vec![-1.0, 0.0]);
        assert!((a.similarity(&b) + 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_cosine_similarity_zero_vector() {
        let a = Embedding::new(vec![0.0, 0.0]);
        let b = Embedding::new(vec![1.0, 0.0]);
        assert_eq!(a.similarity(&b), 0.0);
    }

    #[test]
    fn test_record_ids_are_fresh() {
        let e = Embedding::new(vec![1.0, 0.0]);
        let a = EnrollmentRecord::new("alice", e.clone(), "a.jpg");
        let b = EnrollmentRecord::new("alice", e, "a.jpg");
        assert_ne!(a.record_id, b.record_id);
        assert_ne!(a.record_id, "alice");
    }

    #[test]
    fn test_payload_carries_label_and_source() {
        let r = EnrollmentRecord::new("bob", Embedding::new(vec![0.5]), "/photos/bob.png");
        let p = r.payload();
        assert_eq!(p.identity_label, "bob");
        assert_eq!(p.source_reference, "/photos/bob.png");
        assert_eq!(p.enrolled_at, r.enrolled_at);
    }
}
