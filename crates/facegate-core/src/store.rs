//! Identity store: enrollment records in named collections of a vector index.

use crate::error::MatchError;
use crate::index::{Distance, IndexError, Point, VectorIndex};
use crate::policy::MatchPolicy;
use crate::provider::{first_face, EmbeddingProvider};
use crate::types::{Embedding, EnrollmentRecord, MatchResult};
use serde::Serialize;
use std::path::Path;

/// Reachability of the backing index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendStatus {
    Online,
    Offline,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CollectionStats {
    pub collection: String,
    pub record_count: u64,
    pub status: BackendStatus,
    /// Why the backend is offline, if it is.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Owns the single live index handle. Dropping or [`close`](Self::close)-ing
/// the store releases it.
pub struct IdentityStore<I: VectorIndex> {
    index: I,
    dimension: usize,
    policy: MatchPolicy,
}

impl<I: VectorIndex> IdentityStore<I> {
    /// `dimension` is the embedding size collections are created with.
    pub fn new(index: I, dimension: usize, policy: MatchPolicy) -> Self {
        Self {
            index,
            dimension,
            policy,
        }
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    pub fn policy(&self) -> &MatchPolicy {
        &self.policy
    }

    pub fn index(&self) -> &I {
        &self.index
    }

    /// Create the collection if absent. An existing collection is left as is,
    /// even if its declared dimension differs.
    ///
    /// Returns whether the collection was created by this call.
    pub fn ensure_collection(
        &mut self,
        name: &str,
        dimension: usize,
        distance: Distance,
    ) -> Result<bool, MatchError> {
        if self.index.collection_exists(name)? {
            return Ok(false);
        }
        self.index.create_collection(name, dimension, distance)?;
        tracing::info!(collection = name, dimension, %distance, "collection created");
        Ok(true)
    }

    /// Embed `image` strictly and append a new record for `identity_label`.
    ///
    /// Only the first detected face is used. Nothing is written when no face
    /// is found.
    pub fn enroll<P: EmbeddingProvider + ?Sized>(
        &mut self,
        provider: &mut P,
        collection: &str,
        identity_label: &str,
        image: &Path,
    ) -> Result<EnrollmentRecord, MatchError> {
        let faces = provider.represent(image, true)?;
        if faces.len() > 1 {
            tracing::debug!(
                image = %image.display(),
                faces = faces.len(),
                "multiple faces detected; enrolling the first"
            );
        }
        let face = first_face(faces, image)?;
        self.enroll_embedding(
            collection,
            identity_label,
            face.embedding,
            &image.display().to_string(),
        )
    }

    /// Append a record for an already extracted embedding.
    pub fn enroll_embedding(
        &mut self,
        collection: &str,
        identity_label: &str,
        embedding: Embedding,
        source_reference: &str,
    ) -> Result<EnrollmentRecord, MatchError> {
        self.ensure_collection(collection, self.dimension, Distance::Cosine)?;

        let record = EnrollmentRecord::new(identity_label, embedding, source_reference);
        let point = Point {
            id: record.record_id.clone(),
            vector: record.embedding.values.clone(),
            payload: record.payload(),
        };
        self.index.upsert(collection, vec![point])?;

        tracing::info!(
            collection,
            record_id = %record.record_id,
            label = identity_label,
            source = source_reference,
            "record enrolled"
        );
        Ok(record)
    }

    /// Embed `image` leniently and look up the best record.
    ///
    /// A query image without a face is a plain non-match, not an error.
    pub fn query<P: EmbeddingProvider + ?Sized>(
        &self,
        provider: &mut P,
        collection: &str,
        image: &Path,
        threshold: f32,
    ) -> Result<MatchResult, MatchError> {
        let faces = provider.represent(image, false)?;
        let Some(face) = faces.into_iter().next() else {
            tracing::debug!(image = %image.display(), "no face in query image");
            return Ok(MatchResult::no_match(None));
        };
        self.query_embedding(collection, &face.embedding, threshold)
    }

    /// Top-1 lookup gated at `threshold`.
    ///
    /// On a miss, a second ungated top-1 lookup records the nearest score in
    /// [`MatchResult::nearest`].
    pub fn query_embedding(
        &self,
        collection: &str,
        embedding: &Embedding,
        threshold: f32,
    ) -> Result<MatchResult, MatchError> {
        let gated = self
            .index
            .query(collection, &embedding.values, 1, Some(threshold))?;

        if let Some(best) = gated.into_iter().next() {
            if self.policy.decide(best.score, threshold) {
                tracing::info!(
                    collection,
                    label = %best.payload.identity_label,
                    score = best.score,
                    threshold,
                    "identity matched"
                );
                return Ok(MatchResult {
                    matched: true,
                    identity_label: Some(best.payload.identity_label),
                    record_id: Some(best.id),
                    score: best.score,
                    nearest: None,
                });
            }
        }

        let nearest = self
            .index
            .query(collection, &embedding.values, 1, None)?
            .into_iter()
            .next();
        match &nearest {
            Some(hit) => tracing::info!(
                collection,
                closest = %hit.payload.identity_label,
                score = hit.score,
                needed = threshold,
                "no identity cleared threshold"
            ),
            None => tracing::info!(collection, "collection is empty"),
        }
        Ok(MatchResult::no_match(nearest.map(|hit| hit.score)))
    }

    /// Record count and backend reachability. Never fails.
    pub fn collection_stats(&self, collection: &str) -> CollectionStats {
        match self.index.collection_info(collection) {
            Ok(info) => CollectionStats {
                collection: collection.to_string(),
                record_count: info.points_count,
                status: BackendStatus::Online,
                error: None,
            },
            Err(IndexError::CollectionNotFound(_)) => CollectionStats {
                collection: collection.to_string(),
                record_count: 0,
                status: BackendStatus::Online,
                error: None,
            },
            Err(err) => {
                tracing::warn!(collection, error = %err, "index offline");
                CollectionStats {
                    collection: collection.to_string(),
                    record_count: 0,
                    status: BackendStatus::Offline,
                    error: Some(err.to_string()),
                }
            }
        }
    }

    /// Delete a collection and all its records.
    pub fn clear_collection(&mut self, collection: &str) -> Result<bool, MatchError> {
        let existed = self.index.delete_collection(collection)?;
        tracing::info!(collection, existed, "collection cleared");
        Ok(existed)
    }

    /// Release the index handle.
    pub fn close(self) -> Result<(), MatchError> {
        self.index.close()?;
        tracing::debug!("identity store closed");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::testing::MemoryIndex;
    use crate::provider::testing::FakeProvider;

    fn store() -> IdentityStore<MemoryIndex> {
        IdentityStore::new(MemoryIndex::default(), 2, MatchPolicy::default())
    }

    /// 2-d unit vector whose cosine with (1, 0) is `cos`.
    fn with_cos(cos: f32) -> Vec<f32> {
        vec![cos, (1.0 - cos * cos).sqrt()]
    }

    #[test]
    fn test_ensure_collection_idempotent() {
        let mut s = store();
        assert!(s.ensure_collection("main", 2, Distance::Cosine).unwrap());
        s.enroll_embedding("main", "alice", Embedding::new(vec![1.0, 0.0]), "a.jpg")
            .unwrap();
        assert!(!s.ensure_collection("main", 2, Distance::Cosine).unwrap());
        assert_eq!(s.index().creates, 1);
        assert_eq!(s.collection_stats("main").record_count, 1);
    }

    #[test]
    fn test_ensure_collection_ignores_dimension_of_existing() {
        let mut s = store();
        s.ensure_collection("main", 2, Distance::Cosine).unwrap();
        assert!(!s.ensure_collection("main", 512, Distance::Cosine).unwrap());
        assert_eq!(s.index().collection_info("main").unwrap().dimension, 2);
    }

    #[test]
    fn test_enroll_appends_never_merges() {
        let mut s = store();
        let mut p = FakeProvider::new()
            .with_face("a1.jpg", vec![1.0, 0.0])
            .with_face("a2.jpg", vec![0.9, 0.1]);
        let r1 = s.enroll(&mut p, "main", "alice", Path::new("a1.jpg")).unwrap();
        let r2 = s.enroll(&mut p, "main", "alice", Path::new("a2.jpg")).unwrap();
        assert_ne!(r1.record_id, r2.record_id);
        assert_eq!(r1.source_reference, "a1.jpg");
        assert_eq!(s.collection_stats("main").record_count, 2);
    }

    #[test]
    fn test_enroll_no_face_writes_nothing() {
        let mut s = store();
        s.ensure_collection("main", 2, Distance::Cosine).unwrap();
        let mut p = FakeProvider::new().with_no_face("blank.jpg");
        let err = s
            .enroll(&mut p, "main", "alice", Path::new("blank.jpg"))
            .unwrap_err();
        assert_eq!(
            err,
            MatchError::NoFaceDetected {
                image: "blank.jpg".into()
            }
        );
        assert_eq!(s.collection_stats("main").record_count, 0);
    }

    #[test]
    fn test_enroll_uses_first_face() {
        let mut s = store();
        let mut p = FakeProvider::new()
            .with_face("group.jpg", vec![1.0, 0.0])
            .with_face("group.jpg", vec![0.0, 1.0]);
        let r = s.enroll(&mut p, "main", "alice", Path::new("group.jpg")).unwrap();
        assert_eq!(r.embedding.values, vec![1.0, 0.0]);
    }

    #[test]
    fn test_enroll_then_query_same_image() {
        let mut s = store();
        let mut p = FakeProvider::new().with_face("a.jpg", vec![0.6, 0.8]);
        let r = s.enroll(&mut p, "main", "alice", Path::new("a.jpg")).unwrap();
        let m = s.query(&mut p, "main", Path::new("a.jpg"), 0.99).unwrap();
        assert!(m.matched);
        assert_eq!(m.identity_label.as_deref(), Some("alice"));
        assert_eq!(m.record_id.as_deref(), Some(r.record_id.as_str()));
        assert!(m.score >= 0.99 && m.score <= 1.0 + 1e-6);
    }

    #[test]
    fn test_query_alice_bob_scenario() {
        let mut s = store();
        // A = (1, 0); B at cos 0.2 from A; C at cos 0.9 from A.
        let a = vec![1.0, 0.0];
        let b = with_cos(0.2);
        s.enroll_embedding("main", "alice", Embedding::new(a), "a.jpg").unwrap();
        s.enroll_embedding("main", "bob", Embedding::new(b), "b.jpg").unwrap();

        let c = Embedding::new(with_cos(0.9));
        let m = s.query_embedding("main", &c, 0.75).unwrap();
        assert!(m.matched);
        assert_eq!(m.identity_label.as_deref(), Some("alice"));
        assert!((m.score - 0.9).abs() < 1e-5);

        let m = s.query_embedding("main", &c, 0.95).unwrap();
        assert!(!m.matched);
        assert_eq!(m.identity_label, None);
        assert_eq!(m.score, 0.0);
        let nearest = m.nearest.unwrap();
        assert!((nearest - 0.9).abs() < 1e-5);
    }

    #[test]
    fn test_query_empty_collection() {
        let mut s = store();
        s.ensure_collection("main", 2, Distance::Cosine).unwrap();
        let m = s
            .query_embedding("main", &Embedding::new(vec![1.0, 0.0]), 0.5)
            .unwrap();
        assert_eq!(m, MatchResult::no_match(None));
    }

    #[test]
    fn test_query_without_face_is_no_match() {
        let mut s = store();
        s.ensure_collection("main", 2, Distance::Cosine).unwrap();
        let mut p = FakeProvider::new().with_no_face("wall.jpg");
        let m = s.query(&mut p, "main", Path::new("wall.jpg"), 0.5).unwrap();
        assert!(!m.matched);
        assert_eq!(m.score, 0.0);
    }

    #[test]
    fn test_collections_are_isolated() {
        let mut s = store();
        s.enroll_embedding("main", "alice", Embedding::new(vec![1.0, 0.0]), "a.jpg")
            .unwrap();
        s.ensure_collection("authorized", 2, Distance::Cosine).unwrap();
        let m = s
            .query_embedding("authorized", &Embedding::new(vec![1.0, 0.0]), 0.5)
            .unwrap();
        assert!(!m.matched);
        assert_eq!(s.collection_stats("authorized").record_count, 0);
    }

    #[test]
    fn test_stats_offline_when_backend_down() {
        let mut s = store();
        s.ensure_collection("main", 2, Distance::Cosine).unwrap();
        s.index.offline = true;
        let stats = s.collection_stats("main");
        assert_eq!(stats.status, BackendStatus::Offline);
        assert_eq!(stats.record_count, 0);
        assert!(stats.error.is_some());
    }

    #[test]
    fn test_query_backend_down_is_error() {
        let mut s = store();
        s.ensure_collection("main", 2, Distance::Cosine).unwrap();
        s.index.offline = true;
        let err = s
            .query_embedding("main", &Embedding::new(vec![1.0, 0.0]), 0.5)
            .unwrap_err();
        assert!(matches!(err, MatchError::BackendUnavailable(_)));
    }

    #[test]
    fn test_clear_collection() {
        let mut s = store();
        s.enroll_embedding("main", "alice", Embedding::new(vec![1.0, 0.0]), "a.jpg")
            .unwrap();
        assert!(s.clear_collection("main").unwrap());
        assert!(!s.clear_collection("main").unwrap());
        assert_eq!(s.collection_stats("main").record_count, 0);
    }

    #[test]
    fn test_dimension_mismatch_surfaces_on_upsert() {
        let mut s = store();
        let err = s
            .enroll_embedding("main", "alice", Embedding::new(vec![1.0, 0.0, 0.0]), "a.jpg")
            .unwrap_err();
        assert!(matches!(err, MatchError::DimensionMismatch { expected: 2, actual: 3, .. }));
    }

    #[test]
    fn test_non_finite_embedding_is_refused_and_lookup_survives() {
        let mut s = store();
        s.enroll_embedding("main", "alice", Embedding::new(vec![1.0, 0.0]), "a.jpg")
            .unwrap();
        let err = s
            .enroll_embedding("main", "mallory", Embedding::new(vec![f32::NAN, 0.0]), "m.jpg")
            .unwrap_err();
        assert!(matches!(err, MatchError::NonFiniteEmbedding { .. }));
        assert_eq!(s.collection_stats("main").record_count, 1);

        let mut p = FakeProvider::new().with_face("q.jpg", with_cos(0.9));
        let m = s.query(&mut p, "main", Path::new("q.jpg"), 0.75).unwrap();
        assert!(m.matched);
        assert_eq!(m.identity_label.as_deref(), Some("alice"));
    }
}
