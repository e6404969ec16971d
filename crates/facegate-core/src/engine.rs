//! Verification engine: enroll, identify and verify-pair over an embedding
//! provider and an identity store.
//!
//! Every public operation returns a structured response; extraction and index
//! failures are folded into it instead of propagating. The `try_*` variants
//! keep the typed [`MatchError`] for callers that want it.

use crate::error::MatchError;
use crate::index::{Distance, VectorIndex};
use crate::policy::{Calibration, MatchPolicy};
use crate::provider::{first_face, EmbeddingProvider, PairVerdict};
use crate::store::{CollectionStats, IdentityStore};
use crate::types::{Embedding, EnrollmentRecord, MatchResult};
use serde::Serialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EnrollResponse {
    pub success: bool,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub record_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IdentifyResponse {
    pub found: bool,
    pub identity_label: Option<String>,
    pub score: f32,
    /// Closest score seen on a miss.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub nearest: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VerifyResponse {
    pub matched: bool,
    pub distance: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub threshold: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Totals of a batch enrollment.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct BatchSummary {
    pub enrolled: usize,
    pub failed: usize,
    /// (source, reason) per failed item.
    pub failures: Vec<(String, String)>,
}

/// Calibration plus which photos contributed to it.
#[derive(Debug, Clone, PartialEq)]
pub struct CalibrationReport {
    pub calibration: Calibration,
    pub used: Vec<PathBuf>,
    pub skipped: Vec<PathBuf>,
}

/// Outcome of replacing an identity's enrollment set.
#[derive(Debug, Clone, PartialEq)]
pub struct AuthorizeReport {
    pub summary: BatchSummary,
    pub calibration: CalibrationReport,
}

pub struct VerificationEngine<P: EmbeddingProvider, I: VectorIndex> {
    provider: P,
    store: IdentityStore<I>,
    default_threshold: f32,
}

impl<P: EmbeddingProvider, I: VectorIndex> VerificationEngine<P, I> {
    /// Build an engine and make sure each of `collections` exists.
    pub fn open(
        provider: P,
        mut store: IdentityStore<I>,
        collections: &[&str],
    ) -> Result<Self, MatchError> {
        let dimension = store.dimension();
        for name in collections {
            store.ensure_collection(name, dimension, Distance::Cosine)?;
        }
        let default_threshold = store.policy().default_threshold;
        tracing::info!(
            model = provider.model_name(),
            dimension,
            default_threshold,
            "verification engine ready"
        );
        Ok(Self {
            provider,
            store,
            default_threshold,
        })
    }

    pub fn store(&self) -> &IdentityStore<I> {
        &self.store
    }

    pub fn policy(&self) -> &MatchPolicy {
        self.store.policy()
    }

    pub fn try_enroll(
        &mut self,
        image: &Path,
        identity_label: &str,
        collection: &str,
    ) -> Result<EnrollmentRecord, MatchError> {
        self.store
            .enroll(&mut self.provider, collection, identity_label, image)
    }

    pub fn enroll(&mut self, image: &Path, identity_label: &str, collection: &str) -> EnrollResponse {
        match self.try_enroll(image, identity_label, collection) {
            Ok(record) => EnrollResponse {
                success: true,
                message: format!("User {identity_label} enrolled successfully."),
                record_id: Some(record.record_id),
            },
            Err(err) => {
                tracing::warn!(image = %image.display(), label = identity_label, error = %err, "enrollment failed");
                EnrollResponse {
                    success: false,
                    message: format!("Enrollment error: {err}"),
                    record_id: None,
                }
            }
        }
    }

    /// Enroll every `(image, label)` pair; one failure never stops the batch.
    pub fn enroll_batch<'a>(
        &mut self,
        items: impl IntoIterator<Item = (&'a Path, &'a str)>,
        collection: &str,
    ) -> BatchSummary {
        let mut summary = BatchSummary::default();
        for (image, label) in items {
            match self.try_enroll(image, label, collection) {
                Ok(_) => summary.enrolled += 1,
                Err(err) => {
                    tracing::warn!(image = %image.display(), label, error = %err, "batch item failed");
                    summary.failed += 1;
                    summary
                        .failures
                        .push((image.display().to_string(), err.to_string()));
                }
            }
        }
        tracing::info!(
            collection,
            enrolled = summary.enrolled,
            failed = summary.failed,
            "batch enrollment finished"
        );
        summary
    }

    pub fn try_identify(
        &mut self,
        image: &Path,
        collection: &str,
        threshold: Option<f32>,
    ) -> Result<MatchResult, MatchError> {
        let threshold = threshold.unwrap_or(self.default_threshold);
        self.store
            .query(&mut self.provider, collection, image, threshold)
    }

    /// 1:N lookup. Backend and extraction failures degrade to "not found".
    pub fn identify(
        &mut self,
        image: &Path,
        collection: &str,
        threshold: Option<f32>,
    ) -> IdentifyResponse {
        match self.try_identify(image, collection, threshold) {
            Ok(m) => IdentifyResponse {
                found: m.matched,
                identity_label: m.identity_label,
                score: m.score,
                nearest: m.nearest,
                error: None,
            },
            Err(err) => {
                tracing::warn!(image = %image.display(), collection, error = %err, "identification failed");
                IdentifyResponse {
                    found: false,
                    identity_label: None,
                    score: 0.0,
                    nearest: None,
                    error: Some(err.to_string()),
                }
            }
        }
    }

    /// 1:1 comparison using the model's own cutoff. Never touches the index.
    pub fn try_verify(&mut self, image_a: &Path, image_b: &Path) -> Result<PairVerdict, MatchError> {
        Ok(self.provider.verify_pair(image_a, image_b)?)
    }

    pub fn verify(&mut self, image_a: &Path, image_b: &Path) -> VerifyResponse {
        match self.try_verify(image_a, image_b) {
            Ok(v) => VerifyResponse {
                matched: v.matched,
                distance: v.distance,
                threshold: Some(v.threshold),
                model: Some(v.model),
                error: None,
            },
            Err(err) => VerifyResponse {
                matched: false,
                distance: 0.0,
                threshold: None,
                model: None,
                error: Some(err.to_string()),
            },
        }
    }

    pub fn stats(&self, collection: &str) -> CollectionStats {
        self.store.collection_stats(collection)
    }

    /// Recompute the adaptive threshold over `images`, all of one identity.
    ///
    /// Images are embedded leniently; photos without a usable face are
    /// skipped rather than failing the calibration.
    pub fn calibrate(&mut self, images: &[PathBuf]) -> CalibrationReport {
        let mut embeddings: Vec<Embedding> = Vec::with_capacity(images.len());
        let mut used = Vec::new();
        let mut skipped = Vec::new();

        for image in images {
            match self.provider.represent(image, false) {
                Ok(faces) => match faces.into_iter().next() {
                    Some(face) => {
                        embeddings.push(face.embedding);
                        used.push(image.clone());
                    }
                    None => {
                        tracing::debug!(image = %image.display(), "calibration: no face, skipped");
                        skipped.push(image.clone());
                    }
                },
                Err(err) => {
                    tracing::warn!(image = %image.display(), error = %err, "calibration: extraction failed, skipped");
                    skipped.push(image.clone());
                }
            }
        }

        CalibrationReport {
            calibration: self.store.policy().recalibrate(&embeddings),
            used,
            skipped,
        }
    }

    /// Replace `collection` with one record per photo of `identity_label`
    /// and calibrate over the same embeddings.
    ///
    /// The collection is cleared first so re-running over the same photos
    /// does not stack duplicates. Each photo is embedded once.
    pub fn authorize(
        &mut self,
        images: &[PathBuf],
        identity_label: &str,
        collection: &str,
    ) -> Result<AuthorizeReport, MatchError> {
        let cleared = self.store.clear_collection(collection)?;
        tracing::info!(collection, cleared, photos = images.len(), "re-enrolling authorized user");

        let mut summary = BatchSummary::default();
        let mut embeddings: Vec<Embedding> = Vec::with_capacity(images.len());
        let mut used = Vec::new();
        let mut skipped = Vec::new();

        for image in images {
            let enrolled = self
                .provider
                .represent(image, true)
                .map_err(MatchError::from)
                .and_then(|faces| Ok(first_face(faces, image)?))
                .and_then(|face| {
                    self.store
                        .enroll_embedding(
                            collection,
                            identity_label,
                            face.embedding,
                            &image.display().to_string(),
                        )
                        .map(|record| record.embedding)
                });
            match enrolled {
                Ok(embedding) => {
                    summary.enrolled += 1;
                    embeddings.push(embedding);
                    used.push(image.clone());
                }
                Err(err) => {
                    tracing::warn!(image = %image.display(), label = identity_label, error = %err, "authorize: photo skipped");
                    summary.failed += 1;
                    summary
                        .failures
                        .push((image.display().to_string(), err.to_string()));
                    skipped.push(image.clone());
                }
            }
        }

        Ok(AuthorizeReport {
            summary,
            calibration: CalibrationReport {
                calibration: self.store.policy().recalibrate(&embeddings),
                used,
                skipped,
            },
        })
    }

    pub fn clear(&mut self, collection: &str) -> Result<bool, MatchError> {
        self.store.clear_collection(collection)
    }

    /// Release the index handle, handing the provider back for reuse.
    pub fn close(self) -> Result<P, MatchError> {
        self.store.close()?;
        Ok(self.provider)
    }
}
