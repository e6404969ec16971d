//! Face embedding extraction seam.
//!
//! The core never runs a model itself; it asks an [`EmbeddingProvider`] to turn
//! an image into zero or more embeddings, one per detected face.

use crate::types::Embedding;
use serde::Serialize;
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ProviderError {
    #[error("no face detected in {image}")]
    NoFaceDetected { image: String },
    #[error("cannot read image {image}: {reason}")]
    ImageUnreadable { image: String, reason: String },
    #[error("embedding inference failed: {0}")]
    Inference(String),
}

/// One detected face and its embedding.
#[derive(Debug, Clone)]
pub struct FaceEmbedding {
    pub embedding: Embedding,
    /// Detector confidence for this face, when the backend reports one.
    pub confidence: Option<f32>,
}

/// The model's own same/different decision for two images.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PairVerdict {
    pub matched: bool,
    /// Cosine distance between the two first-face embeddings.
    pub distance: f32,
    /// Model-intrinsic cutoff the distance was compared against.
    pub threshold: f32,
    pub model: String,
}

/// Maps an image to face embeddings.
pub trait EmbeddingProvider {
    /// Name of the underlying recognition model (e.g., "ArcFace").
    fn model_name(&self) -> &str;

    /// Cosine-distance cutoff at which two faces count as the same person.
    fn verification_threshold(&self) -> f32;

    /// Embed every face found in `image`, best detection first.
    ///
    /// With `strict`, zero faces is `ProviderError::NoFaceDetected`; otherwise
    /// it is an empty list.
    fn represent(&mut self, image: &Path, strict: bool) -> Result<Vec<FaceEmbedding>, ProviderError>;

    /// Same/different decision using the model's own distance cutoff.
    ///
    /// Both images are embedded strictly; the first face of each is compared.
    fn verify_pair(&mut self, image_a: &Path, image_b: &Path) -> Result<PairVerdict, ProviderError> {
        let a = first_face(self.represent(image_a, true)?, image_a)?;
        let b = first_face(self.represent(image_b, true)?, image_b)?;

        let distance = a.embedding.cosine_distance(&b.embedding);
        let threshold = self.verification_threshold();
        Ok(PairVerdict {
            matched: distance <= threshold,
            distance,
            threshold,
            model: self.model_name().to_string(),
        })
    }
}

/// Take the first face of a strict extraction. A provider that returns an
/// empty list despite `strict` is still treated as no-face.
pub fn first_face(faces: Vec<FaceEmbedding>, image: &Path) -> Result<FaceEmbedding, ProviderError> {
    faces
        .into_iter()
        .next()
        .ok_or_else(|| ProviderError::NoFaceDetected {
            image: image.display().to_string(),
        })
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use std::collections::HashMap;
    use std::path::PathBuf;

    /// Deterministic provider backed by a path → embeddings table.
    pub struct FakeProvider {
        faces: HashMap<PathBuf, Vec<Vec<f32>>>,
        pub calls: usize,
    }

    impl FakeProvider {
        pub fn new() -> Self {
            Self {
                faces: HashMap::new(),
                calls: 0,
            }
        }

        pub fn with_face(mut self, path: &str, values: Vec<f32>) -> Self {
            self.faces.entry(PathBuf::from(path)).or_default().push(values);
            self
        }

        pub fn with_no_face(mut self, path: &str) -> Self {
            self.faces.insert(PathBuf::from(path), Vec::new());
            self
        }
    }

    impl EmbeddingProvider for FakeProvider {
        fn model_name(&self) -> &str {
            "fake"
        }

        fn verification_threshold(&self) -> f32 {
            0.68
        }

        fn represent(&mut self, image: &Path, strict: bool) -> Result<Vec<FaceEmbedding>, ProviderError> {
            self.calls += 1;
            let Some(faces) = self.faces.get(image) else {
                return Err(ProviderError::ImageUnreadable {
                    image: image.display().to_string(),
                    reason: "no such file".into(),
                });
            };
            if strict && faces.is_empty() {
                return Err(ProviderError::NoFaceDetected {
                    image: image.display().to_string(),
                });
            }
            Ok(faces
                .iter()
                .map(|v| FaceEmbedding {
                    embedding: Embedding::new(v.clone()),
                    confidence: Some(0.9),
                })
                .collect())
        }
    }
}
