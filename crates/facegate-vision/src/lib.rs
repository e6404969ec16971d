//! ONNX face pipeline: SCRFD detection, landmark alignment and ArcFace
//! embedding, exposed to the core as an [`EmbeddingProvider`].

pub mod alignment;
pub mod detector;
pub mod recognizer;

pub use detector::{DetectorError, FaceBox, FaceDetector};
pub use recognizer::{FaceRecognizer, RecognizerError};

use facegate_core::{EmbeddingProvider, FaceEmbedding, ProviderError};
use image::RgbImage;
use std::path::Path;
use thiserror::Error;

pub const DETECTOR_MODEL_FILE: &str = "det_10g.onnx";
pub const RECOGNIZER_MODEL_FILE: &str = "w600k_r50.onnx";
pub const MODEL_NAME: &str = "ArcFace";
/// ArcFace cosine-distance cutoff for the same-person decision.
pub const DEFAULT_VERIFY_THRESHOLD: f32 = 0.68;

#[derive(Error, Debug)]
pub enum VisionError {
    #[error(transparent)]
    Detector(#[from] DetectorError),
    #[error(transparent)]
    Recognizer(#[from] RecognizerError),
}

impl From<VisionError> for ProviderError {
    fn from(err: VisionError) -> Self {
        ProviderError::Inference(err.to_string())
    }
}

/// Detector + recognizer pair behind the core's provider seam.
pub struct ArcFaceProvider {
    detector: FaceDetector,
    recognizer: FaceRecognizer,
    verify_threshold: f32,
}

impl ArcFaceProvider {
    /// Load both models from `model_dir`.
    pub fn load(model_dir: &Path, verify_threshold: f32) -> Result<Self, VisionError> {
        let detector = FaceDetector::load(&model_dir.join(DETECTOR_MODEL_FILE))?;
        let recognizer = FaceRecognizer::load(&model_dir.join(RECOGNIZER_MODEL_FILE))?;
        tracing::info!(dir = %model_dir.display(), verify_threshold, "face models ready");
        Ok(Self {
            detector,
            recognizer,
            verify_threshold,
        })
    }

    /// Detect, align and embed every face in an in-memory image.
    pub fn embed_faces(&mut self, image: &RgbImage) -> Result<Vec<FaceEmbedding>, VisionError> {
        let faces = self.detector.detect(image)?;
        let mut out = Vec::with_capacity(faces.len());
        for face in faces {
            let Some(landmarks) = face.landmarks.as_ref() else {
                tracing::debug!(confidence = face.confidence, "face without landmarks skipped");
                continue;
            };
            let aligned = alignment::align_face(image, landmarks);
            let embedding = self.recognizer.embed(&aligned)?;
            out.push(FaceEmbedding {
                embedding,
                confidence: Some(face.confidence),
            });
        }
        Ok(out)
    }
}

impl EmbeddingProvider for ArcFaceProvider {
    fn model_name(&self) -> &str {
        MODEL_NAME
    }

    fn verification_threshold(&self) -> f32 {
        self.verify_threshold
    }

    fn represent(&mut self, image: &Path, strict: bool) -> Result<Vec<FaceEmbedding>, ProviderError> {
        let decoded = load_rgb(image)?;
        let faces = self.embed_faces(&decoded)?;
        tracing::debug!(image = %image.display(), faces = faces.len(), "represent");
        if strict && faces.is_empty() {
            return Err(ProviderError::NoFaceDetected {
                image: image.display().to_string(),
            });
        }
        Ok(faces)
    }
}

fn load_rgb(path: &Path) -> Result<RgbImage, ProviderError> {
    image::open(path)
        .map(|img| img.to_rgb8())
        .map_err(|e| ProviderError::ImageUnreadable {
            image: path.display().to_string(),
            reason: e.to_string(),
        })
}
