use crate::index::IndexError;
use crate::provider::ProviderError;
use thiserror::Error;

/// Failure of a public matching operation.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum MatchError {
    #[error("no face detected in {image}")]
    NoFaceDetected { image: String },
    #[error("backend unavailable: {0}")]
    BackendUnavailable(String),
    #[error("collection not found: {0}")]
    CollectionNotFound(String),
    #[error("dimension mismatch in collection {collection}: expected {expected}, got {actual}")]
    DimensionMismatch {
        collection: String,
        expected: usize,
        actual: usize,
    },
    #[error("embedding for {record_id} in collection {collection} has non-finite values")]
    NonFiniteEmbedding {
        collection: String,
        record_id: String,
    },
    #[error("embedding extraction failed: {0}")]
    Extraction(String),
    /// Index reachable but the operation failed (corrupt row, constraint).
    #[error("index storage error: {0}")]
    Storage(String),
}

impl From<ProviderError> for MatchError {
    fn from(err: ProviderError) -> Self {
        match err {
            ProviderError::NoFaceDetected { image } => MatchError::NoFaceDetected { image },
            other => MatchError::Extraction(other.to_string()),
        }
    }
}

impl From<IndexError> for MatchError {
    fn from(err: IndexError) -> Self {
        match err {
            IndexError::CollectionNotFound(name) => MatchError::CollectionNotFound(name),
            IndexError::DimensionMismatch {
                collection,
                expected,
                actual,
            } => MatchError::DimensionMismatch {
                collection,
                expected,
                actual,
            },
            IndexError::NonFiniteVector { collection, id } => MatchError::NonFiniteEmbedding {
                collection,
                record_id: id,
            },
            IndexError::Unavailable(msg) => MatchError::BackendUnavailable(msg),
            IndexError::Storage(msg) => MatchError::Storage(msg),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_face_keeps_image_name() {
        let err: MatchError = ProviderError::NoFaceDetected {
            image: "selfie.jpg".into(),
        }
        .into();
        assert_eq!(err.to_string(), "no face detected in selfie.jpg");
    }

    #[test]
    fn test_lock_contention_is_backend_unavailable() {
        let err: MatchError = IndexError::Unavailable("database is locked".into()).into();
        assert!(matches!(err, MatchError::BackendUnavailable(_)));
    }

    #[test]
    fn test_storage_fault_is_not_reported_as_unavailable() {
        let err: MatchError = IndexError::Storage("payload decode for x: eof".into()).into();
        assert!(matches!(err, MatchError::Storage(_)));
        assert_eq!(err.to_string(), "index storage error: payload decode for x: eof");
    }

    #[test]
    fn test_non_finite_vector_keeps_record_id() {
        let err: MatchError = IndexError::NonFiniteVector {
            collection: "main".into(),
            id: "r1".into(),
        }
        .into();
        assert!(matches!(
            err,
            MatchError::NonFiniteEmbedding { ref record_id, .. } if record_id == "r1"
        ));
    }

    #[test]
    fn test_unreadable_image_is_extraction_failure() {
        let err: MatchError = ProviderError::ImageUnreadable {
            image: "x.png".into(),
            reason: "truncated".into(),
        }
        .into();
        assert!(matches!(err, MatchError::Extraction(ref m) if m.contains("truncated")));
    }
}
