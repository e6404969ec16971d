//! facegate-core: identity matching over face embeddings.
//!
//! Enrollment, 1:N identification and 1:1 verification on top of an external
//! embedding provider and an external vector index, plus the adaptive
//! threshold calibration that decides what counts as a match.

pub mod context;
pub mod engine;
pub mod error;
pub mod index;
pub mod policy;
pub mod provider;
pub mod store;
pub mod types;

pub use context::{AuthContext, ContextError, ThresholdSource};
pub use engine::{
    AuthorizeReport, BatchSummary, CalibrationReport, EnrollResponse, IdentifyResponse,
    VerificationEngine, VerifyResponse,
};
pub use error::MatchError;
pub use index::{
    check_point, CollectionInfo, Distance, IndexError, Point, ScoredPoint, VectorIndex,
};
pub use policy::{Calibration, MatchPolicy};
pub use provider::{EmbeddingProvider, FaceEmbedding, PairVerdict, ProviderError};
pub use store::{BackendStatus, CollectionStats, IdentityStore};
pub use types::{Embedding, EnrollmentRecord, MatchResult, RecordPayload};
