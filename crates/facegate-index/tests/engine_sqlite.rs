//! Verification engine end to end over a file-backed SQLite index.

use facegate_core::{
    Embedding, EmbeddingProvider, FaceEmbedding, IdentityStore, IndexError, MatchPolicy,
    ProviderError, VerificationEngine,
};
use facegate_index::SqliteIndex;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

const MAIN: &str = "face_embeddings";
const AUTH: &str = "authorized_faces";

#[derive(Default)]
struct TableProvider {
    faces: HashMap<PathBuf, Vec<f32>>,
}

impl TableProvider {
    fn face(mut self, path: &str, values: [f32; 4]) -> Self {
        self.faces.insert(PathBuf::from(path), values.to_vec());
        self
    }
}

impl EmbeddingProvider for TableProvider {
    fn model_name(&self) -> &str {
        "table"
    }

    fn verification_threshold(&self) -> f32 {
        0.68
    }

    fn represent(&mut self, image: &Path, strict: bool) -> Result<Vec<FaceEmbedding>, ProviderError> {
        match self.faces.get(image) {
            Some(values) => Ok(vec![FaceEmbedding {
                embedding: Embedding::new(values.clone()),
                confidence: None,
            }]),
            None if strict => Err(ProviderError::NoFaceDetected {
                image: image.display().to_string(),
            }),
            None => Ok(Vec::new()),
        }
    }
}

fn provider() -> TableProvider {
    TableProvider::default()
        .face("alice_1.jpg", [1.0, 0.0, 0.0, 0.0])
        .face("alice_2.jpg", [0.95, 0.31, 0.0, 0.0])
        .face("alice_3.jpg", [0.97, 0.0, 0.24, 0.0])
        .face("alice_query.jpg", [0.98, 0.1, 0.1, 0.0])
        .face("bob_1.jpg", [0.0, 0.0, 0.0, 1.0])
        .face("carol_query.jpg", [0.0, 1.0, 0.0, 0.0])
}

fn open_engine(path: &Path) -> VerificationEngine<TableProvider, SqliteIndex> {
    let index = SqliteIndex::open(path).unwrap();
    let store = IdentityStore::new(index, 4, MatchPolicy::default());
    VerificationEngine::open(provider(), store, &[MAIN, AUTH]).unwrap()
}

#[test]
fn test_enroll_identify_and_persist() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("index.db");

    let mut engine = open_engine(&path);
    assert!(engine.enroll(Path::new("alice_1.jpg"), "alice", MAIN).success);
    assert!(engine.enroll(Path::new("bob_1.jpg"), "bob", MAIN).success);

    let failed = engine.enroll(Path::new("blank.jpg"), "nobody", MAIN);
    assert!(!failed.success);
    assert!(failed.message.starts_with("Enrollment error:"));

    let hit = engine.identify(Path::new("alice_query.jpg"), MAIN, None);
    assert!(hit.found);
    assert_eq!(hit.identity_label.as_deref(), Some("alice"));
    assert!(hit.score > 0.75);

    let miss = engine.identify(Path::new("carol_query.jpg"), MAIN, None);
    assert!(!miss.found);
    assert_eq!(miss.score, 0.0);
    assert!(miss.nearest.is_some());

    assert_eq!(engine.stats(MAIN).record_count, 2);
    engine.close().unwrap();

    // Records survive a close and reopen.
    let engine = open_engine(&path);
    assert_eq!(engine.stats(MAIN).record_count, 2);
    assert_eq!(engine.stats(AUTH).record_count, 0);
}

#[test]
fn test_one_live_handle_per_index_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("index.db");

    let engine = open_engine(&path);
    assert!(matches!(
        SqliteIndex::open(&path),
        Err(IndexError::Unavailable(_))
    ));

    engine.close().unwrap();
    let reopened = SqliteIndex::open(&path).unwrap();
    drop(reopened);
}

#[test]
fn test_calibrated_threshold_gates_authorized_lookup() {
    let dir = tempfile::tempdir().unwrap();
    let mut engine = open_engine(&dir.path().join("index.db"));

    let photos: Vec<PathBuf> = ["alice_1.jpg", "alice_2.jpg", "alice_3.jpg", "missing.jpg"]
        .iter()
        .map(PathBuf::from)
        .collect();
    let summary = engine.enroll_batch(photos.iter().map(|p| (p.as_path(), "alice")), AUTH);
    assert_eq!(summary.enrolled, 3);
    assert_eq!(summary.failed, 1);

    let report = engine.calibrate(&photos);
    assert!(report.calibration.is_adaptive());
    assert_eq!(report.used.len(), 3);
    assert_eq!(report.skipped, vec![PathBuf::from("missing.jpg")]);

    let threshold = report.calibration.threshold();
    assert!(threshold >= 0.5 && threshold < 0.95, "threshold = {threshold}");

    let hit = engine.identify(Path::new("alice_query.jpg"), AUTH, Some(threshold));
    assert!(hit.found);
    let miss = engine.identify(Path::new("bob_1.jpg"), AUTH, Some(threshold));
    assert!(!miss.found);
}

#[test]
fn test_clear_removes_collection_records() {
    let dir = tempfile::tempdir().unwrap();
    let mut engine = open_engine(&dir.path().join("index.db"));
    assert!(engine.enroll(Path::new("alice_1.jpg"), "alice", AUTH).success);

    assert!(engine.clear(AUTH).unwrap());
    assert_eq!(engine.stats(AUTH).record_count, 0);
    assert!(!engine.identify(Path::new("alice_query.jpg"), AUTH, None).found);

    // Enrolling recreates the collection.
    assert!(engine.enroll(Path::new("alice_2.jpg"), "alice", AUTH).success);
    assert_eq!(engine.stats(AUTH).record_count, 1);
}
