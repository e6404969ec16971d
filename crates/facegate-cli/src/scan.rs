//! Automatic scan loop over a drop directory.

use crate::ingest::list_images;
use crate::worker::{WorkerError, WorkerHandle};
use facegate_core::IdentifyResponse;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

const POLL_INTERVAL: Duration = Duration::from_millis(250);

pub struct ScanOptions {
    pub collection: String,
    pub threshold: Option<f32>,
    /// Pause after every unsuccessful attempt.
    pub cooldown: Duration,
    /// Also try images already present when the scan starts.
    pub include_existing: bool,
}

/// A successful scan: the matching image and the identify response.
#[derive(Debug)]
pub struct ScanHit {
    pub image: PathBuf,
    pub response: IdentifyResponse,
}

/// Poll `dir` for new images and identify each in arrival order until one
/// matches. Attempts are awaited one at a time.
pub async fn run_scan(
    worker: &WorkerHandle,
    dir: &Path,
    options: &ScanOptions,
) -> Result<ScanHit, WorkerError> {
    let mut seen: HashSet<PathBuf> = HashSet::new();
    if !options.include_existing {
        seen.extend(pending(dir));
    }
    tracing::info!(
        dir = %dir.display(),
        collection = %options.collection,
        threshold = ?options.threshold,
        skipped_existing = seen.len(),
        "scan started"
    );

    let mut ticker = tokio::time::interval(POLL_INTERVAL);
    loop {
        ticker.tick().await;
        for image in pending(dir) {
            if !seen.insert(image.clone()) {
                continue;
            }
            let response = worker
                .identify(image.clone(), &options.collection, options.threshold)
                .await?;
            if response.found {
                tracing::info!(
                    image = %image.display(),
                    label = ?response.identity_label,
                    score = response.score,
                    "scan matched"
                );
                return Ok(ScanHit { image, response });
            }
            tracing::info!(
                image = %image.display(),
                nearest = ?response.nearest,
                error = ?response.error,
                "scan attempt rejected"
            );
            tokio::time::sleep(options.cooldown).await;
        }
    }
}

/// Images currently in `dir`; an unreadable directory counts as empty.
fn pending(dir: &Path) -> Vec<PathBuf> {
    match list_images(dir) {
        Ok(images) => images,
        Err(err) => {
            tracing::warn!(dir = %dir.display(), error = %err, "scan directory unreadable");
            Vec::new()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::worker::spawn_worker;
    use crate::worker::testing::StubProvider;
    use facegate_core::{IdentityStore, MatchPolicy, VerificationEngine};
    use facegate_index::SqliteIndex;

    const AUTH: &str = "authorized_faces";

    fn options(include_existing: bool) -> ScanOptions {
        ScanOptions {
            collection: AUTH.to_string(),
            threshold: None,
            cooldown: Duration::from_millis(10),
            include_existing,
        }
    }

    fn worker() -> WorkerHandle {
        let provider = StubProvider::default()
            .with_face("owner.jpg", vec![0.0, 1.0, 0.0])
            .with_face("owner-again.jpg", vec![0.05, 1.0, 0.0])
            .with_face("stranger.jpg", vec![1.0, 0.0, 0.0]);
        let store = IdentityStore::new(SqliteIndex::open_in_memory().unwrap(), 3, MatchPolicy::default());
        let mut engine = VerificationEngine::open(provider, store, &[AUTH]).unwrap();
        assert!(engine.enroll(Path::new("owner.jpg"), "Owner", AUTH).success);
        spawn_worker(engine).unwrap()
    }

    #[tokio::test]
    async fn test_scan_stops_on_first_match() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("stranger.jpg"), b"").unwrap();
        std::fs::write(dir.path().join("owner-again.jpg"), b"").unwrap();

        let hit = run_scan(&worker(), dir.path(), &options(true)).await.unwrap();
        assert!(hit.image.ends_with("owner-again.jpg"));
        assert!(hit.response.found);
        assert_eq!(hit.response.identity_label.as_deref(), Some("Owner"));
    }

    #[tokio::test]
    async fn test_scan_waits_for_new_files() {
        let dir = tempfile::tempdir().unwrap();
        // Present before the scan starts, so ignored.
        std::fs::write(dir.path().join("owner.jpg"), b"").unwrap();

        let drop_dir = dir.path().to_path_buf();
        let dropper = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(400)).await;
            std::fs::write(drop_dir.join("stranger.jpg"), b"").unwrap();
            tokio::time::sleep(Duration::from_millis(400)).await;
            std::fs::write(drop_dir.join("owner-again.jpg"), b"").unwrap();
        });

        let hit = tokio::time::timeout(
            Duration::from_secs(10),
            run_scan(&worker(), dir.path(), &options(false)),
        )
        .await
        .unwrap()
        .unwrap();
        assert!(hit.image.ends_with("owner-again.jpg"));
        dropper.await.unwrap();
    }
}
