use facegate_core::context::AuthContext;
use facegate_core::policy::{
    DEFAULT_CALIBRATION_FLOOR, DEFAULT_CALIBRATION_MARGIN, DEFAULT_THRESHOLD,
};
use facegate_core::MatchPolicy;
use std::path::PathBuf;
use std::time::Duration;

/// CLI configuration, loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// Root for the index, models and authorization context.
    pub data_dir: PathBuf,
    /// SQLite file holding every collection.
    pub index_path: PathBuf,
    /// Directory containing det_10g.onnx and w600k_r50.onnx.
    pub model_dir: PathBuf,
    pub main_collection: String,
    pub auth_collection: String,
    pub embedding_dim: usize,
    /// Cosine similarity a query must reach when no threshold is given.
    pub default_threshold: f32,
    pub calibration_floor: f32,
    pub calibration_margin: f32,
    /// Cosine-distance cutoff for one-to-one verification.
    pub verify_threshold: f32,
    /// Holds the persisted authorization context.
    pub auth_dir: PathBuf,
    /// Pause between automatic scan attempts.
    pub scan_cooldown_ms: u64,
}

impl Config {
    /// Load configuration from `FACEGATE_*` environment variables with defaults.
    pub fn from_env() -> Self {
        let data_dir = std::env::var("FACEGATE_DATA_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| default_data_dir());

        let index_path = std::env::var("FACEGATE_INDEX_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|_| data_dir.join("index.db"));
        let model_dir = std::env::var("FACEGATE_MODEL_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| data_dir.join("models"));
        let auth_dir = std::env::var("FACEGATE_AUTH_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| data_dir.join("authorized"));

        Self {
            index_path,
            model_dir,
            auth_dir,
            main_collection: std::env::var("FACEGATE_MAIN_COLLECTION")
                .unwrap_or_else(|_| "face_embeddings".to_string()),
            auth_collection: std::env::var("FACEGATE_AUTH_COLLECTION")
                .unwrap_or_else(|_| "authorized_faces".to_string()),
            embedding_dim: env_usize("FACEGATE_EMBEDDING_DIM", 512),
            default_threshold: env_f32("FACEGATE_DEFAULT_THRESHOLD", DEFAULT_THRESHOLD),
            calibration_floor: env_f32("FACEGATE_CALIBRATION_FLOOR", DEFAULT_CALIBRATION_FLOOR),
            calibration_margin: env_f32("FACEGATE_CALIBRATION_MARGIN", DEFAULT_CALIBRATION_MARGIN),
            verify_threshold: env_f32(
                "FACEGATE_VERIFY_THRESHOLD",
                facegate_vision::DEFAULT_VERIFY_THRESHOLD,
            ),
            scan_cooldown_ms: env_u64("FACEGATE_SCAN_COOLDOWN_MS", 1500),
            data_dir,
        }
    }

    pub fn policy(&self) -> MatchPolicy {
        MatchPolicy {
            default_threshold: self.default_threshold,
            floor: self.calibration_floor,
            margin: self.calibration_margin,
        }
    }

    pub fn context_path(&self) -> PathBuf {
        AuthContext::path_in(&self.auth_dir)
    }

    pub fn scan_cooldown(&self) -> Duration {
        Duration::from_millis(self.scan_cooldown_ms)
    }

    /// Collection name for the `--authorized` switch.
    pub fn collection(&self, authorized: bool) -> &str {
        if authorized {
            &self.auth_collection
        } else {
            &self.main_collection
        }
    }
}

fn default_data_dir() -> PathBuf {
    std::env::var("XDG_DATA_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
            PathBuf::from(home).join(".local/share")
        })
        .join("facegate")
}

fn env_f32(key: &str, default: f32) -> f32 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn env_u64(key: &str, default: u64) -> u64 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn env_usize(key: &str, default: usize) -> usize {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}
