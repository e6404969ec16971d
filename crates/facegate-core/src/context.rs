//! Persisted authorization context: the authorized identity's label and its
//! acceptance threshold.
//!
//! Stored as a small TOML file, rewritten wholesale through a temporary
//! sibling and a rename so readers never observe a half-written value.

use crate::policy::{Calibration, DEFAULT_THRESHOLD};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

pub const DEFAULT_IDENTITY_LABEL: &str = "Authorized User";
pub const CONTEXT_FILE_NAME: &str = "context.toml";

#[derive(Error, Debug)]
pub enum ContextError {
    #[error("context io error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("malformed context file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("cannot serialize context: {0}")]
    Serialize(#[from] toml::ser::Error),
}

/// Where the stored threshold came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ThresholdSource {
    Default,
    Adaptive,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuthContext {
    pub identity_label: String,
    pub threshold: f32,
    pub source: ThresholdSource,
    /// Photos the threshold was calibrated over.
    #[serde(default)]
    pub sample_count: usize,
    pub updated_at: DateTime<Utc>,
}

impl Default for AuthContext {
    fn default() -> Self {
        Self {
            identity_label: DEFAULT_IDENTITY_LABEL.to_string(),
            threshold: DEFAULT_THRESHOLD,
            source: ThresholdSource::Default,
            sample_count: 0,
            updated_at: Utc::now(),
        }
    }
}

impl AuthContext {
    pub fn new(identity_label: &str) -> Self {
        Self {
            identity_label: identity_label.to_string(),
            ..Self::default()
        }
    }

    /// Replace the threshold with a fresh calibration result.
    pub fn apply(&mut self, calibration: &Calibration) {
        self.threshold = calibration.threshold();
        self.source = if calibration.is_adaptive() {
            ThresholdSource::Adaptive
        } else {
            ThresholdSource::Default
        };
        self.sample_count = calibration.samples();
        self.updated_at = Utc::now();
    }

    /// Path of the context file inside an authorization directory.
    pub fn path_in(dir: &Path) -> PathBuf {
        dir.join(CONTEXT_FILE_NAME)
    }

    /// Load the context at `path`, or `None` if no file exists yet.
    pub fn load(path: &Path) -> Result<Option<Self>, ContextError> {
        let text = match std::fs::read_to_string(path) {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(source) => {
                return Err(ContextError::Io {
                    path: path.to_path_buf(),
                    source,
                })
            }
        };
        let ctx = toml::from_str(&text).map_err(|source| ContextError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(Some(ctx))
    }

    /// Like [`load`](Self::load) but falls back to defaults when the file is
    /// missing or unreadable.
    pub fn load_or_default(path: &Path) -> Self {
        match Self::load(path) {
            Ok(Some(ctx)) => {
                tracing::info!(
                    path = %path.display(),
                    label = %ctx.identity_label,
                    threshold = ctx.threshold,
                    "authorization context loaded"
                );
                ctx
            }
            Ok(None) => {
                tracing::info!(path = %path.display(), "no authorization context; using defaults");
                Self::default()
            }
            Err(err) => {
                tracing::warn!(error = %err, "authorization context unreadable; using defaults");
                Self::default()
            }
        }
    }

    /// Write through a temporary sibling, then rename over `path`.
    pub fn save(&self, path: &Path) -> Result<(), ContextError> {
        let io_err = |source| ContextError::Io {
            path: path.to_path_buf(),
            source,
        };
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(io_err)?;
        }
        let text = toml::to_string(self)?;
        let tmp = path.with_extension("toml.tmp");
        std::fs::write(&tmp, text).map_err(io_err)?;
        std::fs::rename(&tmp, path).map_err(io_err)?;
        tracing::info!(
            path = %path.display(),
            threshold = self.threshold,
            source = ?self.source,
            "authorization context saved"
        );
        Ok(())
    }
}
