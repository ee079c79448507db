use std::path::{Path, PathBuf};
use thiserror::Error;

/// Central error type for the whole provisioning pipeline.
/// Every module returns `Result<T, PipelineError>`.
#[derive(Debug, Error)]
pub enum PipelineError {
    // ── Resolution ──────────────────────────────────────
    #[error("Version {version} not found in any configured manifest source")]
    NotFound { version: String },

    // ── Integrity ───────────────────────────────────────
    #[error("Digest mismatch for {path:?}: expected {expected}, got {actual}")]
    Integrity {
        path: PathBuf,
        expected: String,
        actual: String,
    },

    // ── Configuration ───────────────────────────────────
    #[error("Unsupported configuration: {0}")]
    UnsupportedConfiguration(String),

    // ── Transforms ──────────────────────────────────────
    #[error("{stage} failed: {reason}")]
    Transform { stage: &'static str, reason: String },

    #[error("Invalid class file: {0}")]
    ClassFormat(String),

    #[error("Mappings error: {0}")]
    Mappings(String),

    #[error("Access rule error in {source_name}: line {line}: {reason}")]
    AccessRule {
        source_name: String,
        line: usize,
        reason: String,
    },

    // ── Cache ───────────────────────────────────────────
    #[error("Cache corrupted at {path:?}: {reason}")]
    CacheCorruption { path: PathBuf, reason: String },

    // ── IO ──────────────────────────────────────────────
    #[error("IO error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    // ── Network ─────────────────────────────────────────
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Download failed for {url}: HTTP {status}")]
    DownloadFailed { url: String, status: u16 },

    #[error("Offline mode: {url} is not cached")]
    Offline { url: String },

    // ── Serialization ───────────────────────────────────
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("POM write error: {0}")]
    PomWrite(String),

    // ── Archive ─────────────────────────────────────────
    #[error("Zip error: {0}")]
    Zip(#[from] zip::result::ZipError),
}

/// Convenience alias used throughout the crate.
pub type PipelineResult<T> = Result<T, PipelineError>;

impl From<std::io::Error> for PipelineError {
    fn from(source: std::io::Error) -> Self {
        PipelineError::Io {
            path: PathBuf::new(),
            source,
        }
    }
}

impl PipelineError {
    pub fn io(path: impl AsRef<Path>, source: std::io::Error) -> Self {
        PipelineError::Io {
            path: path.as_ref().to_path_buf(),
            source,
        }
    }

    pub fn transform(stage: &'static str, reason: impl std::fmt::Display) -> Self {
        PipelineError::Transform {
            stage,
            reason: reason.to_string(),
        }
    }

    /// Wraps any error raised inside an archive transform so callers see a
    /// single `Transform` failure naming the stage.
    pub fn into_transform(self, stage: &'static str) -> Self {
        match self {
            PipelineError::Transform { .. } => self,
            other => PipelineError::transform(stage, other),
        }
    }
}
