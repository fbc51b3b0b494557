//! Error types, one enum per concern.

use std::path::PathBuf;
use thiserror::Error;

/// Schema / reference-statistics artifact failures. Always fatal at startup.
#[derive(Debug, Error)]
pub enum ArtifactError {
    #[error("artifact not found: {}", path.display())]
    NotFound { path: PathBuf },
    #[error("failed to read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("malformed artifact: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("invalid schema: {0}")]
    InvalidSchema(String),
    #[error("invalid reference statistics: {0}")]
    InvalidStats(String),
}

/// Scoring model failures: load-time (fatal) or per record (`inference_failed`).
#[derive(Debug, Error)]
pub enum ScoreError {
    #[error("model artifact not found: {}", path.display())]
    ModelNotFound { path: PathBuf },
    #[error("failed to load model: {0}")]
    Load(String),
    #[error("inference failed: {0}")]
    Inference(String),
    #[error("feature '{0}' required by the model is missing from the feature vector")]
    MissingFeature(String),
    #[error("model returned invalid probability {0}")]
    InvalidProbability(f64),
}

/// Request envelope errors at the service boundary.
#[derive(Debug, Error)]
pub enum PredictError {
    #[error("request contains no records")]
    EmptyBatch,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("malformed config {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}
