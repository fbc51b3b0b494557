//! Service configuration. Every section has defaults; a partial file overrides
//! only the keys it names.

use crate::error::ConfigError;
use crate::risk::{
    DEFAULT_BLOCK_THRESHOLD, DEFAULT_ELEVATED_AMOUNT, DEFAULT_ELEVATED_PROBABILITY,
    DEFAULT_REVIEW_AMOUNT,
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    /// Schema and reference statistics
    pub artifacts: ArtifactsConfig,
    /// Scoring model artifact
    pub model: ModelConfig,
    /// Decision thresholds and amount guardrails
    pub decision: DecisionConfig,
    /// Request processing
    pub pipeline: PipelineConfig,
    /// Logging
    pub log: LogConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ArtifactsConfig {
    pub schema_path: PathBuf,
    /// Optional at runtime: absent file falls back to built-in defaults
    pub stats_path: PathBuf,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModelKind {
    /// ONNX graph run through ONNX Runtime
    Onnx,
    /// LightGBM JSON model dump, evaluated natively
    #[default]
    Trees,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    pub kind: ModelKind,
    pub path: PathBuf,
    /// Independent ONNX sessions; 0 means one per logical core
    pub workers: usize,
    /// Intra-op threads per ONNX session
    pub intra_threads: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DecisionConfig {
    /// Probability at or above this blocks the transaction (0.0–1.0)
    pub block_threshold: f64,
    /// Amount above this always requires manual review
    pub review_amount: f64,
    /// Amount above this requires review when probability exceeds `elevated_probability`
    pub elevated_amount: f64,
    pub elevated_probability: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Concurrent requests in streaming mode; 0 means one per logical core
    pub workers: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    pub level: String,
    pub json: bool,
}

impl Default for ArtifactsConfig {
    fn default() -> Self {
        Self {
            schema_path: PathBuf::from("artifacts/schema/schema.json"),
            stats_path: PathBuf::from("artifacts/schema/reference_stats.json"),
        }
    }
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            kind: ModelKind::Trees,
            path: PathBuf::from("artifacts/model.json"),
            workers: 0,
            intra_threads: 1,
        }
    }
}

impl Default for DecisionConfig {
    fn default() -> Self {
        Self {
            block_threshold: DEFAULT_BLOCK_THRESHOLD,
            review_amount: DEFAULT_REVIEW_AMOUNT,
            elevated_amount: DEFAULT_ELEVATED_AMOUNT,
            elevated_probability: DEFAULT_ELEVATED_PROBABILITY,
        }
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self { workers: 0 }
    }
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: true,
        }
    }
}

impl ServiceConfig {
    /// Load from a JSON file if present; otherwise return defaults.
    /// A file that exists but does not parse is an error.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let data = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&data).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }
}

/// Resolve a worker count, mapping 0 to the number of logical cores.
pub fn resolve_workers(configured: usize) -> usize {
    if configured > 0 {
        return configured;
    }
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn defaults() {
        let c = ServiceConfig::default();
        assert_eq!(c.decision.block_threshold, 0.474);
        assert_eq!(c.decision.review_amount, 100_000.0);
        assert_eq!(c.decision.elevated_amount, 2_000.0);
        assert_eq!(c.decision.elevated_probability, 0.10);
        assert_eq!(c.model.kind, ModelKind::Trees);
        assert!(c.log.json);
    }

    #[test]
    fn missing_file_yields_defaults() {
        let c = ServiceConfig::load(Path::new("nonexistent.json")).unwrap();
        assert_eq!(c.log.level, "info");
    }

    #[test]
    fn partial_file_overrides_named_keys() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(
            br#"{"decision": {"block_threshold": 0.6}, "model": {"kind": "onnx", "path": "m.onnx"}}"#,
        )
        .unwrap();
        let c = ServiceConfig::load(file.path()).unwrap();
        assert_eq!(c.decision.block_threshold, 0.6);
        assert_eq!(c.decision.review_amount, 100_000.0);
        assert_eq!(c.model.kind, ModelKind::Onnx);
        assert_eq!(c.model.path, PathBuf::from("m.onnx"));
        assert_eq!(c.model.intra_threads, 1);
    }

    #[test]
    fn malformed_file_is_an_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"{ not json").unwrap();
        assert!(matches!(
            ServiceConfig::load(file.path()),
            Err(ConfigError::Parse { .. })
        ));
    }

    #[test]
    fn zero_workers_resolve_to_cores() {
        assert_eq!(resolve_workers(3), 3);
        assert!(resolve_workers(0) >= 1);
    }
}
