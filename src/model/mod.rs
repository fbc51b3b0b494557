//! Scoring model boundary. The pipeline only sees [`ScoringModel::score`];
//! two backends implement it: a native LightGBM tree-dump evaluator and an
//! ONNX Runtime session pool.

mod onnx;
mod trees;

pub use onnx::OnnxScorer;
pub use trees::TreeEnsemble;

use crate::config::{resolve_workers, ModelConfig, ModelKind};
use crate::error::ScoreError;
use crate::features::FeatureVector;
use std::sync::Arc;

/// Opaque trained classifier. Must tolerate concurrent calls.
pub trait ScoringModel: Send + Sync {
    /// Probability of the positive (fraud) class.
    fn score(&self, features: &FeatureVector) -> Result<f64, ScoreError>;

    /// Short human-readable description for logs and health output.
    fn describe(&self) -> String;
}

impl<M: ScoringModel + ?Sized> ScoringModel for Arc<M> {
    fn score(&self, features: &FeatureVector) -> Result<f64, ScoreError> {
        (**self).score(features)
    }

    fn describe(&self) -> String {
        (**self).describe()
    }
}

/// Load the configured backend. Any failure here is fatal at startup.
pub fn load(config: &ModelConfig) -> Result<Arc<dyn ScoringModel>, ScoreError> {
    match config.kind {
        ModelKind::Trees => Ok(Arc::new(TreeEnsemble::load(&config.path)?)),
        ModelKind::Onnx => Ok(Arc::new(OnnxScorer::load(
            &config.path,
            resolve_workers(config.workers),
            config.intra_threads.max(1),
        )?)),
    }
}

/// Reject anything a caller could mistake for a real probability.
pub fn checked_probability(probability: f64) -> Result<f64, ScoreError> {
    if probability.is_finite() && (0.0..=1.0).contains(&probability) {
        Ok(probability)
    } else {
        Err(ScoreError::InvalidProbability(probability))
    }
}
