//! Transaction risk scorer: real-time feature transformation, GBDT scoring,
//! and rule-based decisions.
//!
//! Modular structure:
//! - [`record`]: Raw transaction records with typed field access
//! - [`artifacts`]: Feature schema and reference statistics, loaded once
//! - [`features`]: Record → schema-conformant feature vector
//! - [`model`]: Scoring model boundary (LightGBM tree dump, ONNX)
//! - [`risk`]: Decision engine: probability + amount → action
//! - [`service`]: Prediction service orchestrating the pipeline
//! - [`logging`]: Structured JSON logging

pub mod artifacts;
pub mod config;
pub mod error;
pub mod features;
pub mod logging;
pub mod model;
pub mod record;
pub mod risk;
pub mod service;

pub use artifacts::{ReferenceStats, Schema};
pub use config::ServiceConfig;
pub use error::{ArtifactError, ConfigError, PredictError, ScoreError};
pub use features::{FeatureTransformer, FeatureValue, FeatureVector};
pub use logging::StructuredLogger;
pub use model::{OnnxScorer, ScoringModel, TreeEnsemble};
pub use record::RawRecord;
pub use risk::{Action, DecisionEngine};
pub use service::{PredictRequest, PredictResponse, PredictionService, RecordOutcome, ScoreResult};
