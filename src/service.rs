//! Prediction service: transform → score → decide, per record.
//!
//! Records in a batch are independent. A record the model cannot score
//! yields an explicit `inference_failed` outcome; its neighbours are unaffected.

use crate::artifacts::{ReferenceStats, Schema};
use crate::config::DecisionConfig;
use crate::error::{PredictError, ScoreError};
use crate::features::{numeric_field, FeatureTransformer, AMOUNT_FIELD};
use crate::model::{checked_probability, ScoringModel};
use crate::record::RawRecord;
use crate::risk::{Action, DecisionEngine};
use chrono::{DateTime, Utc};
use serde::de::{self, Deserializer};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::sync::Arc;
use tracing::{debug, error, info, info_span, warn};
use uuid::Uuid;

const RECORDS_KEY: &str = "records";

/// Incoming envelope: `{"records": [...]}` or a single bare record.
///
/// An object carrying a `records` key is always a batch; if that key is not
/// a list of objects the whole envelope is rejected rather than scored as a
/// bare record.
#[derive(Debug, Clone)]
pub enum PredictRequest {
    Batch { records: Vec<RawRecord> },
    Single(RawRecord),
}

impl<'de> Deserialize<'de> for PredictRequest {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let mut fields = Map::<String, Value>::deserialize(deserializer)?;
        match fields.remove(RECORDS_KEY) {
            Some(records) => serde_json::from_value(records)
                .map(|records| PredictRequest::Batch { records })
                .map_err(|e| de::Error::custom(format!("invalid `{RECORDS_KEY}`: {e}"))),
            None => Ok(PredictRequest::Single(RawRecord::from_map(fields))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScoreResult {
    pub prediction: u8,
    pub probability: f64,
    pub action: Action,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    InferenceFailed,
}

/// Generic failure marker; detail stays in the logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailedRecord {
    pub error: FailureKind,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RecordOutcome {
    Scored(ScoreResult),
    Failed(FailedRecord),
}

impl RecordOutcome {
    pub fn scored(&self) -> Option<&ScoreResult> {
        match self {
            RecordOutcome::Scored(result) => Some(result),
            RecordOutcome::Failed(_) => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum PredictResponse {
    One(RecordOutcome),
    Many(Vec<RecordOutcome>),
}

#[derive(Debug, Clone, Serialize)]
pub struct ServiceHealth {
    pub status: &'static str,
    pub started_at: DateTime<Utc>,
    pub features: usize,
    pub model: String,
}

pub struct PredictionService {
    transformer: FeatureTransformer,
    model: Arc<dyn ScoringModel>,
    engine: DecisionEngine,
    started_at: DateTime<Utc>,
}

impl PredictionService {
    pub fn new(
        schema: Arc<Schema>,
        stats: Arc<ReferenceStats>,
        model: Arc<dyn ScoringModel>,
        decision: DecisionConfig,
    ) -> Self {
        Self {
            transformer: FeatureTransformer::new(schema, stats),
            model,
            engine: DecisionEngine::new(decision),
            started_at: Utc::now(),
        }
    }

    /// Full pipeline for one record, with the scoring error kept typed.
    pub fn score_record(&self, record: &RawRecord) -> Result<ScoreResult, ScoreError> {
        let features = self.transformer.transform(record);
        let oov = features.out_of_vocabulary();
        if !oov.is_empty() {
            debug!(features = ?oov, "out-of-vocabulary categories");
        }

        let probability = checked_probability(self.model.score(&features)?)?;
        let amount = numeric_field(record, AMOUNT_FIELD);
        let decision = self.engine.decide(probability, amount);

        if decision.action != Action::Approve {
            info!(
                target: "decision_audit",
                probability,
                amount,
                action = %decision.action,
                rule = ?decision.rule,
                out_of_vocabulary = ?oov,
                "transaction flagged"
            );
        }

        Ok(ScoreResult {
            prediction: decision.prediction,
            probability: decision.probability,
            action: decision.action,
        })
    }

    pub fn predict_one(&self, record: &RawRecord) -> RecordOutcome {
        match self.score_record(record) {
            Ok(result) => RecordOutcome::Scored(result),
            Err(e) => {
                error!(error = %e, "inference failed");
                RecordOutcome::Failed(FailedRecord {
                    error: FailureKind::InferenceFailed,
                })
            }
        }
    }

    pub fn predict_batch(&self, records: &[RawRecord]) -> Vec<RecordOutcome> {
        records
            .iter()
            .enumerate()
            .map(|(index, record)| {
                let _span = info_span!("record", index).entered();
                self.predict_one(record)
            })
            .collect()
    }

    /// Service call contract. A single record (bare, or a one-element
    /// batch) answers with one object; larger batches answer with a list.
    pub fn predict(&self, request: PredictRequest) -> Result<PredictResponse, PredictError> {
        let request_id = Uuid::new_v4();
        let _span = info_span!("predict", %request_id).entered();

        let response = match request {
            PredictRequest::Single(record) => PredictResponse::One(self.predict_one(&record)),
            PredictRequest::Batch { records } => match records.as_slice() {
                [] => {
                    warn!("empty request rejected");
                    return Err(PredictError::EmptyBatch);
                }
                [record] => PredictResponse::One(self.predict_one(record)),
                many => PredictResponse::Many(self.predict_batch(many)),
            },
        };
        debug!("request complete");
        Ok(response)
    }

    pub fn health(&self) -> ServiceHealth {
        ServiceHealth {
            status: "ok",
            started_at: self.started_at,
            features: self.transformer.feature_count(),
            model: self.model.describe(),
        }
    }

    pub fn transformer(&self) -> &FeatureTransformer {
        &self.transformer
    }
}
