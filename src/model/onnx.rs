//! ONNX Runtime scorer. Input: `[1, n_features]` f32 in schema order,
//! categorical values encoded by vocabulary index (NaN when unbound or
//! out of vocabulary). Output: class probabilities or a single probability.
//!
//! A session cannot serve concurrent `run` calls, so the scorer keeps one
//! independently loaded session per worker, each behind its own lock.

use super::{checked_probability, ScoringModel};
use crate::error::ScoreError;
use crate::features::FeatureVector;
use ndarray::Array2;
use ort::session::{builder::GraphOptimizationLevel, Session};
use ort::value::Tensor;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use tracing::{debug, info};

pub struct OnnxScorer {
    sessions: Vec<Mutex<Session>>,
    next: AtomicUsize,
    input_name: String,
    output_name: String,
    path: PathBuf,
}

fn open_session(path: &Path, intra_threads: usize) -> Result<Session, ScoreError> {
    Session::builder()
        .map_err(|e| ScoreError::Load(e.to_string()))?
        .with_optimization_level(GraphOptimizationLevel::Level3)
        .map_err(|e| ScoreError::Load(e.to_string()))?
        .with_intra_threads(intra_threads)
        .map_err(|e| ScoreError::Load(e.to_string()))?
        .commit_from_file(path)
        .map_err(|e| ScoreError::Load(format!("{}: {e}", path.display())))
}

impl OnnxScorer {
    /// Load `workers` sessions from `path`. A missing or invalid model is an error.
    pub fn load(path: &Path, workers: usize, intra_threads: usize) -> Result<Self, ScoreError> {
        if !path.exists() {
            return Err(ScoreError::ModelNotFound {
                path: path.to_path_buf(),
            });
        }

        let first = open_session(path, intra_threads)?;
        let input_name = first
            .inputs
            .first()
            .map(|i| i.name.clone())
            .unwrap_or_else(|| "input".to_string());
        let output_name = first
            .outputs
            .iter()
            .find(|o| o.name.contains("prob"))
            .or_else(|| first.outputs.last())
            .map(|o| o.name.clone())
            .unwrap_or_else(|| "probabilities".to_string());

        let mut sessions = Vec::with_capacity(workers.max(1));
        sessions.push(Mutex::new(first));
        for _ in 1..workers.max(1) {
            sessions.push(Mutex::new(open_session(path, intra_threads)?));
        }

        info!(
            path = %path.display(),
            sessions = sessions.len(),
            input = %input_name,
            output = %output_name,
            "ONNX model loaded"
        );

        Ok(Self {
            sessions,
            next: AtomicUsize::new(0),
            input_name,
            output_name,
            path: path.to_path_buf(),
        })
    }

    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }

    fn run(&self, row: Vec<f32>) -> Result<f64, ScoreError> {
        let dim = row.len();
        let array = Array2::from_shape_vec((1, dim), row)
            .map_err(|e| ScoreError::Inference(e.to_string()))?;
        let tensor = Tensor::from_array(array).map_err(|e| ScoreError::Inference(e.to_string()))?;

        let slot = self.next.fetch_add(1, Ordering::Relaxed) % self.sessions.len();
        let mut session = self.sessions[slot]
            .lock()
            .map_err(|_| ScoreError::Inference("session lock poisoned".to_string()))?;
        let outputs = session
            .run(ort::inputs![self.input_name.as_str() => tensor])
            .map_err(|e| ScoreError::Inference(e.to_string()))?;

        if let Some(output) = outputs.get(self.output_name.as_str()) {
            if let Ok((_, data)) = output.try_extract_tensor::<f32>() {
                return positive_class(data);
            }
        }
        // Fall back to the first float tensor that is not a label output.
        for (name, output) in outputs.iter() {
            if name.contains("label") {
                continue;
            }
            if let Ok((_, data)) = output.try_extract_tensor::<f32>() {
                debug!(output = %name, "probability read from fallback output");
                return positive_class(data);
            }
        }
        Err(ScoreError::Inference(
            "model produced no float probability output".to_string(),
        ))
    }
}

/// `[p0, p1, ...]` → p1; a single value is already the positive-class probability.
fn positive_class(data: &[f32]) -> Result<f64, ScoreError> {
    let value = match data {
        [] => return Err(ScoreError::Inference("empty output tensor".to_string())),
        [p] => *p,
        [_, p1, ..] => *p1,
    };
    checked_probability(f64::from(value))
}

impl ScoringModel for OnnxScorer {
    fn score(&self, features: &FeatureVector) -> Result<f64, ScoreError> {
        self.run(features.encode())
    }

    fn describe(&self) -> String {
        format!("onnx:{} ({} sessions)", self.path.display(), self.sessions.len())
    }
}
