//! Native evaluator for LightGBM JSON model dumps (`Booster.dump_model()`).
//!
//! Trees are flattened into index-linked node arrays at load time. Features
//! are matched by name, so the feature vector's column order does not have
//! to equal the model's.

use super::{checked_probability, ScoringModel};
use crate::error::ScoreError;
use crate::features::FeatureVector;
use serde::Deserialize;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tracing::info;

/// LightGBM treats |x| below this as zero for `missing_type = Zero`.
const ZERO_THRESHOLD: f64 = 1e-35;

#[derive(Debug, Deserialize)]
struct ModelDump {
    #[serde(default)]
    objective: Option<String>,
    feature_names: Vec<String>,
    tree_info: Vec<TreeInfo>,
    #[serde(default)]
    average_output: bool,
}

#[derive(Debug, Deserialize)]
struct TreeInfo {
    tree_structure: DumpNode,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum DumpNode {
    Split(Box<DumpSplit>),
    Leaf { leaf_value: f64 },
}

#[derive(Debug, Deserialize)]
struct DumpSplit {
    split_feature: usize,
    threshold: DumpThreshold,
    decision_type: String,
    #[serde(default)]
    default_left: bool,
    #[serde(default)]
    missing_type: Option<String>,
    left_child: DumpNode,
    right_child: DumpNode,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum DumpThreshold {
    Value(f64),
    /// Categorical splits: category codes joined by `||`.
    Categories(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum MissingType {
    None,
    Zero,
    NaN,
}

#[derive(Debug, Clone)]
enum SplitRule {
    Numerical(f64),
    Categorical(HashSet<i64>),
}

#[derive(Debug, Clone)]
enum Node {
    Split {
        feature: usize,
        rule: SplitRule,
        default_left: bool,
        missing: MissingType,
        left: usize,
        right: usize,
    },
    Leaf(f64),
}

#[derive(Debug, Clone)]
struct Tree {
    nodes: Vec<Node>,
}

impl Tree {
    fn from_dump(root: DumpNode, n_features: usize) -> Result<Self, ScoreError> {
        let mut nodes = Vec::new();
        flatten(root, n_features, &mut nodes)?;
        Ok(Self { nodes })
    }

    fn predict(&self, inputs: &[f64]) -> f64 {
        let mut idx = 0;
        loop {
            match &self.nodes[idx] {
                Node::Leaf(value) => return *value,
                Node::Split {
                    feature,
                    rule,
                    default_left,
                    missing,
                    left,
                    right,
                } => {
                    let go_left = decide(rule, inputs[*feature], *missing, *default_left);
                    idx = if go_left { *left } else { *right };
                }
            }
        }
    }
}

/// Pre-order flattening; children always sit after their parent.
fn flatten(node: DumpNode, n_features: usize, out: &mut Vec<Node>) -> Result<usize, ScoreError> {
    let idx = out.len();
    match node {
        DumpNode::Leaf { leaf_value } => {
            out.push(Node::Leaf(leaf_value));
        }
        DumpNode::Split(split) => {
            let split = *split;
            if split.split_feature >= n_features {
                return Err(ScoreError::Load(format!(
                    "split on feature index {} but the model names only {} features",
                    split.split_feature, n_features
                )));
            }
            let rule = parse_rule(&split.decision_type, &split.threshold)?;
            let missing = match split.missing_type.as_deref() {
                None | Some("None") => MissingType::None,
                Some("Zero") => MissingType::Zero,
                Some("NaN") => MissingType::NaN,
                Some(other) => {
                    return Err(ScoreError::Load(format!("unknown missing_type '{other}'")))
                }
            };
            // placeholder until both children are placed
            out.push(Node::Leaf(0.0));
            let left = flatten(split.left_child, n_features, out)?;
            let right = flatten(split.right_child, n_features, out)?;
            out[idx] = Node::Split {
                feature: split.split_feature,
                rule,
                default_left: split.default_left,
                missing,
                left,
                right,
            };
        }
    }
    Ok(idx)
}

fn parse_rule(decision_type: &str, threshold: &DumpThreshold) -> Result<SplitRule, ScoreError> {
    match (decision_type, threshold) {
        ("<=", DumpThreshold::Value(t)) => Ok(SplitRule::Numerical(*t)),
        ("==", DumpThreshold::Value(t)) => Ok(SplitRule::Categorical(HashSet::from([*t as i64]))),
        ("==", DumpThreshold::Categories(s)) => s
            .split("||")
            .map(|c| {
                c.trim()
                    .parse::<i64>()
                    .map_err(|_| ScoreError::Load(format!("bad category code '{c}' in '{s}'")))
            })
            .collect::<Result<HashSet<_>, _>>()
            .map(SplitRule::Categorical),
        (other, _) => Err(ScoreError::Load(format!(
            "unsupported split '{other}' with threshold {threshold:?}"
        ))),
    }
}

/// LightGBM's branch rule, including its missing-value routing.
fn decide(rule: &SplitRule, value: f64, missing: MissingType, default_left: bool) -> bool {
    match rule {
        SplitRule::Numerical(threshold) => {
            let mut v = value;
            if missing != MissingType::NaN && v.is_nan() {
                v = 0.0;
            }
            if (missing == MissingType::Zero && v.abs() <= ZERO_THRESHOLD)
                || (missing == MissingType::NaN && v.is_nan())
            {
                return default_left;
            }
            v <= *threshold
        }
        SplitRule::Categorical(categories) => {
            let v = if value.is_nan() {
                if missing == MissingType::NaN {
                    return false;
                }
                0.0
            } else {
                value
            };
            if v < 0.0 {
                return false;
            }
            categories.contains(&(v as i64))
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Link {
    Sigmoid(f64),
}

/// Gradient-boosted tree ensemble producing a binary-class probability.
#[derive(Debug, Clone)]
pub struct TreeEnsemble {
    feature_names: Vec<String>,
    trees: Vec<Tree>,
    link: Link,
    average_output: bool,
    source: Option<PathBuf>,
}

impl TreeEnsemble {
    pub fn load(path: &Path) -> Result<Self, ScoreError> {
        if !path.exists() {
            return Err(ScoreError::ModelNotFound {
                path: path.to_path_buf(),
            });
        }
        let data = std::fs::read_to_string(path).map_err(|e| ScoreError::Load(e.to_string()))?;
        let mut model = Self::from_json_str(&data)?;
        model.source = Some(path.to_path_buf());
        info!(
            path = %path.display(),
            trees = model.trees.len(),
            features = model.feature_names.len(),
            "tree ensemble loaded"
        );
        Ok(model)
    }

    pub fn from_json_str(data: &str) -> Result<Self, ScoreError> {
        let dump: ModelDump =
            serde_json::from_str(data).map_err(|e| ScoreError::Load(e.to_string()))?;
        let link = parse_objective(dump.objective.as_deref())?;
        let n_features = dump.feature_names.len();
        let trees = dump
            .tree_info
            .into_iter()
            .map(|t| Tree::from_dump(t.tree_structure, n_features))
            .collect::<Result<Vec<_>, _>>()?;
        if trees.is_empty() {
            return Err(ScoreError::Load("model contains no trees".to_string()));
        }
        Ok(Self {
            feature_names: dump.feature_names,
            trees,
            link,
            average_output: dump.average_output,
            source: None,
        })
    }

    pub fn feature_names(&self) -> &[String] {
        &self.feature_names
    }

    pub fn tree_count(&self) -> usize {
        self.trees.len()
    }

    /// Sum of leaf outputs before the link function.
    pub fn raw_score(&self, features: &FeatureVector) -> Result<f64, ScoreError> {
        let inputs = self
            .feature_names
            .iter()
            .map(|name| {
                features
                    .get(name)
                    .map(|v| v.model_input())
                    .ok_or_else(|| ScoreError::MissingFeature(name.clone()))
            })
            .collect::<Result<Vec<_>, _>>()?;

        let sum: f64 = self.trees.iter().map(|t| t.predict(&inputs)).sum();
        Ok(if self.average_output {
            sum / self.trees.len() as f64
        } else {
            sum
        })
    }
}

fn parse_objective(objective: Option<&str>) -> Result<Link, ScoreError> {
    let Some(objective) = objective else {
        return Ok(Link::Sigmoid(1.0));
    };
    let mut parts = objective.split_whitespace();
    match parts.next() {
        Some("binary") => {
            let sigmoid = parts
                .find_map(|p| p.strip_prefix("sigmoid:"))
                .map(|s| {
                    s.parse::<f64>()
                        .map_err(|_| ScoreError::Load(format!("bad sigmoid in '{objective}'")))
                })
                .transpose()?
                .unwrap_or(1.0);
            Ok(Link::Sigmoid(sigmoid))
        }
        Some("cross_entropy") | Some("xentropy") => Ok(Link::Sigmoid(1.0)),
        _ => Err(ScoreError::Load(format!(
            "unsupported objective '{objective}'; expected a binary classifier"
        ))),
    }
}

impl ScoringModel for TreeEnsemble {
    fn score(&self, features: &FeatureVector) -> Result<f64, ScoreError> {
        let raw = self.raw_score(features)?;
        let probability = match self.link {
            Link::Sigmoid(k) => 1.0 / (1.0 + (-k * raw).exp()),
        };
        checked_probability(probability)
    }

    fn describe(&self) -> String {
        match &self.source {
            Some(path) => format!("trees:{} ({} trees)", path.display(), self.trees.len()),
            None => format!("trees:inline ({} trees)", self.trees.len()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::artifacts::{ReferenceStats, Schema};
    use crate::features::transform;
    use crate::record::RawRecord;

    const MODEL: &str = r#"{
        "objective": "binary sigmoid:1",
        "feature_names": ["TransactionAmt_log", "DeviceType"],
        "tree_info": [
            {"tree_structure": {
                "split_feature": 0, "threshold": 8.0, "decision_type": "<=",
                "default_left": true, "missing_type": "None",
                "left_child": {"leaf_value": -2.0},
                "right_child": {
                    "split_feature": 1, "threshold": "1||2", "decision_type": "==",
                    "default_left": false, "missing_type": "NaN",
                    "left_child": {"leaf_value": 1.5},
                    "right_child": {"leaf_value": 0.5}
                }
            }},
            {"tree_structure": {"leaf_value": 0.25}}
        ]
    }"#;

    fn schema() -> Schema {
        Schema::from_json_str(
            r#"{
                "features": ["DeviceType", "TransactionAmt_log"],
                "categorical_features": ["DeviceType"],
                "category_vocabulary": {"DeviceType": ["mobile", "desktop", "tablet"]}
            }"#,
        )
        .unwrap()
    }

    fn sigmoid(x: f64) -> f64 {
        1.0 / (1.0 + (-x).exp())
    }

    fn score(record: RawRecord) -> f64 {
        let model = TreeEnsemble::from_json_str(MODEL).unwrap();
        let fv = transform(&record, &schema(), &ReferenceStats::default());
        model.score(&fv).unwrap()
    }

    #[test]
    fn parses_and_flattens() {
        let model = TreeEnsemble::from_json_str(MODEL).unwrap();
        assert_eq!(model.tree_count(), 2);
        assert_eq!(model.feature_names(), ["TransactionAmt_log", "DeviceType"]);
        assert_eq!(model.trees[0].nodes.len(), 5);
    }

    #[test]
    fn numerical_split() {
        let p = score(RawRecord::new().with("TransactionAmt", 50.0));
        assert!((p - sigmoid(-2.0 + 0.25)).abs() < 1e-12);
    }

    #[test]
    fn categorical_split_uses_vocabulary_index() {
        let big = 35_000_000.0;
        let p = score(
            RawRecord::new()
                .with("TransactionAmt", big)
                .with("DeviceType", "Desktop"),
        );
        assert!((p - sigmoid(1.5 + 0.25)).abs() < 1e-12);

        // index 0 is not in {1, 2}
        let p = score(
            RawRecord::new()
                .with("TransactionAmt", big)
                .with("DeviceType", "mobile"),
        );
        assert!((p - sigmoid(0.5 + 0.25)).abs() < 1e-12);
    }

    #[test]
    fn out_of_vocabulary_takes_the_missing_branch() {
        let p = score(
            RawRecord::new()
                .with("TransactionAmt", 35_000_000.0)
                .with("DeviceType", "smart fridge"),
        );
        assert!((p - sigmoid(0.5 + 0.25)).abs() < 1e-12);
    }

    #[test]
    fn missing_model_feature_is_an_inference_error() {
        let model = TreeEnsemble::from_json_str(MODEL).unwrap();
        let schema =
            Schema::from_json_str(r#"{"features": ["TransactionAmt_log"], "categorical_features": []}"#)
                .unwrap();
        let fv = transform(&RawRecord::new(), &schema, &ReferenceStats::default());
        assert!(matches!(model.score(&fv), Err(ScoreError::MissingFeature(f)) if f == "DeviceType"));
    }

    #[test]
    fn missing_value_routing() {
        let nan_rule = SplitRule::Numerical(1.0);
        assert!(decide(&nan_rule, f64::NAN, MissingType::NaN, true));
        assert!(!decide(&nan_rule, f64::NAN, MissingType::NaN, false));
        // without NaN handling, NaN is read as zero
        assert!(decide(&nan_rule, f64::NAN, MissingType::None, false));
        assert!(!decide(&SplitRule::Numerical(-1.0), 0.0, MissingType::Zero, false));
        assert!(decide(&SplitRule::Numerical(-1.0), 0.0, MissingType::Zero, true));

        let cat = SplitRule::Categorical(HashSet::from([0, 3]));
        assert!(decide(&cat, 3.0, MissingType::None, false));
        assert!(!decide(&cat, -1.0, MissingType::None, true));
        assert!(decide(&cat, f64::NAN, MissingType::None, false));
        assert!(!decide(&cat, f64::NAN, MissingType::NaN, true));
    }

    #[test]
    fn rejects_unsupported_models() {
        let multiclass = MODEL.replace("binary sigmoid:1", "multiclass num_class:3");
        assert!(matches!(
            TreeEnsemble::from_json_str(&multiclass),
            Err(ScoreError::Load(_))
        ));
        let bad_index = MODEL.replace("\"split_feature\": 1", "\"split_feature\": 7");
        assert!(matches!(
            TreeEnsemble::from_json_str(&bad_index),
            Err(ScoreError::Load(_))
        ));
        let empty = r#"{"feature_names": ["a"], "tree_info": []}"#;
        assert!(matches!(
            TreeEnsemble::from_json_str(empty),
            Err(ScoreError::Load(_))
        ));
    }

    #[test]
    fn sigmoid_scale_is_applied() {
        let scaled = MODEL.replace("binary sigmoid:1", "binary sigmoid:2");
        let model = TreeEnsemble::from_json_str(&scaled).unwrap();
        let fv = transform(
            &RawRecord::new().with("TransactionAmt", 50.0),
            &schema(),
            &ReferenceStats::default(),
        );
        let p = model.score(&fv).unwrap();
        assert!((p - sigmoid(2.0 * -1.75)).abs() < 1e-12);
    }
}
