//! Combines the model probability with amount guardrails; produces an action.

use crate::config::DecisionConfig;
use serde::{Deserialize, Serialize};

/// Calibrated model threshold at or above which a transaction is blocked.
pub const DEFAULT_BLOCK_THRESHOLD: f64 = 0.474;
/// Amounts strictly above this always go to manual review.
pub const DEFAULT_REVIEW_AMOUNT: f64 = 100_000.0;
/// Amounts strictly above this go to review when the model is mildly suspicious.
pub const DEFAULT_ELEVATED_AMOUNT: f64 = 2_000.0;
/// "Mildly suspicious": probability strictly above this.
pub const DEFAULT_ELEVATED_PROBABILITY: f64 = 0.10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Action {
    Approve,
    ManualReviewRequired,
    BlockAndChallenge,
}

impl Action {
    /// First matching rule wins, in the order the rules are listed on [`Rule`].
    pub fn from_signal(probability: f64, amount: f64, config: &DecisionConfig) -> (Self, Rule) {
        let amount = if amount.is_finite() { amount } else { 0.0 };
        if probability >= config.block_threshold {
            (Action::BlockAndChallenge, Rule::ModelThreshold)
        } else if amount > config.review_amount {
            (Action::ManualReviewRequired, Rule::HighValueOverride)
        } else if amount > config.elevated_amount && probability > config.elevated_probability {
            (Action::ManualReviewRequired, Rule::ElevatedRiskOverride)
        } else {
            (Action::Approve, Rule::Default)
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Action::Approve => "APPROVE",
            Action::ManualReviewRequired => "MANUAL_REVIEW_REQUIRED",
            Action::BlockAndChallenge => "BLOCK_AND_CHALLENGE",
        }
    }
}

impl std::fmt::Display for Action {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which rule produced the action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Rule {
    ModelThreshold,
    HighValueOverride,
    ElevatedRiskOverride,
    Default,
}

/// Decision for a single record
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Decision {
    pub probability: f64,
    pub action: Action,
    pub rule: Rule,
    /// 1 when the model alone crosses the block threshold.
    pub prediction: u8,
}

#[derive(Debug, Clone)]
pub struct DecisionEngine {
    config: DecisionConfig,
}

impl DecisionEngine {
    pub fn new(config: DecisionConfig) -> Self {
        Self { config }
    }

    pub fn decide(&self, probability: f64, amount: f64) -> Decision {
        let (action, rule) = Action::from_signal(probability, amount, &self.config);
        Decision {
            probability,
            action,
            rule,
            prediction: u8::from(probability >= self.config.block_threshold),
        }
    }

    pub fn config(&self) -> &DecisionConfig {
        &self.config
    }
}

impl Default for DecisionEngine {
    fn default() -> Self {
        Self::new(DecisionConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn model_threshold_takes_precedence() {
        let engine = DecisionEngine::default();
        for amount in [0.0, 50.0, 3000.0, 150_000.0, 35_000_000.0] {
            let d = engine.decide(0.50, amount);
            assert_eq!(d.action, Action::BlockAndChallenge);
            assert_eq!(d.rule, Rule::ModelThreshold);
            assert_eq!(d.prediction, 1);
        }
        assert_eq!(engine.decide(0.474, 10.0).action, Action::BlockAndChallenge);
        assert_eq!(engine.decide(0.4739, 10.0).action, Action::Approve);
    }

    #[test]
    fn high_value_goes_to_review() {
        let d = DecisionEngine::default().decide(0.20, 150_000.0);
        assert_eq!(d.action, Action::ManualReviewRequired);
        assert_eq!(d.rule, Rule::HighValueOverride);
        assert_eq!(d.prediction, 0);
    }

    #[test]
    fn elevated_risk_override() {
        let engine = DecisionEngine::default();
        let d = engine.decide(0.15, 3000.0);
        assert_eq!(d.action, Action::ManualReviewRequired);
        assert_eq!(d.rule, Rule::ElevatedRiskOverride);
        // both comparisons are strict
        assert_eq!(engine.decide(0.10, 3000.0).action, Action::Approve);
        assert_eq!(engine.decide(0.15, 2000.0).action, Action::Approve);
        assert_eq!(engine.decide(0.15, 100_000.0).rule, Rule::ElevatedRiskOverride);
    }

    #[test]
    fn low_risk_is_approved() {
        let d = DecisionEngine::default().decide(0.05, 50.0);
        assert_eq!(d.action, Action::Approve);
        assert_eq!(d.rule, Rule::Default);
    }

    #[test]
    fn guardrail_overrides_low_score() {
        let d = DecisionEngine::default().decide(0.05, 35_000_000.0);
        assert_eq!(d.action, Action::ManualReviewRequired);
    }

    #[test]
    fn non_finite_amount_counts_as_zero() {
        let engine = DecisionEngine::default();
        assert_eq!(engine.decide(0.2, f64::INFINITY).action, Action::Approve);
        assert_eq!(engine.decide(0.2, f64::NAN).action, Action::Approve);
    }

    #[test]
    fn thresholds_are_overridable() {
        let engine = DecisionEngine::new(DecisionConfig {
            block_threshold: 0.9,
            review_amount: 10_000.0,
            ..DecisionConfig::default()
        });
        assert_eq!(engine.decide(0.5, 10.0).action, Action::Approve);
        assert_eq!(engine.decide(0.5, 20_000.0).action, Action::ManualReviewRequired);
    }

    #[test]
    fn action_serializes_to_wire_names() {
        assert_eq!(
            serde_json::to_string(&Action::ManualReviewRequired).unwrap(),
            "\"MANUAL_REVIEW_REQUIRED\""
        );
        assert_eq!(Action::BlockAndChallenge.to_string(), "BLOCK_AND_CHALLENGE");
    }
}
