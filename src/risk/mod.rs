//! Decision engine: probability + amount → action.

mod engine;

pub use engine::{
    Action, Decision, DecisionEngine, Rule, DEFAULT_BLOCK_THRESHOLD, DEFAULT_ELEVATED_AMOUNT,
    DEFAULT_ELEVATED_PROBABILITY, DEFAULT_REVIEW_AMOUNT,
};
