//! Read-only artifacts loaded once at startup: feature schema and reference statistics.

mod schema;
mod stats;

pub use schema::{Schema, Vocabulary};
pub use stats::{ReferenceStats, FALLBACK_GLOBAL_MEAN};
