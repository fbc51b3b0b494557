//! Amount-relative-to-history ratio features.

use super::{BROWSER_FIELD, DEVICE_FIELD, EMAIL_FIELD, UNKNOWN_CATEGORY};
use crate::artifacts::ReferenceStats;
use crate::record::RawRecord;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct InteractionFeatures {
    pub device_avg_amt: f64,
    pub device_amt_ratio: f64,
    pub browser_max_amt: f64,
    pub email_p_ratio: f64,
}

impl InteractionFeatures {
    pub fn compute(record: &RawRecord, amount: f64, stats: &ReferenceStats) -> Self {
        let device = lookup_key(record, DEVICE_FIELD);
        let browser = lookup_key(record, BROWSER_FIELD);
        let email = lookup_key(record, EMAIL_FIELD);

        let device_avg_amt = stats.device_avg(&device);
        Self {
            device_avg_amt,
            device_amt_ratio: amount / (device_avg_amt + 1.0),
            browser_max_amt: stats.browser_max(&browser),
            email_p_ratio: amount / (stats.email_avg(&email) + 1.0),
        }
    }
}

/// Lowercased statistics key; null, absent and empty all map to "unknown".
fn lookup_key(record: &RawRecord, field: &str) -> String {
    match record.get(field).as_label() {
        Some(label) if !label.is_empty() => label.to_lowercase(),
        _ => UNKNOWN_CATEGORY.to_string(),
    }
}
