//! Transformation pipeline: numeric coercion → derived features → categorical
//! normalization → schema completion and projection → vocabulary binding →
//! final numeric enforcement.
//!
//! Total over its input: a malformed record never fails, it falls back to
//! defaults field by field.

use super::{
    CategoryBinding, CategoryValue, FeatureValue, FeatureVector, InteractionFeatures,
    AMOUNT_FIELD, AMOUNT_LOG_FEATURE, BROWSER_MAX_FEATURE, DEVICE_AVG_FEATURE,
    DEVICE_RATIO_FEATURE, EMAIL_RATIO_FEATURE, HOUR_FEATURE, TIME_FIELD, UNKNOWN_CATEGORY,
};
use crate::artifacts::{ReferenceStats, Schema};
use crate::record::RawRecord;
use std::sync::Arc;

const SECONDS_PER_HOUR: f64 = 3600.0;
const HOURS_PER_DAY: f64 = 24.0;

/// Owns shared handles on the startup artifacts; cheap to clone across workers.
#[derive(Debug, Clone)]
pub struct FeatureTransformer {
    schema: Arc<Schema>,
    stats: Arc<ReferenceStats>,
}

impl FeatureTransformer {
    pub fn new(schema: Arc<Schema>, stats: Arc<ReferenceStats>) -> Self {
        Self { schema, stats }
    }

    pub fn transform(&self, record: &RawRecord) -> FeatureVector {
        transform(record, &self.schema, &self.stats)
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    pub fn feature_count(&self) -> usize {
        self.schema.len()
    }
}

/// Numeric value of `name`, or 0 when absent, null, or unparseable.
pub fn numeric_field(record: &RawRecord, name: &str) -> f64 {
    record.get(name).as_number().unwrap_or(0.0)
}

/// Build the feature vector for one record.
pub fn transform(record: &RawRecord, schema: &Schema, stats: &ReferenceStats) -> FeatureVector {
    let derived = DerivedFeatures::compute(record, stats);

    let values = schema
        .features()
        .iter()
        .map(|name| {
            if schema.is_categorical(name) {
                FeatureValue::Categorical(bind(schema, name, categorical_label(record, name)))
            } else {
                let value = derived
                    .get(name)
                    .unwrap_or_else(|| raw_numeric(record, name));
                FeatureValue::Numeric(finite_or_zero(value))
            }
        })
        .collect();

    FeatureVector::new(schema.feature_names(), values)
}

struct DerivedFeatures {
    hour: f64,
    amount_log: f64,
    /// Only when the record carries an amount key at all.
    interaction: Option<InteractionFeatures>,
}

impl DerivedFeatures {
    fn compute(record: &RawRecord, stats: &ReferenceStats) -> Self {
        let amount = numeric_field(record, AMOUNT_FIELD);
        let dt = numeric_field(record, TIME_FIELD);

        let interaction = record
            .contains(AMOUNT_FIELD)
            .then(|| InteractionFeatures::compute(record, amount, stats));

        Self {
            hour: transaction_hour(dt),
            amount_log: amount.ln_1p(),
            interaction,
        }
    }

    fn get(&self, name: &str) -> Option<f64> {
        match name {
            HOUR_FEATURE => Some(self.hour),
            AMOUNT_LOG_FEATURE => Some(self.amount_log),
            DEVICE_AVG_FEATURE => self.interaction.map(|f| f.device_avg_amt),
            DEVICE_RATIO_FEATURE => self.interaction.map(|f| f.device_amt_ratio),
            BROWSER_MAX_FEATURE => self.interaction.map(|f| f.browser_max_amt),
            EMAIL_RATIO_FEATURE => self.interaction.map(|f| f.email_p_ratio),
            _ => None,
        }
    }
}

/// Hour of day in `[0, 23]`; floored so negative offsets wrap forward.
fn transaction_hour(dt: f64) -> f64 {
    (dt / SECONDS_PER_HOUR).floor().rem_euclid(HOURS_PER_DAY)
}

// The raw amount is consumed by the derived features and never passed through.
fn raw_numeric(record: &RawRecord, name: &str) -> f64 {
    if name == AMOUNT_FIELD {
        return 0.0;
    }
    numeric_field(record, name)
}

fn categorical_label(record: &RawRecord, name: &str) -> String {
    if name == AMOUNT_FIELD {
        return UNKNOWN_CATEGORY.to_string();
    }
    record
        .get(name)
        .as_label()
        .map(|label| label.to_lowercase())
        .unwrap_or_else(|| UNKNOWN_CATEGORY.to_string())
}

fn bind(schema: &Schema, name: &str, label: String) -> CategoryValue {
    let binding = match schema.vocabulary(name) {
        Some(vocab) => vocab
            .index_of(&label)
            .map_or(CategoryBinding::OutOfVocabulary, CategoryBinding::Indexed),
        None => CategoryBinding::Unbound,
    };
    CategoryValue { label, binding }
}

fn finite_or_zero(value: f64) -> f64 {
    if value.is_finite() {
        value
    } else {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Value};
    use std::collections::HashMap;

    fn schema() -> Schema {
        Schema::from_json_str(
            r#"{
                "features": [
                    "TransactionAmt_log", "transaction_hour", "Device_Amt_Ratio",
                    "Browser_Max_Amt", "Email_P_Ratio", "Device_Avg_Amt",
                    "card1", "DeviceType", "id_31", "P_emaildomain"
                ],
                "categorical_features": ["DeviceType", "id_31", "P_emaildomain"],
                "category_vocabulary": {
                    "DeviceType": ["desktop", "mobile", "unknown"],
                    "P_emaildomain": ["gmail.com", "yahoo.com", "unknown"]
                }
            }"#,
        )
        .unwrap()
    }

    fn stats() -> ReferenceStats {
        ReferenceStats::new(
            HashMap::from([("windows".to_string(), 500.0)]),
            HashMap::from([("chrome 63.0".to_string(), 2500.0)]),
            HashMap::from([("gmail.com".to_string(), 49.0)]),
            100.0,
        )
        .unwrap()
    }

    fn record(value: Value) -> RawRecord {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn output_matches_schema_order_and_length() {
        let schema = schema();
        let fv = transform(&RawRecord::new(), &schema, &stats());
        assert_eq!(fv.len(), schema.len());
        assert_eq!(fv.names(), schema.features());
    }

    #[test]
    fn hour_wraps_around_the_day() {
        let schema = schema();
        for (dt, hour) in [(86400, 0.0), (3600, 1.0), (90000, 1.0), (0, 0.0), (-3600, 23.0)] {
            let fv = transform(&record(json!({ "TransactionDT": dt })), &schema, &stats());
            assert_eq!(fv.numeric("transaction_hour"), Some(hour), "dt={dt}");
        }
    }

    #[test]
    fn amount_log_is_zero_at_zero_and_increasing() {
        let schema = schema();
        let log_of = |amt: f64| {
            transform(&record(json!({ "TransactionAmt": amt })), &schema, &stats())
                .numeric("TransactionAmt_log")
                .unwrap()
        };
        assert_eq!(log_of(0.0), 0.0);
        assert!(log_of(1.0) < log_of(10.0));
        assert!(log_of(10.0) < log_of(35_000_000.0));
        assert!((log_of(100.0) - 101f64.ln()).abs() < 1e-12);
    }

    #[test]
    fn ratio_features_follow_reference_stats() {
        let fv = transform(
            &record(json!({
                "TransactionAmt": 1000,
                "DeviceInfo": "Windows",
                "id_31": "chrome 63.0",
                "P_emaildomain": "gmail.com"
            })),
            &schema(),
            &stats(),
        );
        assert_eq!(fv.numeric("Device_Avg_Amt"), Some(500.0));
        let ratio = fv.numeric("Device_Amt_Ratio").unwrap();
        assert!((ratio - 1000.0 / 501.0).abs() < 1e-12);
        assert_eq!(fv.numeric("Browser_Max_Amt"), Some(2500.0));
        assert_eq!(fv.numeric("Email_P_Ratio"), Some(20.0));
    }

    #[test]
    fn ratios_default_to_zero_without_amount() {
        let fv = transform(
            &record(json!({ "DeviceInfo": "Windows", "id_31": "chrome 63.0" })),
            &schema(),
            &stats(),
        );
        assert_eq!(fv.numeric("Device_Avg_Amt"), Some(0.0));
        assert_eq!(fv.numeric("Device_Amt_Ratio"), Some(0.0));
        assert_eq!(fv.numeric("Browser_Max_Amt"), Some(0.0));
        assert_eq!(fv.numeric("Email_P_Ratio"), Some(0.0));
    }

    #[test]
    fn garbage_amount_is_treated_as_present_zero() {
        let fv = transform(
            &record(json!({ "TransactionAmt": "invalid_string", "id_31": "chrome 63.0" })),
            &schema(),
            &stats(),
        );
        assert_eq!(fv.numeric("TransactionAmt_log"), Some(0.0));
        assert_eq!(fv.numeric("Device_Amt_Ratio"), Some(0.0));
        assert_eq!(fv.numeric("Browser_Max_Amt"), Some(2500.0));
    }

    #[test]
    fn categoricals_are_lowercased_and_bound() {
        let fv = transform(
            &record(json!({
                "DeviceType": "Mobile",
                "id_31": 12345,
                "P_emaildomain": "Protonmail.com"
            })),
            &schema(),
            &stats(),
        );
        let device = fv.get("DeviceType").and_then(FeatureValue::as_category).unwrap();
        assert_eq!(device.label, "mobile");
        assert_eq!(device.binding, CategoryBinding::Indexed(1));

        let browser = fv.get("id_31").and_then(FeatureValue::as_category).unwrap();
        assert_eq!(browser.label, "12345");
        assert_eq!(browser.binding, CategoryBinding::Unbound);

        let email = fv.get("P_emaildomain").and_then(FeatureValue::as_category).unwrap();
        assert_eq!(email.label, "protonmail.com");
        assert_eq!(email.binding, CategoryBinding::OutOfVocabulary);
        assert_eq!(fv.out_of_vocabulary(), vec!["P_emaildomain"]);
    }

    #[test]
    fn missing_and_null_categoricals_become_unknown() {
        let fv = transform(&record(json!({ "id_31": null })), &schema(), &stats());
        assert_eq!(fv.label("id_31"), Some("unknown"));
        assert_eq!(fv.label("DeviceType"), Some("unknown"));
        let device = fv.get("DeviceType").and_then(FeatureValue::as_category).unwrap();
        assert_eq!(device.binding, CategoryBinding::Indexed(2));
    }

    #[test]
    fn passthrough_numerics_are_coerced() {
        let schema = schema();
        let fv = transform(&record(json!({ "card1": "13926" })), &schema, &stats());
        assert_eq!(fv.numeric("card1"), Some(13926.0));
        let fv = transform(&record(json!({ "card1": "n/a" })), &schema, &stats());
        assert_eq!(fv.numeric("card1"), Some(0.0));
        let fv = transform(&record(json!({ "card1": [1, 2] })), &schema, &stats());
        assert_eq!(fv.numeric("card1"), Some(0.0));
    }

    #[test]
    fn raw_amount_never_reaches_the_vector() {
        let schema = Schema::from_json_str(
            r#"{"features": ["TransactionAmt", "TransactionAmt_log"], "categorical_features": []}"#,
        )
        .unwrap();
        let fv = transform(&record(json!({ "TransactionAmt": 500 })), &schema, &stats());
        assert_eq!(fv.numeric("TransactionAmt"), Some(0.0));
        assert!(fv.numeric("TransactionAmt_log").unwrap() > 0.0);
    }

    #[test]
    fn non_finite_derivations_are_zeroed() {
        // ln(1 + amt) is undefined below -1; the ratio denominator hits zero at avg = -1.
        let stats = ReferenceStats::new(
            HashMap::from([("windows".to_string(), -1.0)]),
            HashMap::new(),
            HashMap::new(),
            100.0,
        )
        .unwrap();
        let fv = transform(
            &record(json!({ "TransactionAmt": -5, "DeviceInfo": "windows" })),
            &schema(),
            &stats,
        );
        assert_eq!(fv.numeric("TransactionAmt_log"), Some(0.0));
        assert_eq!(fv.numeric("Device_Amt_Ratio"), Some(0.0));
    }

    #[test]
    fn transformer_is_deterministic() {
        let transformer = FeatureTransformer::new(Arc::new(schema()), Arc::new(stats()));
        let raw = record(json!({
            "TransactionAmt": 35000000.0,
            "TransactionDT": 86400,
            "DeviceInfo": "Windows",
            "id_31": "chrome 63.0",
            "DeviceType": "desktop"
        }));
        assert_eq!(transformer.transform(&raw), transformer.transform(&raw));
        assert_eq!(transformer.feature_count(), 10);
    }
}
