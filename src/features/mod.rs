//! Feature transformation: raw record → schema-conformant feature vector.

mod interaction;
mod pipeline;

pub use interaction::InteractionFeatures;
pub use pipeline::{numeric_field, transform, FeatureTransformer};

use serde::Serialize;
use std::sync::Arc;

/// Raw input fields the transformer reads directly.
pub const AMOUNT_FIELD: &str = "TransactionAmt";
pub const TIME_FIELD: &str = "TransactionDT";
pub const DEVICE_FIELD: &str = "DeviceInfo";
pub const BROWSER_FIELD: &str = "id_31";
pub const EMAIL_FIELD: &str = "P_emaildomain";

/// Derived numeric features.
pub const HOUR_FEATURE: &str = "transaction_hour";
pub const AMOUNT_LOG_FEATURE: &str = "TransactionAmt_log";
pub const DEVICE_AVG_FEATURE: &str = "Device_Avg_Amt";
pub const DEVICE_RATIO_FEATURE: &str = "Device_Amt_Ratio";
pub const BROWSER_MAX_FEATURE: &str = "Browser_Max_Amt";
pub const EMAIL_RATIO_FEATURE: &str = "Email_P_Ratio";

pub const DERIVED_NUMERIC_FEATURES: [&str; 6] = [
    HOUR_FEATURE,
    AMOUNT_LOG_FEATURE,
    DEVICE_AVG_FEATURE,
    DEVICE_RATIO_FEATURE,
    BROWSER_MAX_FEATURE,
    EMAIL_RATIO_FEATURE,
];

/// Placeholder for missing categorical values.
pub const UNKNOWN_CATEGORY: &str = "unknown";

/// How a categorical label relates to the vocabulary the model was trained with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CategoryBinding {
    /// Position in the feature's vocabulary.
    Indexed(usize),
    /// Feature has a vocabulary, but this label is not in it.
    OutOfVocabulary,
    /// Feature has no vocabulary; any label is accepted.
    Unbound,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CategoryValue {
    pub label: String,
    pub binding: CategoryBinding,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum FeatureValue {
    /// Always finite.
    Numeric(f64),
    Categorical(CategoryValue),
}

impl FeatureValue {
    pub fn as_numeric(&self) -> Option<f64> {
        match self {
            FeatureValue::Numeric(v) => Some(*v),
            FeatureValue::Categorical(_) => None,
        }
    }

    pub fn as_category(&self) -> Option<&CategoryValue> {
        match self {
            FeatureValue::Numeric(_) => None,
            FeatureValue::Categorical(c) => Some(c),
        }
    }

    /// Numeric model input. Categories encode as their vocabulary index;
    /// out-of-vocabulary and unbound labels encode as NaN, the missing-category
    /// code tree ensembles route down their default branch.
    pub fn model_input(&self) -> f64 {
        match self {
            FeatureValue::Numeric(v) => *v,
            FeatureValue::Categorical(c) => match c.binding {
                CategoryBinding::Indexed(i) => i as f64,
                CategoryBinding::OutOfVocabulary | CategoryBinding::Unbound => f64::NAN,
            },
        }
    }
}

/// Ordered (name, value) pairs; names and order are exactly the schema's.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureVector {
    names: Arc<[String]>,
    values: Vec<FeatureValue>,
}

impl FeatureVector {
    pub(crate) fn new(names: Arc<[String]>, values: Vec<FeatureValue>) -> Self {
        debug_assert_eq!(names.len(), values.len());
        Self { names, values }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn values(&self) -> &[FeatureValue] {
        &self.values
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &FeatureValue)> {
        self.names.iter().map(String::as_str).zip(self.values.iter())
    }

    pub fn get(&self, name: &str) -> Option<&FeatureValue> {
        self.names
            .iter()
            .position(|n| n == name)
            .map(|i| &self.values[i])
    }

    pub fn numeric(&self, name: &str) -> Option<f64> {
        self.get(name).and_then(FeatureValue::as_numeric)
    }

    pub fn label(&self, name: &str) -> Option<&str> {
        self.get(name)
            .and_then(FeatureValue::as_category)
            .map(|c| c.label.as_str())
    }

    /// Names of categorical features whose label fell outside the vocabulary.
    pub fn out_of_vocabulary(&self) -> Vec<&str> {
        self.iter()
            .filter(|(_, v)| {
                matches!(
                    v,
                    FeatureValue::Categorical(CategoryValue {
                        binding: CategoryBinding::OutOfVocabulary,
                        ..
                    })
                )
            })
            .map(|(name, _)| name)
            .collect()
    }

    /// Dense f32 row in schema order, for tensor-based scorers.
    pub fn encode(&self) -> Vec<f32> {
        self.values.iter().map(|v| v.model_input() as f32).collect()
    }
}

impl Serialize for FeatureVector {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        use serde::ser::SerializeMap;
        let mut map = serializer.serialize_map(Some(self.len()))?;
        for (name, value) in self.iter() {
            map.serialize_entry(name, value)?;
        }
        map.end()
    }
}
