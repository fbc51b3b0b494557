//! Raw transaction records and typed field access.
//!
//! A record is whatever the caller sent: any subset of fields, any scalar
//! type per field. Every lookup resolves to a [`Field`] so callers handle
//! "present with type T, or absent" explicitly instead of casting.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Number, Value};

/// One incoming transaction: field name → untyped scalar.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RawRecord {
    fields: Map<String, Value>,
}

/// A single field lookup, resolved to what was actually supplied.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Field<'a> {
    Absent,
    Null,
    Number(&'a Number),
    Text(&'a str),
    Bool(bool),
    /// Arrays and objects: present, but not a scalar.
    Other(&'a Value),
}

impl RawRecord {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_map(fields: Map<String, Value>) -> Self {
        Self { fields }
    }

    /// Builder used by callers assembling records in code.
    pub fn with(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.fields.insert(name.into(), value.into());
        self
    }

    pub fn get(&self, name: &str) -> Field<'_> {
        match self.fields.get(name) {
            None => Field::Absent,
            Some(Value::Null) => Field::Null,
            Some(Value::Number(n)) => Field::Number(n),
            Some(Value::String(s)) => Field::Text(s),
            Some(Value::Bool(b)) => Field::Bool(*b),
            Some(other) => Field::Other(other),
        }
    }

    /// Key present, whatever its value (including null).
    pub fn contains(&self, name: &str) -> bool {
        self.fields.contains_key(name)
    }
}

impl<K: Into<String>, V: Into<Value>> FromIterator<(K, V)> for RawRecord {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            fields: iter
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }
}

impl<'a> Field<'a> {
    pub fn is_present(&self) -> bool {
        !matches!(self, Field::Absent)
    }

    /// Lenient numeric coercion. Numbers pass through, numeric strings are
    /// parsed, booleans become 1/0. Anything unparseable or non-finite is `None`.
    pub fn as_number(&self) -> Option<f64> {
        let value = match self {
            Field::Number(n) => n.as_f64()?,
            Field::Text(s) => s.trim().parse::<f64>().ok()?,
            Field::Bool(b) => f64::from(u8::from(*b)),
            Field::Absent | Field::Null | Field::Other(_) => return None,
        };
        value.is_finite().then_some(value)
    }

    /// String rendering of a present, non-null value. Numbers keep their JSON
    /// spelling, so `63.0` stays `"63.0"` and `12345` stays `"12345"`.
    pub fn as_label(&self) -> Option<String> {
        match self {
            Field::Absent | Field::Null => None,
            Field::Number(n) => Some(n.to_string()),
            Field::Text(s) => Some((*s).to_string()),
            Field::Bool(b) => Some(b.to_string()),
            Field::Other(v) => Some(v.to_string()),
        }
    }
}
