//! Feature schema: output column order, categorical set, category vocabularies.

use crate::error::ArtifactError;
use crate::features::DERIVED_NUMERIC_FEATURES;
use serde::Deserialize;
use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::Arc;
use tracing::info;

/// On-disk layout. `features` and `categorical_features` are required.
#[derive(Debug, Deserialize)]
struct SchemaFile {
    features: Vec<String>,
    categorical_features: Vec<String>,
    #[serde(default)]
    category_vocabulary: Option<HashMap<String, Vec<String>>>,
}

/// Fixed category → index mapping a categorical feature was trained with.
/// Values are stored lowercased, matching how record labels are bound.
#[derive(Debug, Clone, PartialEq)]
pub struct Vocabulary {
    values: Vec<String>,
    index: HashMap<String, usize>,
}

impl Vocabulary {
    fn new(feature: &str, values: Vec<String>) -> Result<Self, ArtifactError> {
        let values: Vec<String> = values.iter().map(|v| v.to_lowercase()).collect();
        let mut index = HashMap::with_capacity(values.len());
        for (i, v) in values.iter().enumerate() {
            if index.insert(v.clone(), i).is_some() {
                return Err(ArtifactError::InvalidSchema(format!(
                    "vocabulary for '{feature}' lists '{v}' more than once"
                )));
            }
        }
        Ok(Self { values, index })
    }

    pub fn index_of(&self, value: &str) -> Option<usize> {
        self.index.get(value).copied()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// Immutable, validated schema. Shared across all transform calls.
#[derive(Debug, Clone)]
pub struct Schema {
    features: Arc<[String]>,
    categorical: HashSet<String>,
    vocabularies: HashMap<String, Vocabulary>,
}

impl Schema {
    /// Load and validate. Missing file, missing keys, or malformed JSON are errors.
    pub fn load(path: &Path) -> Result<Self, ArtifactError> {
        if !path.exists() {
            return Err(ArtifactError::NotFound {
                path: path.to_path_buf(),
            });
        }
        let data = std::fs::read_to_string(path).map_err(|source| ArtifactError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let schema = Self::from_json_str(&data)?;
        info!(
            path = %path.display(),
            features = schema.len(),
            categorical = schema.categorical.len(),
            vocabularies = schema.vocabularies.len(),
            "feature schema loaded"
        );
        Ok(schema)
    }

    pub fn from_json_str(data: &str) -> Result<Self, ArtifactError> {
        let file: SchemaFile = serde_json::from_str(data)?;
        Self::new(
            file.features,
            file.categorical_features,
            file.category_vocabulary.unwrap_or_default(),
        )
    }

    pub fn new(
        features: Vec<String>,
        categorical_features: Vec<String>,
        category_vocabulary: HashMap<String, Vec<String>>,
    ) -> Result<Self, ArtifactError> {
        if features.is_empty() {
            return Err(ArtifactError::InvalidSchema(
                "`features` must not be empty".to_string(),
            ));
        }

        let mut seen = HashSet::with_capacity(features.len());
        for name in &features {
            if !seen.insert(name.as_str()) {
                return Err(ArtifactError::InvalidSchema(format!(
                    "feature '{name}' is listed more than once"
                )));
            }
        }

        let mut categorical = HashSet::with_capacity(categorical_features.len());
        for name in categorical_features {
            if !seen.contains(name.as_str()) {
                return Err(ArtifactError::InvalidSchema(format!(
                    "categorical feature '{name}' is not in `features`"
                )));
            }
            if DERIVED_NUMERIC_FEATURES.contains(&name.as_str()) {
                return Err(ArtifactError::InvalidSchema(format!(
                    "derived feature '{name}' is numeric and cannot be categorical"
                )));
            }
            categorical.insert(name);
        }

        let mut vocabularies = HashMap::with_capacity(category_vocabulary.len());
        for (name, values) in category_vocabulary {
            if !categorical.contains(&name) {
                return Err(ArtifactError::InvalidSchema(format!(
                    "vocabulary given for '{name}', which is not a categorical feature"
                )));
            }
            let vocab = Vocabulary::new(&name, values)?;
            vocabularies.insert(name, vocab);
        }

        Ok(Self {
            features: features.into(),
            categorical,
            vocabularies,
        })
    }

    /// Ordered output columns.
    pub fn features(&self) -> &[String] {
        &self.features
    }

    /// Shared handle on the column names; every feature vector points at it.
    pub fn feature_names(&self) -> Arc<[String]> {
        Arc::clone(&self.features)
    }

    pub fn len(&self) -> usize {
        self.features.len()
    }

    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }

    pub fn is_categorical(&self, name: &str) -> bool {
        self.categorical.contains(name)
    }

    pub fn categorical_features(&self) -> impl Iterator<Item = &str> {
        self.categorical.iter().map(String::as_str)
    }

    pub fn vocabulary(&self, name: &str) -> Option<&Vocabulary> {
        self.vocabularies.get(name)
    }
}
