//! Historical aggregates behind the interaction ratio features.

use crate::error::ArtifactError;
use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;
use tracing::{info, warn};

/// Global mean used when no statistics artifact is deployed.
pub const FALLBACK_GLOBAL_MEAN: f64 = 100.0;

#[derive(Debug, Deserialize)]
struct StatsFile {
    device_avg: HashMap<String, f64>,
    browser_max: HashMap<String, f64>,
    email_avg: HashMap<String, f64>,
    global_mean: f64,
}

/// Immutable lookup tables keyed by lowercased device / browser / email domain.
#[derive(Debug, Clone, PartialEq)]
pub struct ReferenceStats {
    device_avg: HashMap<String, f64>,
    browser_max: HashMap<String, f64>,
    email_avg: HashMap<String, f64>,
    global_mean: f64,
}

impl Default for ReferenceStats {
    fn default() -> Self {
        Self {
            device_avg: HashMap::new(),
            browser_max: HashMap::new(),
            email_avg: HashMap::new(),
            global_mean: FALLBACK_GLOBAL_MEAN,
        }
    }
}

impl ReferenceStats {
    /// Load from `path`. An absent file degrades to [`ReferenceStats::default`]
    /// with a warning; a present but malformed file is an error.
    pub fn load_or_default(path: &Path) -> Result<Self, ArtifactError> {
        if !path.exists() {
            warn!(
                path = %path.display(),
                global_mean = FALLBACK_GLOBAL_MEAN,
                "reference statistics not found; ratio features use fallback mean"
            );
            return Ok(Self::default());
        }
        let data = std::fs::read_to_string(path).map_err(|source| ArtifactError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let stats = Self::from_json_str(&data)?;
        info!(
            path = %path.display(),
            devices = stats.device_avg.len(),
            browsers = stats.browser_max.len(),
            email_domains = stats.email_avg.len(),
            global_mean = stats.global_mean,
            "reference statistics loaded"
        );
        Ok(stats)
    }

    pub fn from_json_str(data: &str) -> Result<Self, ArtifactError> {
        let file: StatsFile = serde_json::from_str(data)?;
        Self::new(file.device_avg, file.browser_max, file.email_avg, file.global_mean)
    }

    /// Keys are lowercased here so lookups match the transformer's keys.
    pub fn new(
        device_avg: HashMap<String, f64>,
        browser_max: HashMap<String, f64>,
        email_avg: HashMap<String, f64>,
        global_mean: f64,
    ) -> Result<Self, ArtifactError> {
        if !global_mean.is_finite() {
            return Err(ArtifactError::InvalidStats(format!(
                "global_mean must be finite, got {global_mean}"
            )));
        }
        Ok(Self {
            device_avg: normalize("device_avg", device_avg)?,
            browser_max: normalize("browser_max", browser_max)?,
            email_avg: normalize("email_avg", email_avg)?,
            global_mean,
        })
    }

    pub fn device_avg(&self, device: &str) -> f64 {
        self.device_avg.get(device).copied().unwrap_or(self.global_mean)
    }

    pub fn browser_max(&self, browser: &str) -> f64 {
        self.browser_max.get(browser).copied().unwrap_or(self.global_mean)
    }

    pub fn email_avg(&self, domain: &str) -> f64 {
        self.email_avg.get(domain).copied().unwrap_or(self.global_mean)
    }

    pub fn global_mean(&self) -> f64 {
        self.global_mean
    }
}

fn normalize(
    table: &str,
    values: HashMap<String, f64>,
) -> Result<HashMap<String, f64>, ArtifactError> {
    let mut out = HashMap::with_capacity(values.len());
    for (key, value) in values {
        if !value.is_finite() {
            return Err(ArtifactError::InvalidStats(format!(
                "{table}['{key}'] must be finite, got {value}"
            )));
        }
        let lowered = key.to_lowercase();
        if out.insert(lowered.clone(), value).is_some() {
            return Err(ArtifactError::InvalidStats(format!(
                "{table} has more than one key for '{lowered}' once lowercased"
            )));
        }
    }
    Ok(out)
}
