//! Feature and label parameters.
//!
//! Controls how labels are derived, which columns count as features and how
//! the data kitchen weights, normalizes and cleans the data.

use crate::domain::errors::ConfigError;
use crate::domain::ml::NormalizationConvention;
use crate::domain::ml::feature_registry::{DEFAULT_FEATURE_PREFIX, DEFAULT_LABEL};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FeatureParameters {
    /// Look-ahead window (in candles) of the forward mean return label
    pub period: usize,
    /// Label columns, in model output order
    pub label_list: Vec<String>,
    /// Columns starting with this prefix are training features
    pub feature_prefix: String,
    /// Exponential recency weighting of samples (0 = uniform weights)
    pub weight_factor: f64,
    /// Dissimilarity index threshold; rows above it get `do_predict = 0`
    pub di_threshold: Option<f64>,
    pub normalization: NormalizationConvention,
}

impl Default for FeatureParameters {
    fn default() -> Self {
        Self {
            period: 24,
            label_list: vec![DEFAULT_LABEL.to_string()],
            feature_prefix: DEFAULT_FEATURE_PREFIX.to_string(),
            weight_factor: 0.0,
            di_threshold: None,
            normalization: NormalizationConvention::SymmetricUnit,
        }
    }
}

impl FeatureParameters {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.period == 0 {
            return Err(ConfigError::NotPositive {
                field: "feature_parameters.period".to_string(),
                value: 0.0,
            });
        }

        if self.label_list.is_empty() || self.label_list.iter().any(|l| l.is_empty()) {
            return Err(ConfigError::Empty {
                field: "feature_parameters.label_list".to_string(),
            });
        }

        if self.feature_prefix.is_empty() {
            return Err(ConfigError::Empty {
                field: "feature_parameters.feature_prefix".to_string(),
            });
        }

        if !self.weight_factor.is_finite() || self.weight_factor < 0.0 {
            return Err(ConfigError::OutOfRange {
                field: "feature_parameters.weight_factor".to_string(),
                value: self.weight_factor,
                range: "[0, inf)".to_string(),
            });
        }

        if let Some(threshold) = self.di_threshold
            && !(threshold.is_finite() && threshold > 0.0)
        {
            return Err(ConfigError::NotPositive {
                field: "feature_parameters.di_threshold".to_string(),
                value: threshold,
            });
        }

        Ok(())
    }
}
