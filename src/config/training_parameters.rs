//! Train/test split and regression hyperparameters.

use crate::domain::errors::ConfigError;
use serde::{Deserialize, Serialize};

/// How the kitchen partitions filtered data into train and test sets
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DataSplitParameters {
    /// Fraction of rows held out for evaluation / early stopping
    pub test_size: f64,
    /// Permute rows before splitting (otherwise the most recent rows are the test set)
    pub shuffle: bool,
    pub random_state: u64,
}

impl Default for DataSplitParameters {
    fn default() -> Self {
        Self {
            test_size: 0.25,
            shuffle: false,
            random_state: 1,
        }
    }
}

impl DataSplitParameters {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.test_size >= 0.0 && self.test_size < 1.0) {
            return Err(ConfigError::OutOfRange {
                field: "data_split_parameters.test_size".to_string(),
                value: self.test_size,
                range: "[0, 1)".to_string(),
            });
        }
        Ok(())
    }
}

/// Hyperparameters passed through to the regression backend.
///
/// The gradient boosting backend reads `iterations`, `learning_rate`,
/// `depth`, `min_samples_leaf`, `min_samples_split`, `subsample` and
/// `random_seed`. The random forest backend reads `n_trees`, `depth`,
/// `min_samples_leaf`, `min_samples_split` and `random_seed`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelTrainingParameters {
    pub iterations: usize,
    pub learning_rate: f64,
    pub depth: u16,
    pub min_samples_leaf: usize,
    pub min_samples_split: usize,
    pub subsample: f64,
    pub n_trees: usize,
    pub random_seed: u64,
}

impl Default for ModelTrainingParameters {
    fn default() -> Self {
        Self {
            iterations: 1000,
            learning_rate: 0.05,
            depth: 6,
            min_samples_leaf: 5,
            min_samples_split: 10,
            subsample: 1.0,
            n_trees: 100,
            random_seed: 42,
        }
    }
}

impl ModelTrainingParameters {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.iterations == 0 {
            return Err(ConfigError::NotPositive {
                field: "model_training_parameters.iterations".to_string(),
                value: 0.0,
            });
        }
        if self.n_trees == 0 {
            return Err(ConfigError::NotPositive {
                field: "model_training_parameters.n_trees".to_string(),
                value: 0.0,
            });
        }
        if self.depth == 0 {
            return Err(ConfigError::NotPositive {
                field: "model_training_parameters.depth".to_string(),
                value: 0.0,
            });
        }
        Self::validate_fraction("model_training_parameters.learning_rate", self.learning_rate)?;
        Self::validate_fraction("model_training_parameters.subsample", self.subsample)?;
        Ok(())
    }

    /// Validate a value is in range (0.0, 1.0]
    fn validate_fraction(field: &str, value: f64) -> Result<(), ConfigError> {
        if !(value > 0.0 && value <= 1.0) {
            return Err(ConfigError::OutOfRange {
                field: field.to_string(),
                value,
                range: "(0, 1]".to_string(),
            });
        }
        Ok(())
    }
}
