//! Configuration module for rustfreqai.
//!
//! Configuration is read from a TOML file (path in `FREQAI_CONFIG`) and then
//! selectively overridden by environment variables. Every section validates
//! itself before a model is built from it.

mod feature_parameters;
mod training_parameters;

pub use feature_parameters::FeatureParameters;
pub use training_parameters::{DataSplitParameters, ModelTrainingParameters};

use crate::domain::errors::ConfigError;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::env;
use std::fmt;
use std::path::Path;
use std::str::FromStr;

/// Regression backend behind the prediction model
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelKind {
    #[default]
    GradientBoosting,
    RandomForest,
}

impl FromStr for ModelKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().replace('-', "_").as_str() {
            "gradient_boosting" | "gbm" => Ok(ModelKind::GradientBoosting),
            "random_forest" | "rf" => Ok(ModelKind::RandomForest),
            _ => Err(ConfigError::UnknownModel(s.to_string())),
        }
    }
}

impl fmt::Display for ModelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ModelKind::GradientBoosting => write!(f, "gradient_boosting"),
            ModelKind::RandomForest => write!(f, "random_forest"),
        }
    }
}

/// Prediction model configuration.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct FreqaiConfig {
    /// Free-form name of this model setup, used in logs and saved model names
    pub identifier: String,
    pub model: ModelKind,
    pub feature_parameters: FeatureParameters,
    pub data_split_parameters: DataSplitParameters,
    pub model_training_parameters: ModelTrainingParameters,
}

impl FreqaiConfig {
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content).context("Failed to parse model config")?;
        config.validate().context("Invalid model config")?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {:?}", path))?;
        Self::from_toml_str(&content)
    }

    /// Load configuration from `FREQAI_CONFIG` (if set) and environment overrides.
    pub fn from_env() -> Result<Self> {
        let mut config = match env::var("FREQAI_CONFIG") {
            Ok(path) => Self::from_file(Path::new(&path))?,
            Err(_) => Self::default(),
        };
        config.apply_overrides(|key| env::var(key).ok())?;
        config.validate().context("Invalid model config")?;
        Ok(config)
    }

    /// Apply `FREQAI_*` overrides from `lookup`.
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<()> {
        if let Some(model) = lookup("FREQAI_MODEL") {
            self.model = model.parse().context("Failed to parse FREQAI_MODEL")?;
        }
        if let Some(identifier) = lookup("FREQAI_IDENTIFIER") {
            self.identifier = identifier;
        }
        if let Some(period) = Self::parse::<usize>(&lookup, "FREQAI_PERIOD")? {
            self.feature_parameters.period = period;
        }
        if let Some(test_size) = Self::parse::<f64>(&lookup, "FREQAI_TEST_SIZE")? {
            self.data_split_parameters.test_size = test_size;
        }
        if let Some(seed) = Self::parse::<u64>(&lookup, "FREQAI_RANDOM_SEED")? {
            self.model_training_parameters.random_seed = seed;
        }
        if let Some(iterations) = Self::parse::<usize>(&lookup, "FREQAI_ITERATIONS")? {
            self.model_training_parameters.iterations = iterations;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.feature_parameters.validate()?;
        self.data_split_parameters.validate()?;
        self.model_training_parameters.validate()?;
        Ok(())
    }

    fn parse<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Result<Option<T>>
    where
        T: FromStr,
        T::Err: std::error::Error + Send + Sync + 'static,
    {
        lookup(key)
            .map(|value| {
                value
                    .trim()
                    .parse::<T>()
                    .context(format!("Failed to parse {}", key))
            })
            .transpose()
    }
}
