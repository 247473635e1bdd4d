use thiserror::Error;

/// Errors raised while deriving labels, training or predicting.
///
/// Collaborator and backend failures are surfaced unchanged through `?`;
/// the prediction model never retries or recovers locally.
#[derive(Debug, Error)]
pub enum ModelError {
    #[error("Model has not been trained yet")]
    NotTrained,

    #[error("Label mismatch: trained on {expected:?}, asked to predict {actual:?}")]
    LabelMismatch {
        expected: Vec<String>,
        actual: Vec<String>,
    },

    #[error("Normalization convention mismatch: expected {expected}, kitchen used {actual}")]
    ConventionMismatch { expected: String, actual: String },

    #[error("Column not found: {0}")]
    MissingColumn(String),

    #[error("Shape mismatch in {context}: expected {expected}, got {actual}")]
    ShapeMismatch {
        context: String,
        expected: usize,
        actual: usize,
    },

    #[error("No usable rows left after {stage}")]
    EmptyDataset { stage: String },

    #[error("No feature columns found (expected names starting with '{prefix}')")]
    NoFeatures { prefix: String },

    #[error("Model fit failed: {0}")]
    Fit(String),

    #[error("Inference failed: {0}")]
    Inference(String),

    #[error("Invalid configuration: {0}")]
    Config(#[from] ConfigError),
}

/// Errors related to configuration validation
#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("Invalid value: {field} = {value}. Must be positive")]
    NotPositive { field: String, value: f64 },

    #[error("Invalid fraction: {field} = {value}. Must be in {range}")]
    OutOfRange {
        field: String,
        value: f64,
        range: String,
    },

    #[error("Invalid {field}: must not be empty")]
    Empty { field: String },

    #[error("Unknown model kind: {0}. Must be 'gradient_boosting' or 'random_forest'")]
    UnknownModel(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_label_mismatch_formatting() {
        let error = ModelError::LabelMismatch {
            expected: vec!["s".to_string()],
            actual: vec!["s".to_string(), "t".to_string()],
        };

        let msg = error.to_string();
        assert!(msg.contains("\"s\""));
        assert!(msg.contains("\"t\""));
    }

    #[test]
    fn test_config_error_converts_into_model_error() {
        let error: ModelError = ConfigError::NotPositive {
            field: "period".to_string(),
            value: 0.0,
        }
        .into();

        assert!(matches!(error, ModelError::Config(_)));
        assert!(error.to_string().contains("period"));
    }
}
