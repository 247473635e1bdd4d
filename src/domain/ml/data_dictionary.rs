use super::frame::DataFrame;

/// Partitioned (and, once normalized, scaled) training data.
///
/// Owned and mutated by the data kitchen. The prediction model only reads the
/// train/test slots and fills `prediction_features`.
#[derive(Debug, Clone, Default)]
pub struct DataDictionary {
    pub train_features: DataFrame,
    pub train_labels: DataFrame,
    pub train_weights: Vec<f64>,
    pub test_features: DataFrame,
    pub test_labels: DataFrame,
    pub test_weights: Vec<f64>,
    pub prediction_features: Option<DataFrame>,
}

impl DataDictionary {
    pub fn train_len(&self) -> usize {
        self.train_features.nrows()
    }

    pub fn test_len(&self) -> usize {
        self.test_features.nrows()
    }

    pub fn has_test_set(&self) -> bool {
        self.test_len() > 0
    }
}
