use crate::domain::errors::ModelError;
use crate::domain::ml::{DataDictionary, DataFrame, Series};
use crate::domain::ports::DataKitchen;
use ndarray::Array2;

/// Interface of a prediction model plugged into the training pipeline.
///
/// Implementations are selected at configuration time
/// (see `PredictionModelFactory`) and driven per trading pair.
pub trait PredictionModel: Send + Sync {
    /// Derive the label series for a full training window.
    fn make_labels(&self, dataframe: &DataFrame) -> Result<Series, ModelError>;

    /// Filter, split, normalize and fit on one pair's training window.
    fn train(
        &mut self,
        unfiltered: &DataFrame,
        pair: &str,
        dk: &mut dyn DataKitchen,
    ) -> Result<TrainingReport, ModelError>;

    /// Predict labels for `unfiltered`, denormalized to the training label range.
    fn predict(
        &self,
        unfiltered: &DataFrame,
        dk: &mut dyn DataKitchen,
        first: bool,
    ) -> Result<Prediction, ModelError>;

    /// Hook for extra output columns on the frame returned to the caller.
    /// The default returns it unchanged.
    fn return_values(
        &self,
        dataframe: DataFrame,
        _dk: &dyn DataKitchen,
    ) -> Result<DataFrame, ModelError> {
        Ok(dataframe)
    }

    fn is_trained(&self) -> bool;

    /// Get model name/type
    fn name(&self) -> &str;
}

/// Output of `PredictionModel::predict`.
#[derive(Debug, Clone, PartialEq)]
pub struct Prediction {
    /// One column per label, in `label_list` order
    pub predictions: DataFrame,
    /// 1 where the row can be trusted, 0 where data was missing or unfamiliar
    pub do_predict: Vec<i8>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TrainingReport {
    pub pair: String,
    pub feature_count: usize,
    pub train_rows: usize,
    pub test_rows: usize,
}

/// A fitted regressor.
pub trait Regressor: Send + Sync {
    /// Raw predictions in normalized label space, one column per label.
    fn predict(&self, features: &DataFrame) -> Result<Array2<f64>, ModelError>;

    /// Labels the regressor was fitted on, in output column order.
    fn labels(&self) -> &[String];
}

/// Fits a `Regressor` on a normalized data dictionary.
pub trait RegressorBackend: Send + Sync {
    type Model: Regressor;

    fn fit(&self, data: &DataDictionary) -> Result<Self::Model, ModelError>;

    fn name(&self) -> &str;
}
