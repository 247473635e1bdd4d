use crate::domain::errors::ModelError;
use crate::domain::ml::{DataDictionary, DataFrame, NormalizationMetadata};

/// Data preparation collaborator of a prediction model.
///
/// Owns feature discovery, filtering, partitioning, normalization and the
/// do-predict flags. A prediction model only sequences these calls and fits
/// or runs its regressor on the results.
pub trait DataKitchen: Send {
    /// Feature columns recorded by the last `find_features` call.
    fn training_features_list(&self) -> &[String];

    /// Label columns, in model output order.
    fn label_list(&self) -> &[String];

    /// Discover and record the feature columns present in `dataframe`.
    fn find_features(&mut self, dataframe: &DataFrame) -> Result<(), ModelError>;

    /// Select `features` (and `labels` when given) and handle missing values.
    ///
    /// With `training_filter` rows containing missing values are dropped.
    /// Without it every row is kept, missing values are zero-filled and the
    /// row is flagged in `do_predict`.
    fn filter_features(
        &mut self,
        dataframe: &DataFrame,
        features: &[String],
        labels: Option<&[String]>,
        training_filter: bool,
    ) -> Result<(DataFrame, Option<DataFrame>), ModelError>;

    fn make_train_test_datasets(
        &mut self,
        features: DataFrame,
        labels: DataFrame,
    ) -> Result<DataDictionary, ModelError>;

    /// Fit the label distribution of the current train partition.
    fn fit_labels(&mut self) -> Result<(), ModelError>;

    /// Normalize every partition with bounds measured on the train partition only.
    fn normalize_data(&mut self, data: DataDictionary) -> Result<DataDictionary, ModelError>;

    /// Normalize prediction features with the stored training bounds.
    fn normalize_data_from_metadata(&self, features: DataFrame) -> Result<DataFrame, ModelError>;

    /// Optional cleaning/analysis after normalization at training time.
    fn data_cleaning_train(&mut self) -> Result<(), ModelError> {
        Ok(())
    }

    /// Optional outlier/availability flagging of normalized prediction features.
    fn data_cleaning_predict(&mut self, _features: &DataFrame) -> Result<(), ModelError> {
        Ok(())
    }

    fn data_dictionary(&self) -> &DataDictionary;

    fn data_dictionary_mut(&mut self) -> &mut DataDictionary;

    /// Bounds and convention of the last `normalize_data` call.
    fn normalization(&self) -> &NormalizationMetadata;

    /// 1 where a prediction row can be trusted, 0 otherwise.
    fn do_predict(&self) -> &[i8];
}
