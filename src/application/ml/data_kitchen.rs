//! Default data kitchen.
//!
//! Turns an unfiltered dataframe into normalized train/test partitions and
//! prediction features:
//! - feature discovery by column prefix
//! - missing value filtering (drop for training, zero-fill + flag for inference)
//! - recency-weighted sequential (or seeded shuffled) train/test split
//! - min/max scaling fitted on the train partition only
//! - optional dissimilarity index flagging of unfamiliar prediction rows

use crate::config::{DataSplitParameters, FeatureParameters};
use crate::domain::errors::ModelError;
use crate::domain::ml::feature_registry::feature_columns;
use crate::domain::ml::{
    ColumnBounds, DataDictionary, DataFrame, NormalizationConvention, NormalizationMetadata,
};
use crate::domain::ports::DataKitchen;
use ndarray::{Array2, ArrayView1};
use rand::SeedableRng;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rayon::prelude::*;
use statrs::statistics::{Data, Distribution};
use std::collections::HashMap;
use tracing::{debug, info, warn};

/// Mean and standard deviation of a label on the train partition.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LabelStatistics {
    pub mean: f64,
    pub std: f64,
}

pub struct FreqaiDataKitchen {
    feature_parameters: FeatureParameters,
    split_parameters: DataSplitParameters,
    training_features_list: Vec<String>,
    label_list: Vec<String>,
    data_dictionary: DataDictionary,
    normalization: NormalizationMetadata,
    label_statistics: HashMap<String, LabelStatistics>,
    do_predict: Vec<i8>,
    avg_mean_dist: Option<f64>,
    di_values: Vec<f64>,
}

impl FreqaiDataKitchen {
    pub fn new(
        feature_parameters: FeatureParameters,
        split_parameters: DataSplitParameters,
    ) -> Result<Self, ModelError> {
        feature_parameters.validate()?;
        split_parameters.validate()?;

        let label_list = feature_parameters.label_list.clone();
        let normalization = NormalizationMetadata::new(feature_parameters.normalization);

        Ok(Self {
            feature_parameters,
            split_parameters,
            training_features_list: Vec::new(),
            label_list,
            data_dictionary: DataDictionary::default(),
            normalization,
            label_statistics: HashMap::new(),
            do_predict: Vec::new(),
            avg_mean_dist: None,
            di_values: Vec::new(),
        })
    }

    /// Label distribution fitted by the last `fit_labels` call.
    pub fn label_statistics(&self) -> &HashMap<String, LabelStatistics> {
        &self.label_statistics
    }

    /// Dissimilarity index of each row seen by the last `data_cleaning_predict`.
    pub fn di_values(&self) -> &[f64] {
        &self.di_values
    }

    /// Reinstate the scaling of a previously trained model, e.g. one loaded
    /// from disk. Training rows are not restored, so dissimilarity flagging
    /// stays off until the next `data_cleaning_train`.
    pub fn restore_metadata(
        &mut self,
        training_features: Vec<String>,
        normalization: NormalizationMetadata,
    ) {
        self.training_features_list = training_features;
        self.normalization = normalization;
        self.avg_mean_dist = None;
    }

    /// Sample weights favouring recent rows: `exp(-(n-1-i) / (weight_factor * n))`.
    fn sample_weights(&self, n: usize) -> Vec<f64> {
        let factor = self.feature_parameters.weight_factor;
        if factor <= 0.0 {
            return vec![1.0; n];
        }
        (0..n)
            .map(|i| (-((n - 1 - i) as f64) / (factor * n as f64)).exp())
            .collect()
    }

    fn fit_bounds(frame: &DataFrame) -> Result<HashMap<String, ColumnBounds>, ModelError> {
        frame
            .columns()
            .iter()
            .enumerate()
            .map(|(idx, name)| {
                ColumnBounds::from_values(frame.values().column(idx).iter())
                    .map(|bounds| (name.clone(), bounds))
                    .ok_or_else(|| ModelError::EmptyDataset {
                        stage: format!("normalizing column '{}'", name),
                    })
            })
            .collect()
    }

    fn apply_bounds(
        frame: &DataFrame,
        bounds: &HashMap<String, ColumnBounds>,
        convention: NormalizationConvention,
    ) -> Result<DataFrame, ModelError> {
        let mut values = frame.values().clone();
        for (idx, name) in frame.columns().iter().enumerate() {
            let b = bounds
                .get(name)
                .ok_or_else(|| ModelError::MissingColumn(name.clone()))?;
            values
                .column_mut(idx)
                .mapv_inplace(|v| convention.normalize(v, b));
        }
        DataFrame::new(frame.columns().to_vec(), values)
    }
}

fn euclidean(a: ArrayView1<f64>, b: ArrayView1<f64>) -> f64 {
    a.iter()
        .zip(b.iter())
        .map(|(x, y)| (x - y).powi(2))
        .sum::<f64>()
        .sqrt()
}

/// Average over rows of the mean distance to every training row (self included).
fn average_mean_distance(train: &Array2<f64>) -> f64 {
    let n = train.nrows();
    let total: f64 = (0..n)
        .into_par_iter()
        .map(|i| {
            let row = train.row(i);
            train.outer_iter().map(|other| euclidean(row, other)).sum::<f64>() / n as f64
        })
        .sum();
    total / n as f64
}

impl DataKitchen for FreqaiDataKitchen {
    fn training_features_list(&self) -> &[String] {
        &self.training_features_list
    }

    fn label_list(&self) -> &[String] {
        &self.label_list
    }

    fn find_features(&mut self, dataframe: &DataFrame) -> Result<(), ModelError> {
        let prefix = &self.feature_parameters.feature_prefix;
        let features = feature_columns(dataframe.columns(), prefix);
        if features.is_empty() {
            return Err(ModelError::NoFeatures {
                prefix: prefix.clone(),
            });
        }
        debug!("Found {} feature columns", features.len());
        self.training_features_list = features;
        Ok(())
    }

    fn filter_features(
        &mut self,
        dataframe: &DataFrame,
        features: &[String],
        labels: Option<&[String]>,
        training_filter: bool,
    ) -> Result<(DataFrame, Option<DataFrame>), ModelError> {
        let selected = dataframe.select(features)?;
        let selected_labels = labels.map(|l| dataframe.select(l)).transpose()?;

        if training_filter {
            let keep: Vec<usize> = (0..selected.nrows())
                .filter(|&r| {
                    selected.row_is_finite(r)
                        && selected_labels
                            .as_ref()
                            .is_none_or(|labels| labels.row_is_finite(r))
                })
                .collect();

            let dropped = selected.nrows() - keep.len();
            if dropped > 0 {
                info!(
                    "Dropped {} training rows with missing values ({} remain)",
                    dropped,
                    keep.len()
                );
            }
            if keep.is_empty() {
                return Err(ModelError::EmptyDataset {
                    stage: "feature filtering".to_string(),
                });
            }

            return Ok((
                selected.take_rows(&keep),
                selected_labels.map(|labels| labels.take_rows(&keep)),
            ));
        }

        // Inference: keep every row, zero-fill gaps and flag them
        let mut values = selected.values().clone();
        let mut do_predict = vec![1i8; values.nrows()];
        for (r, mut row) in values.outer_iter_mut().enumerate() {
            if row.iter().any(|v| !v.is_finite()) {
                do_predict[r] = 0;
                row.mapv_inplace(|v| if v.is_finite() { v } else { 0.0 });
            }
        }

        let flagged = do_predict.iter().filter(|&&d| d == 0).count();
        if flagged > 0 {
            debug!("{} prediction rows had missing values", flagged);
        }
        self.do_predict = do_predict;

        Ok((DataFrame::new(features.to_vec(), values)?, selected_labels))
    }

    fn make_train_test_datasets(
        &mut self,
        features: DataFrame,
        labels: DataFrame,
    ) -> Result<DataDictionary, ModelError> {
        let n = features.nrows();
        if n == 0 {
            return Err(ModelError::EmptyDataset {
                stage: "train/test split".to_string(),
            });
        }
        if labels.nrows() != n {
            return Err(ModelError::ShapeMismatch {
                context: "label rows".to_string(),
                expected: n,
                actual: labels.nrows(),
            });
        }

        let weights = self.sample_weights(n);
        let mut order: Vec<usize> = (0..n).collect();
        if self.split_parameters.shuffle {
            let mut rng = StdRng::seed_from_u64(self.split_parameters.random_state);
            order.shuffle(&mut rng);
        }

        // At least one row always stays in the train partition
        let test_len = ((n as f64 * self.split_parameters.test_size).ceil() as usize).min(n - 1);
        let (train_idx, test_idx) = order.split_at(n - test_len);

        let data = DataDictionary {
            train_features: features.take_rows(train_idx),
            train_labels: labels.take_rows(train_idx),
            train_weights: train_idx.iter().map(|&i| weights[i]).collect(),
            test_features: features.take_rows(test_idx),
            test_labels: labels.take_rows(test_idx),
            test_weights: test_idx.iter().map(|&i| weights[i]).collect(),
            prediction_features: None,
        };

        debug!(
            "Split {} rows into {} train / {} test",
            n,
            data.train_len(),
            data.test_len()
        );
        self.data_dictionary = data.clone();
        Ok(data)
    }

    fn fit_labels(&mut self) -> Result<(), ModelError> {
        let train_labels = &self.data_dictionary.train_labels;
        let mut statistics = HashMap::with_capacity(self.label_list.len());

        for label in &self.label_list {
            let values: Vec<f64> = train_labels
                .column(label)?
                .iter()
                .copied()
                .filter(|v| v.is_finite())
                .collect();
            let data = Data::new(values);
            let mean = data.mean().ok_or_else(|| ModelError::EmptyDataset {
                stage: format!("fitting label '{}'", label),
            })?;
            let std = data.std_dev().filter(|s| s.is_finite()).unwrap_or(0.0);
            debug!("Label {}: mean={:.6}, std={:.6}", label, mean, std);
            statistics.insert(label.clone(), LabelStatistics { mean, std });
        }

        self.label_statistics = statistics;
        Ok(())
    }

    fn normalize_data(&mut self, mut data: DataDictionary) -> Result<DataDictionary, ModelError> {
        let convention = self.feature_parameters.normalization;
        let mut metadata = NormalizationMetadata::new(convention);
        metadata.features = Self::fit_bounds(&data.train_features)?;
        metadata.labels = Self::fit_bounds(&data.train_labels)?;

        data.train_features = Self::apply_bounds(&data.train_features, &metadata.features, convention)?;
        data.test_features = Self::apply_bounds(&data.test_features, &metadata.features, convention)?;
        data.train_labels = Self::apply_bounds(&data.train_labels, &metadata.labels, convention)?;
        data.test_labels = Self::apply_bounds(&data.test_labels, &metadata.labels, convention)?;

        self.normalization = metadata;
        self.data_dictionary = data.clone();
        Ok(data)
    }

    fn normalize_data_from_metadata(&self, features: DataFrame) -> Result<DataFrame, ModelError> {
        Self::apply_bounds(
            &features,
            &self.normalization.features,
            self.normalization.convention,
        )
    }

    fn data_cleaning_train(&mut self) -> Result<(), ModelError> {
        if self.feature_parameters.di_threshold.is_none() {
            return Ok(());
        }

        let train = self.data_dictionary.train_features.values();
        if train.nrows() < 2 {
            warn!("Not enough training rows to compute the dissimilarity index");
            self.avg_mean_dist = None;
            return Ok(());
        }

        let avg = average_mean_distance(train);
        debug!("Average mean distance of training data: {:.6}", avg);
        self.avg_mean_dist = Some(avg);
        Ok(())
    }

    fn data_cleaning_predict(&mut self, features: &DataFrame) -> Result<(), ModelError> {
        let (Some(threshold), Some(avg_mean_dist)) =
            (self.feature_parameters.di_threshold, self.avg_mean_dist)
        else {
            return Ok(());
        };

        if self.do_predict.len() != features.nrows() {
            self.do_predict = vec![1; features.nrows()];
        }

        let train = self.data_dictionary.train_features.values();
        let di: Vec<f64> = (0..features.nrows())
            .into_par_iter()
            .map(|r| {
                let row = features.values().row(r);
                let nearest = train
                    .outer_iter()
                    .map(|t| euclidean(row, t))
                    .fold(f64::INFINITY, f64::min);
                if avg_mean_dist > 0.0 {
                    nearest / avg_mean_dist
                } else {
                    0.0
                }
            })
            .collect();

        let mut outliers = 0;
        for (flag, value) in self.do_predict.iter_mut().zip(&di) {
            if *value > threshold {
                *flag = 0;
                outliers += 1;
            }
        }
        if outliers > 0 {
            info!(
                "Dissimilarity index flagged {} of {} prediction rows",
                outliers,
                di.len()
            );
        }

        self.di_values = di;
        Ok(())
    }

    fn data_dictionary(&self) -> &DataDictionary {
        &self.data_dictionary
    }

    fn data_dictionary_mut(&mut self) -> &mut DataDictionary {
        &mut self.data_dictionary
    }

    fn normalization(&self) -> &NormalizationMetadata {
        &self.normalization
    }

    fn do_predict(&self) -> &[i8] {
        &self.do_predict
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kitchen(test_size: f64) -> FreqaiDataKitchen {
        FreqaiDataKitchen::new(
            FeatureParameters::default(),
            DataSplitParameters {
                test_size,
                ..Default::default()
            },
        )
        .unwrap()
    }

    fn frame(columns: &[(&str, Vec<f64>)]) -> DataFrame {
        DataFrame::from_columns(
            columns
                .iter()
                .map(|(name, values)| (name.to_string(), values.clone()))
                .collect(),
        )
        .unwrap()
    }

    fn names(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_find_features_by_prefix() {
        let mut dk = kitchen(0.25);
        let df = frame(&[
            ("close", vec![1.0]),
            ("%-b", vec![1.0]),
            ("%-a", vec![1.0]),
        ]);
        dk.find_features(&df).unwrap();
        assert_eq!(dk.training_features_list(), names(&["%-b", "%-a"]).as_slice());

        let no_features = frame(&[("close", vec![1.0])]);
        assert!(matches!(
            dk.find_features(&no_features),
            Err(ModelError::NoFeatures { .. })
        ));
    }

    #[test]
    fn test_training_filter_drops_incomplete_rows() {
        let mut dk = kitchen(0.25);
        let df = frame(&[
            ("%-a", vec![1.0, f64::NAN, 3.0, 4.0]),
            ("s", vec![0.1, 0.2, f64::INFINITY, 0.4]),
        ]);

        let (features, labels) = dk
            .filter_features(&df, &names(&["%-a"]), Some(names(&["s"]).as_slice()), true)
            .unwrap();
        let labels = labels.unwrap();

        assert_eq!(features.nrows(), 2);
        assert_eq!(features.column("%-a").unwrap().to_vec(), vec![1.0, 4.0]);
        assert_eq!(labels.column("s").unwrap().to_vec(), vec![0.1, 0.4]);
    }

    #[test]
    fn test_training_filter_everything_missing() {
        let mut dk = kitchen(0.25);
        let df = frame(&[("%-a", vec![f64::NAN]), ("s", vec![1.0])]);
        let result = dk.filter_features(&df, &names(&["%-a"]), Some(names(&["s"]).as_slice()), true);
        assert!(matches!(result, Err(ModelError::EmptyDataset { .. })));
    }

    #[test]
    fn test_inference_filter_zero_fills_and_flags() {
        let mut dk = kitchen(0.25);
        let df = frame(&[
            ("%-a", vec![1.0, f64::NAN, 3.0]),
            ("%-b", vec![1.0, 2.0, f64::NEG_INFINITY]),
        ]);

        let (features, labels) = dk
            .filter_features(&df, &names(&["%-a", "%-b"]), None, false)
            .unwrap();

        assert!(labels.is_none());
        assert_eq!(features.nrows(), 3);
        assert_eq!(features.values()[[1, 0]], 0.0);
        assert_eq!(features.values()[[2, 1]], 0.0);
        assert_eq!(dk.do_predict(), &[1, 0, 0]);
    }

    #[test]
    fn test_sequential_split_holds_out_tail() {
        let mut dk = kitchen(0.25);
        let features = frame(&[("%-a", (0..8).map(|i| i as f64).collect())]);
        let labels = frame(&[("s", (0..8).map(|i| i as f64 * 10.0).collect())]);

        let data = dk.make_train_test_datasets(features, labels).unwrap();

        assert_eq!(data.train_len(), 6);
        assert_eq!(data.test_len(), 2);
        assert_eq!(data.test_features.column("%-a").unwrap().to_vec(), vec![6.0, 7.0]);
        assert_eq!(data.test_labels.column("s").unwrap().to_vec(), vec![60.0, 70.0]);
        assert!(data.train_weights.iter().all(|&w| w == 1.0));
    }

    #[test]
    fn test_split_keeps_one_training_row() {
        let mut dk = kitchen(0.9);
        let features = frame(&[("%-a", vec![1.0, 2.0])]);
        let labels = frame(&[("s", vec![1.0, 2.0])]);
        let data = dk.make_train_test_datasets(features, labels).unwrap();
        assert_eq!(data.train_len(), 1);
        assert_eq!(data.test_len(), 1);
    }

    #[test]
    fn test_shuffled_split_is_reproducible() {
        let params = DataSplitParameters {
            test_size: 0.3,
            shuffle: true,
            random_state: 7,
        };
        let features = frame(&[("%-a", (0..20).map(|i| i as f64).collect())]);
        let labels = frame(&[("s", (0..20).map(|i| i as f64).collect())]);

        let mut first = FreqaiDataKitchen::new(FeatureParameters::default(), params.clone()).unwrap();
        let mut second = FreqaiDataKitchen::new(FeatureParameters::default(), params).unwrap();
        let a = first
            .make_train_test_datasets(features.clone(), labels.clone())
            .unwrap();
        let b = second.make_train_test_datasets(features, labels).unwrap();

        assert_eq!(a.test_features, b.test_features);
        assert_eq!(a.test_len(), 6);
    }

    #[test]
    fn test_recency_weights() {
        let dk = FreqaiDataKitchen::new(
            FeatureParameters {
                weight_factor: 0.5,
                ..Default::default()
            },
            DataSplitParameters::default(),
        )
        .unwrap();

        let weights = dk.sample_weights(10);
        assert!((weights[9] - 1.0).abs() < 1e-12);
        assert!(weights.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn test_normalization_uses_train_partition_only() {
        let mut dk = kitchen(0.25);
        // Test partition (last two rows) carries far larger values
        let features = frame(&[("%-a", vec![0.0, 1.0, 2.0, 3.0, 4.0, 5.0, 50.0, 60.0])]);
        let labels = frame(&[("s", vec![-0.01, 0.0, 0.01, 0.02, 0.03, 0.04, 0.5, -0.5])]);

        let data = dk.make_train_test_datasets(features, labels).unwrap();
        let data = dk.normalize_data(data).unwrap();

        let meta = dk.normalization();
        assert_eq!(meta.labels_min("s"), Some(-0.01));
        assert_eq!(meta.labels_max("s"), Some(0.04));
        assert_eq!(meta.feature_bounds("%-a"), Some(&ColumnBounds::new(0.0, 5.0)));

        let train_labels = data.train_labels.column("s").unwrap();
        assert!(train_labels.iter().all(|v| (-1.0..=1.0).contains(v)));
        // Test values are scaled with train bounds, so they leave the range
        assert!(data.test_features.column("%-a").unwrap()[0] > 1.0);
    }

    #[test]
    fn test_normalize_from_metadata_unknown_column() {
        let mut dk = kitchen(0.0);
        let features = frame(&[("%-a", vec![0.0, 1.0])]);
        let labels = frame(&[("s", vec![0.0, 1.0])]);
        let data = dk.make_train_test_datasets(features, labels).unwrap();
        dk.normalize_data(data).unwrap();

        let scaled = dk
            .normalize_data_from_metadata(frame(&[("%-a", vec![0.5])]))
            .unwrap();
        assert_eq!(scaled.values()[[0, 0]], 0.0);

        let unknown = dk.normalize_data_from_metadata(frame(&[("%-z", vec![0.5])]));
        assert!(matches!(unknown, Err(ModelError::MissingColumn(_))));
    }

    #[test]
    fn test_fit_labels_statistics() {
        let mut dk = kitchen(0.0);
        let features = frame(&[("%-a", vec![1.0, 2.0, 3.0, 4.0])]);
        let labels = frame(&[("s", vec![1.0, 2.0, 3.0, 4.0])]);
        dk.make_train_test_datasets(features, labels).unwrap();
        dk.fit_labels().unwrap();

        let stats = dk.label_statistics()["s"];
        assert!((stats.mean - 2.5).abs() < 1e-12);
        assert!(stats.std > 1.0 && stats.std < 1.5);
    }

    #[test]
    fn test_dissimilarity_index_flags_far_rows() {
        let mut dk = FreqaiDataKitchen::new(
            FeatureParameters {
                di_threshold: Some(1.0),
                ..Default::default()
            },
            DataSplitParameters {
                test_size: 0.0,
                ..Default::default()
            },
        )
        .unwrap();

        let features = frame(&[
            ("%-a", (0..10).map(|i| i as f64).collect()),
            ("%-b", (0..10).map(|i| (i % 3) as f64).collect()),
        ]);
        let labels = frame(&[("s", (0..10).map(|i| i as f64).collect())]);
        let data = dk.make_train_test_datasets(features, labels).unwrap();
        dk.normalize_data(data).unwrap();
        dk.data_cleaning_train().unwrap();

        let incoming = frame(&[("%-a", vec![4.0, 400.0]), ("%-b", vec![1.0, 1.0])]);
        let (filtered, _) = dk
            .filter_features(&incoming, &names(&["%-a", "%-b"]), None, false)
            .unwrap();
        let normalized = dk.normalize_data_from_metadata(filtered).unwrap();
        dk.data_cleaning_predict(&normalized).unwrap();

        assert_eq!(dk.do_predict(), &[1, 0]);
        assert_eq!(dk.di_values().len(), 2);
    }
}
