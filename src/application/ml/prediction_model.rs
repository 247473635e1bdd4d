//! Prediction model adapter: sequences the data kitchen and a regression
//! backend into `make_labels` / `train` / `predict`.

use super::gradient_boosting::GradientBoostingBackend;
use super::predictor::{Prediction, PredictionModel, Regressor, RegressorBackend, TrainingReport};
use crate::config::FeatureParameters;
use crate::domain::errors::ModelError;
use crate::domain::ml::feature_registry::{CLOSE_COLUMN, DEFAULT_LABEL};
use crate::domain::ml::labels::forward_mean_return;
use crate::domain::ml::{DataFrame, NormalizationConvention, Series};
use crate::domain::ports::DataKitchen;
use tracing::{debug, info};

/// Convention the regressor's raw outputs are interpreted in.
pub const MODEL_CONVENTION: NormalizationConvention = NormalizationConvention::SymmetricUnit;

/// Lifecycle of the adapter's model handle.
pub enum ModelState<M> {
    Untrained,
    Trained(TrainedModel<M>),
}

pub struct TrainedModel<M> {
    pub model: M,
    pub pair: String,
    pub features: Vec<String>,
}

pub struct FreqaiPredictionModel<B: RegressorBackend> {
    feature_parameters: FeatureParameters,
    backend: B,
    state: ModelState<B::Model>,
}

pub type GbmPredictionModel = FreqaiPredictionModel<GradientBoostingBackend>;

impl<B: RegressorBackend> FreqaiPredictionModel<B> {
    pub fn new(feature_parameters: FeatureParameters, backend: B) -> Result<Self, ModelError> {
        feature_parameters.validate()?;
        Ok(Self {
            feature_parameters,
            backend,
            state: ModelState::Untrained,
        })
    }

    /// Wrap an already fitted model, e.g. one restored from disk.
    pub fn with_model(
        feature_parameters: FeatureParameters,
        backend: B,
        trained: TrainedModel<B::Model>,
    ) -> Result<Self, ModelError> {
        let mut adapter = Self::new(feature_parameters, backend)?;
        adapter.state = ModelState::Trained(trained);
        Ok(adapter)
    }

    pub fn model(&self) -> Result<&B::Model, ModelError> {
        match &self.state {
            ModelState::Trained(trained) => Ok(&trained.model),
            ModelState::Untrained => Err(ModelError::NotTrained),
        }
    }

    pub fn into_trained(self) -> Option<TrainedModel<B::Model>> {
        match self.state {
            ModelState::Trained(trained) => Some(trained),
            ModelState::Untrained => None,
        }
    }
}

impl<B: RegressorBackend> PredictionModel for FreqaiPredictionModel<B> {
    fn make_labels(&self, dataframe: &DataFrame) -> Result<Series, ModelError> {
        let close = dataframe.column(CLOSE_COLUMN)?.to_vec();
        let label = self
            .feature_parameters
            .label_list
            .first()
            .map_or(DEFAULT_LABEL, String::as_str);
        Ok(Series::new(
            label,
            forward_mean_return(&close, self.feature_parameters.period),
        ))
    }

    fn train(
        &mut self,
        unfiltered: &DataFrame,
        pair: &str,
        dk: &mut dyn DataKitchen,
    ) -> Result<TrainingReport, ModelError> {
        info!("-------------------- Starting training {} --------------------", pair);

        if dk.training_features_list().is_empty() {
            debug!("No feature list recorded yet, discovering features for {}", pair);
            dk.find_features(unfiltered)?;
        }
        let features_list = dk.training_features_list().to_vec();
        let label_list = dk.label_list().to_vec();

        let (features, labels) =
            dk.filter_features(unfiltered, &features_list, Some(label_list.as_slice()), true)?;
        let labels = labels.ok_or_else(|| ModelError::EmptyDataset {
            stage: "label filtering".to_string(),
        })?;

        let data_dictionary = dk.make_train_test_datasets(features, labels)?;
        dk.fit_labels()?;
        let data_dictionary = dk.normalize_data(data_dictionary)?;
        *dk.data_dictionary_mut() = data_dictionary;

        dk.data_cleaning_train()?;

        let data = dk.data_dictionary();
        let report = TrainingReport {
            pair: pair.to_string(),
            feature_count: data.train_features.ncols(),
            train_rows: data.train_len(),
            test_rows: data.test_len(),
        };
        info!("Training model on {} features", report.feature_count);
        info!("Training model on {} data points", report.train_rows);

        let model = self.backend.fit(data)?;
        self.state = ModelState::Trained(TrainedModel {
            model,
            pair: pair.to_string(),
            features: features_list,
        });

        info!("-------------------- done training {} --------------------", pair);
        Ok(report)
    }

    fn predict(
        &self,
        unfiltered: &DataFrame,
        dk: &mut dyn DataKitchen,
        first: bool,
    ) -> Result<Prediction, ModelError> {
        let ModelState::Trained(trained) = &self.state else {
            return Err(ModelError::NotTrained);
        };

        let label_list = dk.label_list().to_vec();
        if trained.model.labels() != label_list.as_slice() {
            return Err(ModelError::LabelMismatch {
                expected: trained.model.labels().to_vec(),
                actual: label_list,
            });
        }
        let convention = dk.normalization().convention;
        if convention != MODEL_CONVENTION {
            return Err(ModelError::ConventionMismatch {
                expected: MODEL_CONVENTION.to_string(),
                actual: convention.to_string(),
            });
        }

        dk.find_features(unfiltered)?;
        if let Some(missing) = trained
            .features
            .iter()
            .find(|name| !dk.training_features_list().contains(name))
        {
            return Err(ModelError::MissingColumn(missing.clone()));
        }
        // Select by the recorded list so columns come back in training order
        let (features, _) = dk.filter_features(unfiltered, &trained.features, None, false)?;
        let features = dk.normalize_data_from_metadata(features)?;
        dk.data_dictionary_mut().prediction_features = Some(features.clone());

        dk.data_cleaning_predict(&features)?;

        if first {
            info!(
                "First prediction for {} on {} rows",
                trained.pair,
                features.nrows()
            );
        } else {
            debug!("Predicting {} rows for {}", features.nrows(), trained.pair);
        }

        let mut raw = trained.model.predict(&features)?;
        if raw.ncols() != label_list.len() {
            return Err(ModelError::ShapeMismatch {
                context: "model output columns".to_string(),
                expected: label_list.len(),
                actual: raw.ncols(),
            });
        }

        let (lo, hi) = convention.range();
        let outside = raw.iter().filter(|v| **v < lo || **v > hi).count();
        if outside > 0 {
            debug!(
                "{} raw predictions outside [{}, {}] for {}",
                outside, lo, hi, trained.pair
            );
        }

        let metadata = dk.normalization();
        for (idx, label) in label_list.iter().enumerate() {
            let bounds = metadata
                .label_bounds(label)
                .ok_or_else(|| ModelError::MissingColumn(label.clone()))?;
            raw.column_mut(idx)
                .mapv_inplace(|v| convention.denormalize(v, bounds));
        }

        Ok(Prediction {
            predictions: DataFrame::new(label_list, raw)?,
            do_predict: dk.do_predict().to_vec(),
        })
    }

    fn is_trained(&self) -> bool {
        matches!(self.state, ModelState::Trained(_))
    }

    fn name(&self) -> &str {
        self.backend.name()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::ml::data_kitchen::FreqaiDataKitchen;
    use crate::config::DataSplitParameters;
    use crate::domain::ml::DataDictionary;
    use ndarray::Array2;

    /// Regressor that returns a fixed raw value for every row.
    struct Constant {
        labels: Vec<String>,
        raw: f64,
    }

    impl Regressor for Constant {
        fn predict(&self, features: &DataFrame) -> Result<Array2<f64>, ModelError> {
            Ok(Array2::from_elem((features.nrows(), self.labels.len()), self.raw))
        }

        fn labels(&self) -> &[String] {
            &self.labels
        }
    }

    struct ConstantBackend {
        raw: f64,
    }

    impl RegressorBackend for ConstantBackend {
        type Model = Constant;

        fn fit(&self, data: &DataDictionary) -> Result<Constant, ModelError> {
            Ok(Constant {
                labels: data.train_labels.columns().to_vec(),
                raw: self.raw,
            })
        }

        fn name(&self) -> &str {
            "constant"
        }
    }

    fn frame(n: usize) -> DataFrame {
        let close: Vec<f64> = (0..n).map(|i| 100.0 + i as f64).collect();
        let feature: Vec<f64> = (0..n).map(|i| (i as f64 * 0.3).sin()).collect();
        let label: Vec<f64> = (0..n).map(|i| i as f64 / n as f64 * 0.1 - 0.05).collect();
        DataFrame::from_columns(vec![
            ("close".to_string(), close),
            ("%-f".to_string(), feature),
            ("s".to_string(), label),
        ])
        .unwrap()
    }

    fn kitchen(params: &FeatureParameters) -> FreqaiDataKitchen {
        FreqaiDataKitchen::new(params.clone(), DataSplitParameters::default()).unwrap()
    }

    #[test]
    fn test_make_labels_uses_close_and_first_label() {
        let params = FeatureParameters {
            period: 2,
            label_list: vec!["&-target".to_string()],
            ..FeatureParameters::default()
        };
        let model = FreqaiPredictionModel::new(params, ConstantBackend { raw: 0.0 }).unwrap();
        let df = DataFrame::from_columns(vec![(
            "close".to_string(),
            vec![10.0, 11.0, 12.0, 13.0, 14.0],
        )])
        .unwrap();

        let labels = model.make_labels(&df).unwrap();
        assert_eq!(labels.name, "&-target");
        assert_eq!(labels.len(), 5);
        assert!(labels.values[0].is_nan());
        assert!((labels.values[1] - (12.5 / 11.0 - 1.0)).abs() < 1e-12);
        assert!((labels.values[2] - (13.5 / 12.0 - 1.0)).abs() < 1e-12);
        assert!(labels.values[3].is_nan());
    }

    #[test]
    fn test_make_labels_requires_close() {
        let model =
            FreqaiPredictionModel::new(FeatureParameters::default(), ConstantBackend { raw: 0.0 })
                .unwrap();
        let df = DataFrame::from_columns(vec![("open".to_string(), vec![1.0])]).unwrap();
        assert!(matches!(
            model.make_labels(&df),
            Err(ModelError::MissingColumn(c)) if c == "close"
        ));
    }

    #[test]
    fn test_predict_before_train_fails() {
        let params = FeatureParameters::default();
        let model = FreqaiPredictionModel::new(params.clone(), ConstantBackend { raw: 0.0 }).unwrap();
        let mut dk = kitchen(&params);
        assert!(!model.is_trained());
        assert!(matches!(
            model.predict(&frame(10), &mut dk, true),
            Err(ModelError::NotTrained)
        ));
        assert!(matches!(model.model(), Err(ModelError::NotTrained)));
    }

    #[test]
    fn test_raw_predictions_denormalize_with_label_bounds() {
        let params = FeatureParameters::default();
        let df = frame(40);
        for raw in [1.0, -1.0, 0.0, 1.5, 7.5, -3.0] {
            let mut model =
                FreqaiPredictionModel::new(params.clone(), ConstantBackend { raw }).unwrap();
            let mut dk = kitchen(&params);
            let report = model.train(&df, "BTC/USDT", &mut dk).unwrap();
            assert_eq!(report.feature_count, 1);
            assert_eq!(report.train_rows + report.test_rows, 40);

            let prediction = model.predict(&df, &mut dk, false).unwrap();
            let min = dk.normalization().labels_min("s").unwrap();
            let max = dk.normalization().labels_max("s").unwrap();
            let expected = ((raw + 1.0) * (max - min) / 2.0) + min;
            for value in prediction.predictions.column("s").unwrap() {
                assert!((value - expected).abs() < 1e-12, "raw {}: {} != {}", raw, value, expected);
            }
            assert_eq!(prediction.do_predict, vec![1; 40]);
        }
    }

    #[test]
    fn test_out_of_range_raw_is_not_saturated() {
        let params = FeatureParameters::default();
        let df = frame(40);
        let mut model = FreqaiPredictionModel::new(params.clone(), ConstantBackend { raw: 1.5 }).unwrap();
        let mut dk = kitchen(&params);
        model.train(&df, "BTC/USDT", &mut dk).unwrap();

        let prediction = model.predict(&df, &mut dk, false).unwrap();
        let max = dk.normalization().labels_max("s").unwrap();
        assert!(prediction.predictions.column("s").unwrap().iter().all(|v| *v > max));
    }

    #[test]
    fn test_features_are_selected_in_training_order() {
        let params = FeatureParameters::default();
        let df = frame(30);
        let second: Vec<f64> = (0..30).map(|i| (i as f64 * 0.7).cos()).collect();
        let df = df.with_column(&Series::new("%-g", second)).unwrap();

        let mut model = FreqaiPredictionModel::new(params.clone(), ConstantBackend { raw: 0.2 }).unwrap();
        let mut dk = kitchen(&params);
        model.train(&df, "ETH/USDT", &mut dk).unwrap();

        let swapped = df
            .select(&["s".to_string(), "%-g".to_string(), "close".to_string(), "%-f".to_string()])
            .unwrap();
        model.predict(&swapped, &mut dk, false).unwrap();
        let stored = dk.data_dictionary().prediction_features.as_ref().unwrap();
        assert_eq!(stored.columns(), ["%-f".to_string(), "%-g".to_string()]);

        let missing = df.select(&["close".to_string(), "%-g".to_string()]).unwrap();
        assert!(matches!(
            model.predict(&missing, &mut dk, false),
            Err(ModelError::MissingColumn(c)) if c == "%-f"
        ));
    }

    #[test]
    fn test_return_values_defaults_to_identity() {
        let params = FeatureParameters::default();
        let model = FreqaiPredictionModel::new(params.clone(), ConstantBackend { raw: 0.0 }).unwrap();
        let dk = kitchen(&params);
        let df = frame(5);
        assert_eq!(model.return_values(df.clone(), &dk).unwrap(), df);
    }

    #[test]
    fn test_predict_stores_prediction_features() {
        let params = FeatureParameters::default();
        let df = frame(30);
        let mut model = FreqaiPredictionModel::new(params.clone(), ConstantBackend { raw: 0.0 }).unwrap();
        let mut dk = kitchen(&params);
        model.train(&df, "ETH/USDT", &mut dk).unwrap();
        model.predict(&df, &mut dk, true).unwrap();

        let stored = dk.data_dictionary().prediction_features.as_ref().unwrap();
        assert_eq!(stored.columns(), ["%-f".to_string()]);
        assert_eq!(stored.nrows(), 30);
        assert!(stored.values().iter().all(|v| (-1.0..=1.0).contains(v)));
    }

    #[test]
    fn test_label_list_change_is_rejected() {
        let params = FeatureParameters::default();
        let df = frame(30);
        let mut model = FreqaiPredictionModel::new(params.clone(), ConstantBackend { raw: 0.0 }).unwrap();
        let mut dk = kitchen(&params);
        model.train(&df, "ETH/USDT", &mut dk).unwrap();

        let renamed = FeatureParameters {
            label_list: vec!["other".to_string()],
            ..params
        };
        let mut other_dk = kitchen(&renamed);
        assert!(matches!(
            model.predict(&df, &mut other_dk, false),
            Err(ModelError::LabelMismatch { .. })
        ));
    }

    #[test]
    fn test_non_symmetric_convention_is_rejected() {
        let params = FeatureParameters {
            normalization: NormalizationConvention::UnitInterval,
            ..FeatureParameters::default()
        };
        let df = frame(30);
        let mut model = FreqaiPredictionModel::new(params.clone(), ConstantBackend { raw: 0.0 }).unwrap();
        let mut dk = kitchen(&params);
        model.train(&df, "ETH/USDT", &mut dk).unwrap();
        assert!(matches!(
            model.predict(&df, &mut dk, false),
            Err(ModelError::ConventionMismatch { .. })
        ));
    }

    #[test]
    fn test_input_frame_is_not_mutated() {
        let params = FeatureParameters::default();
        let df = frame(25);
        let snapshot = df.clone();
        let mut model = FreqaiPredictionModel::new(params.clone(), ConstantBackend { raw: 0.3 }).unwrap();
        let mut dk = kitchen(&params);
        model.train(&df, "ETH/USDT", &mut dk).unwrap();
        model.predict(&df, &mut dk, false).unwrap();
        assert_eq!(df, snapshot);
    }
}
