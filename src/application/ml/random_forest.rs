use super::predictor::{Regressor, RegressorBackend};
use crate::config::ModelTrainingParameters;
use crate::domain::errors::ModelError;
use crate::domain::ml::{DataDictionary, DataFrame};
use ndarray::Array2;
use serde::{Deserialize, Serialize};
use smartcore::ensemble::random_forest_regressor::{
    RandomForestRegressor, RandomForestRegressorParameters,
};
use smartcore::linalg::basic::matrix::DenseMatrix;
use tracing::info;

type Forest = RandomForestRegressor<f64, f64, DenseMatrix<f64>, Vec<f64>>;

/// One smartcore random forest per label column.
#[derive(Serialize, Deserialize)]
pub struct MultiOutputForest {
    labels: Vec<String>,
    feature_names: Vec<String>,
    forests: Vec<Forest>,
}

impl Regressor for MultiOutputForest {
    fn predict(&self, features: &DataFrame) -> Result<Array2<f64>, ModelError> {
        if features.columns() != self.feature_names.as_slice() {
            return Err(ModelError::ShapeMismatch {
                context: "prediction features".to_string(),
                expected: self.feature_names.len(),
                actual: features.ncols(),
            });
        }
        let mut out = Array2::zeros((features.nrows(), self.forests.len()));
        if features.is_empty() {
            return Ok(out);
        }
        let x = DenseMatrix::from_2d_vec(&features.to_row_vecs())
            .map_err(|e| ModelError::Inference(format!("Matrix creation failed: {}", e)))?;
        for (j, forest) in self.forests.iter().enumerate() {
            let predictions = forest
                .predict(&x)
                .map_err(|e| ModelError::Inference(format!("Prediction failed: {}", e)))?;
            for (i, value) in predictions.into_iter().enumerate() {
                out[[i, j]] = value;
            }
        }
        Ok(out)
    }

    fn labels(&self) -> &[String] {
        &self.labels
    }
}

pub struct RandomForestBackend {
    n_trees: usize,
    max_depth: u16,
    min_samples_leaf: usize,
    min_samples_split: usize,
    seed: u64,
}

impl RandomForestBackend {
    pub fn new(params: &ModelTrainingParameters) -> Result<Self, ModelError> {
        params.validate()?;
        Ok(Self {
            n_trees: params.n_trees,
            max_depth: params.depth,
            min_samples_leaf: params.min_samples_leaf,
            min_samples_split: params.min_samples_split,
            seed: params.random_seed,
        })
    }

    fn parameters(&self) -> RandomForestRegressorParameters {
        RandomForestRegressorParameters::default()
            .with_n_trees(self.n_trees)
            .with_max_depth(self.max_depth)
            .with_min_samples_leaf(self.min_samples_leaf)
            .with_min_samples_split(self.min_samples_split)
            .with_seed(self.seed)
    }
}

impl RegressorBackend for RandomForestBackend {
    type Model = MultiOutputForest;

    fn fit(&self, data: &DataDictionary) -> Result<Self::Model, ModelError> {
        if data.train_features.is_empty() {
            return Err(ModelError::EmptyDataset {
                stage: "random forest".to_string(),
            });
        }
        let x_train = DenseMatrix::from_2d_vec(&data.train_features.to_row_vecs())
            .map_err(|e| ModelError::Fit(format!("Matrix creation failed: {}", e)))?;

        let labels = data.train_labels.columns().to_vec();
        let mut forests = Vec::with_capacity(labels.len());
        for label in &labels {
            let y_train = data.train_labels.column(label)?.to_vec();
            let forest = Forest::fit(&x_train, &y_train, self.parameters())
                .map_err(|e| ModelError::Fit(format!("Random forest fit failed: {}", e)))?;
            forests.push(forest);
        }

        let model = MultiOutputForest {
            labels,
            feature_names: data.train_features.columns().to_vec(),
            forests,
        };

        if data.has_test_set() {
            let predictions = model.predict(&data.test_features)?;
            for (j, label) in model.labels.iter().enumerate() {
                let actual = data.test_labels.column(label)?;
                let sq_err: f64 = predictions
                    .column(j)
                    .iter()
                    .zip(actual.iter())
                    .map(|(p, a)| (p - a).powi(2))
                    .sum();
                let rmse = (sq_err / actual.len().max(1) as f64).sqrt();
                info!("Random forest {} test RMSE (normalized): {:.6}", label, rmse);
            }
        }

        Ok(model)
    }

    fn name(&self) -> &str {
        "Random Forest"
    }
}
