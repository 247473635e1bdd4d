//! Squared-error gradient boosting over smartcore decision trees.
//!
//! One ensemble is fitted per label column. The test pool only drives early
//! stopping; it never contributes to the fitted trees.

use super::predictor::{Regressor, RegressorBackend};
use crate::config::ModelTrainingParameters;
use crate::domain::errors::ModelError;
use crate::domain::ml::{DataDictionary, DataFrame};
use ndarray::Array2;
use rand::SeedableRng;
use rand::distr::Distribution;
use rand::distr::weighted::WeightedIndex;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};
use smartcore::linalg::basic::matrix::DenseMatrix;
use smartcore::tree::decision_tree_regressor::{
    DecisionTreeRegressor, DecisionTreeRegressorParameters,
};
use tracing::{debug, info};

pub const EARLY_STOPPING_ROUNDS: usize = 400;
pub const VERBOSE_EVERY: usize = 100;
pub const ALLOW_WRITING_FILES: bool = false;

type Tree = DecisionTreeRegressor<f64, f64, DenseMatrix<f64>, Vec<f64>>;

/// Weighted training or evaluation data for one label.
#[derive(Debug, Clone, PartialEq)]
pub struct Pool {
    pub features: Vec<Vec<f64>>,
    pub labels: Vec<f64>,
    pub weights: Vec<f64>,
}

impl Pool {
    /// Build a pool. Empty `weights` means uniform weights.
    pub fn new(
        features: Vec<Vec<f64>>,
        labels: Vec<f64>,
        weights: Vec<f64>,
    ) -> Result<Self, ModelError> {
        if features.len() != labels.len() {
            return Err(ModelError::ShapeMismatch {
                context: "pool labels".to_string(),
                expected: features.len(),
                actual: labels.len(),
            });
        }
        let weights = if weights.is_empty() {
            vec![1.0; labels.len()]
        } else {
            weights
        };
        if weights.len() != labels.len() {
            return Err(ModelError::ShapeMismatch {
                context: "pool weights".to_string(),
                expected: labels.len(),
                actual: weights.len(),
            });
        }
        Ok(Self {
            features,
            labels,
            weights,
        })
    }

    pub fn from_frame(
        features: &DataFrame,
        labels: &DataFrame,
        label: &str,
        weights: &[f64],
    ) -> Result<Self, ModelError> {
        let labels = labels.column(label)?.to_vec();
        Self::new(features.to_row_vecs(), labels, weights.to_vec())
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    fn has_uniform_weights(&self) -> bool {
        self.weights
            .first()
            .is_none_or(|first| self.weights.iter().all(|w| (w - first).abs() < f64::EPSILON))
    }
}

/// Fixed and user-supplied boosting settings.
#[derive(Debug, Clone, PartialEq)]
pub struct BoosterParams {
    pub iterations: usize,
    pub learning_rate: f64,
    pub depth: u16,
    pub min_samples_leaf: usize,
    pub min_samples_split: usize,
    pub subsample: f64,
    pub random_seed: u64,
    pub early_stopping_rounds: usize,
    pub verbose: usize,
    pub allow_writing_files: bool,
}

impl BoosterParams {
    /// Fixed settings with the user hyperparameters merged in.
    pub fn from_training_parameters(params: &ModelTrainingParameters) -> Self {
        Self {
            iterations: params.iterations,
            learning_rate: params.learning_rate,
            depth: params.depth,
            min_samples_leaf: params.min_samples_leaf,
            min_samples_split: params.min_samples_split,
            subsample: params.subsample,
            random_seed: params.random_seed,
            early_stopping_rounds: EARLY_STOPPING_ROUNDS,
            verbose: VERBOSE_EVERY,
            allow_writing_files: ALLOW_WRITING_FILES,
        }
    }

    fn tree_parameters(&self, iteration: usize) -> DecisionTreeRegressorParameters {
        let mut params = DecisionTreeRegressorParameters::default()
            .with_max_depth(self.depth)
            .with_min_samples_leaf(self.min_samples_leaf)
            .with_min_samples_split(self.min_samples_split);
        params.seed = Some(self.iteration_seed(iteration));
        params
    }

    fn iteration_seed(&self, iteration: usize) -> u64 {
        self.random_seed.wrapping_add(iteration as u64)
    }
}

impl Default for BoosterParams {
    fn default() -> Self {
        Self::from_training_parameters(&ModelTrainingParameters::default())
    }
}

/// Boosted ensemble for a single label.
#[derive(Serialize, Deserialize)]
pub struct GradientBoostedRegressor {
    base_score: f64,
    learning_rate: f64,
    trees: Vec<Tree>,
    best_iteration: Option<usize>,
    best_score: Option<f64>,
}

impl GradientBoostedRegressor {
    pub fn fit(
        train: &Pool,
        eval: Option<&Pool>,
        params: &BoosterParams,
    ) -> Result<Self, ModelError> {
        if train.is_empty() {
            return Err(ModelError::EmptyDataset {
                stage: "boosting".to_string(),
            });
        }
        let x_train = to_matrix(&train.features)?;
        let base_score = weighted_mean(&train.labels, &train.weights);
        let mut train_pred = vec![base_score; train.len()];

        let eval = eval.filter(|pool| !pool.is_empty());
        let x_eval = eval.map(|pool| to_matrix(&pool.features)).transpose()?;
        let mut eval_pred = vec![base_score; eval.map_or(0, Pool::len)];

        let uniform = train.has_uniform_weights();
        let mut trees: Vec<Tree> = Vec::with_capacity(params.iterations);
        let mut best: Option<(usize, f64)> = None;
        let mut stale_rounds = 0;

        for iteration in 0..params.iterations {
            let residuals: Vec<f64> = train
                .labels
                .iter()
                .zip(&train_pred)
                .map(|(y, p)| y - p)
                .collect();

            let mut rng = StdRng::seed_from_u64(params.iteration_seed(iteration));
            let rows = sample_rows(train, uniform, params.subsample, &mut rng)?;
            let tree_params = params.tree_parameters(iteration);
            let tree = match rows {
                None => Tree::fit(&x_train, &residuals, tree_params),
                Some(rows) => {
                    let features: Vec<Vec<f64>> =
                        rows.iter().map(|&r| train.features[r].clone()).collect();
                    let targets: Vec<f64> = rows.iter().map(|&r| residuals[r]).collect();
                    Tree::fit(&to_matrix(&features)?, &targets, tree_params)
                }
            }
            .map_err(|e| ModelError::Fit(format!("Tree fit failed at iteration {}: {}", iteration, e)))?;

            let update = tree
                .predict(&x_train)
                .map_err(|e| ModelError::Fit(format!("Tree predict failed: {}", e)))?;
            for (p, u) in train_pred.iter_mut().zip(update) {
                *p += params.learning_rate * u;
            }
            trees.push(tree);

            let report = (iteration + 1) % params.verbose.max(1) == 0;
            match (eval, &x_eval) {
                (Some(pool), Some(x_eval)) => {
                    let update = trees[iteration]
                        .predict(x_eval)
                        .map_err(|e| ModelError::Fit(format!("Tree predict failed: {}", e)))?;
                    for (p, u) in eval_pred.iter_mut().zip(update) {
                        *p += params.learning_rate * u;
                    }
                    let score = weighted_rmse(&pool.labels, &eval_pred, &pool.weights);
                    if best.is_none_or(|(_, best_score)| score < best_score) {
                        best = Some((iteration, score));
                        stale_rounds = 0;
                    } else {
                        stale_rounds += 1;
                    }
                    if report {
                        info!(
                            "{}:\tlearn: {:.7}\ttest: {:.7}\tbest: {:.7} ({})",
                            iteration,
                            weighted_rmse(&train.labels, &train_pred, &train.weights),
                            score,
                            best.map_or(score, |(_, s)| s),
                            best.map_or(iteration, |(i, _)| i),
                        );
                    }
                    if stale_rounds >= params.early_stopping_rounds {
                        info!(
                            "Stopped by overfitting detector ({} iterations wait)",
                            params.early_stopping_rounds
                        );
                        break;
                    }
                }
                _ => {
                    if report {
                        info!(
                            "{}:\tlearn: {:.7}",
                            iteration,
                            weighted_rmse(&train.labels, &train_pred, &train.weights)
                        );
                    }
                }
            }
        }

        if let Some((best_iteration, best_score)) = best {
            info!(
                "bestTest = {:.7}, bestIteration = {}. Shrink model to first {} iterations.",
                best_score,
                best_iteration,
                best_iteration + 1
            );
            trees.truncate(best_iteration + 1);
        }

        Ok(Self {
            base_score,
            learning_rate: params.learning_rate,
            trees,
            best_iteration: best.map(|(i, _)| i),
            best_score: best.map(|(_, s)| s),
        })
    }

    pub fn predict_rows(&self, features: &[Vec<f64>]) -> Result<Vec<f64>, ModelError> {
        if features.is_empty() {
            return Ok(Vec::new());
        }
        let x = to_matrix(features)?;
        let mut out = vec![self.base_score; features.len()];
        for tree in &self.trees {
            let update = tree
                .predict(&x)
                .map_err(|e| ModelError::Inference(format!("Tree predict failed: {}", e)))?;
            for (p, u) in out.iter_mut().zip(update) {
                *p += self.learning_rate * u;
            }
        }
        Ok(out)
    }

    pub fn tree_count(&self) -> usize {
        self.trees.len()
    }

    pub fn best_iteration(&self) -> Option<usize> {
        self.best_iteration
    }

    pub fn best_score(&self) -> Option<f64> {
        self.best_score
    }
}

/// One boosted ensemble per label column.
#[derive(Serialize, Deserialize)]
pub struct MultiOutputBooster {
    labels: Vec<String>,
    feature_names: Vec<String>,
    boosters: Vec<GradientBoostedRegressor>,
}

impl MultiOutputBooster {
    pub fn boosters(&self) -> &[GradientBoostedRegressor] {
        &self.boosters
    }

    pub fn feature_names(&self) -> &[String] {
        &self.feature_names
    }
}

impl Regressor for MultiOutputBooster {
    fn predict(&self, features: &DataFrame) -> Result<Array2<f64>, ModelError> {
        if features.columns() != self.feature_names.as_slice() {
            return Err(ModelError::ShapeMismatch {
                context: "prediction features".to_string(),
                expected: self.feature_names.len(),
                actual: features.ncols(),
            });
        }
        let rows = features.to_row_vecs();
        let mut out = Array2::zeros((rows.len(), self.boosters.len()));
        for (j, booster) in self.boosters.iter().enumerate() {
            let predictions = booster.predict_rows(&rows)?;
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

pub struct GradientBoostingBackend {
    params: BoosterParams,
}

impl GradientBoostingBackend {
    pub fn new(params: &ModelTrainingParameters) -> Result<Self, ModelError> {
        params.validate()?;
        Ok(Self {
            params: BoosterParams::from_training_parameters(params),
        })
    }
}

impl RegressorBackend for GradientBoostingBackend {
    type Model = MultiOutputBooster;

    fn fit(&self, data: &DataDictionary) -> Result<Self::Model, ModelError> {
        let labels = data.train_labels.columns().to_vec();
        let mut boosters = Vec::with_capacity(labels.len());
        for label in &labels {
            let train = Pool::from_frame(
                &data.train_features,
                &data.train_labels,
                label,
                &data.train_weights,
            )?;
            let eval = if data.has_test_set() {
                Some(Pool::from_frame(
                    &data.test_features,
                    &data.test_labels,
                    label,
                    &data.test_weights,
                )?)
            } else {
                None
            };
            debug!(
                "Boosting label {} on {} train rows, {} eval rows",
                label,
                train.len(),
                eval.as_ref().map_or(0, Pool::len)
            );
            boosters.push(GradientBoostedRegressor::fit(&train, eval.as_ref(), &self.params)?);
        }
        Ok(MultiOutputBooster {
            labels,
            feature_names: data.train_features.columns().to_vec(),
            boosters,
        })
    }

    fn name(&self) -> &str {
        "Gradient Boosting"
    }
}

fn to_matrix(rows: &[Vec<f64>]) -> Result<DenseMatrix<f64>, ModelError> {
    DenseMatrix::from_2d_vec(&rows.to_vec())
        .map_err(|e| ModelError::Fit(format!("Matrix creation failed: {}", e)))
}

/// Rows for one tree. `None` means every row, in order.
fn sample_rows(
    pool: &Pool,
    uniform: bool,
    subsample: f64,
    rng: &mut StdRng,
) -> Result<Option<Vec<usize>>, ModelError> {
    let n = pool.len();
    if uniform && subsample >= 1.0 {
        return Ok(None);
    }
    let k = ((n as f64 * subsample).ceil() as usize).clamp(1, n);
    let mut rows: Vec<usize> = if uniform {
        let mut rows: Vec<usize> = (0..n).collect();
        rows.shuffle(rng);
        rows.truncate(k);
        rows
    } else {
        let dist = WeightedIndex::new(&pool.weights)
            .map_err(|e| ModelError::Fit(format!("Invalid sample weights: {}", e)))?;
        (0..k).map(|_| dist.sample(&mut *rng)).collect()
    };
    rows.sort_unstable();
    Ok(Some(rows))
}

fn weighted_mean(values: &[f64], weights: &[f64]) -> f64 {
    let total: f64 = weights.iter().sum();
    if total <= 0.0 {
        return values.iter().sum::<f64>() / values.len().max(1) as f64;
    }
    values.iter().zip(weights).map(|(v, w)| v * w).sum::<f64>() / total
}

fn weighted_rmse(labels: &[f64], predictions: &[f64], weights: &[f64]) -> f64 {
    let total: f64 = weights.iter().sum();
    if total <= 0.0 {
        return f64::NAN;
    }
    let sse: f64 = labels
        .iter()
        .zip(predictions)
        .zip(weights)
        .map(|((y, p), w)| w * (y - p).powi(2))
        .sum();
    (sse / total).sqrt()
}
