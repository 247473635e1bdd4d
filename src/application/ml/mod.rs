// Data preparation
pub mod data_kitchen;
pub mod feature_engineering;

// Regression backends
pub mod gradient_boosting;
pub mod random_forest;

// Prediction model adapter and selection
pub mod model_factory;
pub mod prediction_model;
pub mod predictor;

pub use data_kitchen::{FreqaiDataKitchen, LabelStatistics};
pub use model_factory::PredictionModelFactory;
pub use prediction_model::{FreqaiPredictionModel, GbmPredictionModel, ModelState, TrainedModel};
pub use predictor::{Prediction, PredictionModel, Regressor, RegressorBackend, TrainingReport};
