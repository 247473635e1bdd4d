use super::data_kitchen::FreqaiDataKitchen;
use super::gradient_boosting::GradientBoostingBackend;
use super::prediction_model::FreqaiPredictionModel;
use super::predictor::PredictionModel;
use super::random_forest::RandomForestBackend;
use crate::config::{FreqaiConfig, ModelKind};
use crate::domain::errors::ModelError;
use tracing::info;

pub struct PredictionModelFactory;

impl PredictionModelFactory {
    pub fn create(config: &FreqaiConfig) -> Result<Box<dyn PredictionModel>, ModelError> {
        config.validate()?;
        let features = config.feature_parameters.clone();
        let training = &config.model_training_parameters;

        let model: Box<dyn PredictionModel> = match config.model {
            ModelKind::GradientBoosting => Box::new(FreqaiPredictionModel::new(
                features,
                GradientBoostingBackend::new(training)?,
            )?),
            ModelKind::RandomForest => Box::new(FreqaiPredictionModel::new(
                features,
                RandomForestBackend::new(training)?,
            )?),
        };
        info!("Created {} prediction model ({})", model.name(), config.model);
        Ok(model)
    }

    pub fn create_kitchen(config: &FreqaiConfig) -> Result<FreqaiDataKitchen, ModelError> {
        FreqaiDataKitchen::new(
            config.feature_parameters.clone(),
            config.data_split_parameters.clone(),
        )
    }
}
