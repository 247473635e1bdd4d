// Prediction models, data kitchen and feature engineering
pub mod ml;
