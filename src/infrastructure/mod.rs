// Candle loading
pub mod candle_csv;

// Trained model persistence
pub mod model_store;

pub use candle_csv::load_candles;
pub use model_store::{ModelStore, SavedModel};
