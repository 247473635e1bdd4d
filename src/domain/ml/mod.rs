pub mod data_dictionary;
pub mod feature_registry;
pub mod frame;
pub mod labels;
pub mod normalization;

pub use data_dictionary::DataDictionary;
pub use frame::{DataFrame, Series};
pub use normalization::{ColumnBounds, NormalizationConvention, NormalizationMetadata};
