//! Min/max scaling between raw values and model space.
//!
//! The kitchen scales every feature and label column with bounds measured on
//! the train partition. Which target range it scales into is recorded as a
//! [`NormalizationConvention`] so consumers can check it instead of assuming it.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// Target range used when scaling columns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NormalizationConvention {
    /// `[-1, 1]`
    #[default]
    SymmetricUnit,
    /// `[0, 1]`
    UnitInterval,
}

impl NormalizationConvention {
    pub fn range(&self) -> (f64, f64) {
        match self {
            NormalizationConvention::SymmetricUnit => (-1.0, 1.0),
            NormalizationConvention::UnitInterval => (0.0, 1.0),
        }
    }

    /// Map `x` from `bounds` into the convention's range.
    /// A degenerate column (`max == min`) maps to the middle of the range.
    pub fn normalize(&self, x: f64, bounds: &ColumnBounds) -> f64 {
        let (lo, hi) = self.range();
        let span = bounds.span();
        if span == 0.0 {
            return (lo + hi) / 2.0;
        }
        lo + (x - bounds.min) * (hi - lo) / span
    }

    /// Inverse of [`normalize`](Self::normalize).
    ///
    /// For `SymmetricUnit` this is `((raw + 1) * (max - min) / 2) + min`.
    pub fn denormalize(&self, raw: f64, bounds: &ColumnBounds) -> f64 {
        match self {
            NormalizationConvention::SymmetricUnit => {
                ((raw + 1.0) * bounds.span() / 2.0) + bounds.min
            }
            NormalizationConvention::UnitInterval => raw * bounds.span() + bounds.min,
        }
    }
}

impl fmt::Display for NormalizationConvention {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NormalizationConvention::SymmetricUnit => write!(f, "symmetric [-1, 1]"),
            NormalizationConvention::UnitInterval => write!(f, "unit [0, 1]"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ColumnBounds {
    pub min: f64,
    pub max: f64,
}

impl ColumnBounds {
    pub fn new(min: f64, max: f64) -> Self {
        Self { min, max }
    }

    /// Bounds of the finite values in `values`; `None` when there are none.
    pub fn from_values<'a>(values: impl IntoIterator<Item = &'a f64>) -> Option<Self> {
        let mut bounds: Option<Self> = None;
        for &v in values.into_iter().filter(|v| v.is_finite()) {
            bounds = Some(match bounds {
                Some(b) => Self::new(b.min.min(v), b.max.max(v)),
                None => Self::new(v, v),
            });
        }
        bounds
    }

    pub fn span(&self) -> f64 {
        self.max - self.min
    }
}

/// Scaling metadata captured by `normalize_data` on the train partition.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NormalizationMetadata {
    pub convention: NormalizationConvention,
    pub features: HashMap<String, ColumnBounds>,
    pub labels: HashMap<String, ColumnBounds>,
}

impl NormalizationMetadata {
    pub fn new(convention: NormalizationConvention) -> Self {
        Self {
            convention,
            ..Default::default()
        }
    }

    pub fn feature_bounds(&self, name: &str) -> Option<&ColumnBounds> {
        self.features.get(name)
    }

    pub fn label_bounds(&self, name: &str) -> Option<&ColumnBounds> {
        self.labels.get(name)
    }

    pub fn labels_min(&self, name: &str) -> Option<f64> {
        self.labels.get(name).map(|b| b.min)
    }

    pub fn labels_max(&self, name: &str) -> Option<f64> {
        self.labels.get(name).map(|b| b.max)
    }
}
