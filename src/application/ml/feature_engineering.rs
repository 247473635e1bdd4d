//! Technical indicator features for candle dataframes.
//!
//! Every column written here starts with the default feature prefix so the
//! data kitchen picks it up. Rows inside an indicator's warm-up window are NaN
//! and get dropped by the training filter.

use crate::domain::errors::{ConfigError, ModelError};
use crate::domain::ml::feature_registry::{CLOSE_COLUMN, INDICATOR_FEATURES};
use crate::domain::ml::{DataFrame, Series};
use serde::{Deserialize, Serialize};
use ta::Next;
use ta::indicators::{BollingerBands, RateOfChange, RelativeStrengthIndex, SimpleMovingAverage};

pub const VOLUME_COLUMN: &str = "volume";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IndicatorPeriods {
    pub rsi: usize,
    pub roc: usize,
    pub bollinger: usize,
    pub bollinger_std: f64,
    pub sma: usize,
}

impl Default for IndicatorPeriods {
    fn default() -> Self {
        Self {
            rsi: 14,
            roc: 10,
            bollinger: 20,
            bollinger_std: 2.0,
            sma: 20,
        }
    }
}

impl IndicatorPeriods {
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (field, value) in [
            ("indicators.rsi", self.rsi),
            ("indicators.roc", self.roc),
            ("indicators.bollinger", self.bollinger),
            ("indicators.sma", self.sma),
        ] {
            if value == 0 {
                return Err(ConfigError::NotPositive {
                    field: field.to_string(),
                    value: 0.0,
                });
            }
        }
        if !(self.bollinger_std > 0.0) {
            return Err(ConfigError::NotPositive {
                field: "indicators.bollinger_std".to_string(),
                value: self.bollinger_std,
            });
        }
        Ok(())
    }

    /// Rows at the head of the frame that carry at least one NaN indicator.
    pub fn warmup(&self) -> usize {
        self.rsi.max(self.roc).max(self.bollinger).max(self.sma)
    }
}

/// Return a copy of `dataframe` with the indicator feature columns appended.
pub fn populate_indicators(
    dataframe: &DataFrame,
    periods: &IndicatorPeriods,
) -> Result<DataFrame, ModelError> {
    periods.validate()?;
    let close = dataframe.column(CLOSE_COLUMN)?.to_vec();
    let volume = dataframe.column(VOLUME_COLUMN)?.to_vec();

    let setup = |e: ta::errors::TaError| ModelError::Fit(format!("Indicator setup failed: {:?}", e));
    let mut rsi = RelativeStrengthIndex::new(periods.rsi).map_err(setup)?;
    let mut roc = RateOfChange::new(periods.roc).map_err(setup)?;
    let mut bb = BollingerBands::new(periods.bollinger, periods.bollinger_std).map_err(setup)?;
    let mut sma = SimpleMovingAverage::new(periods.sma).map_err(setup)?;

    let n = close.len();
    let mut rsi_col = vec![f64::NAN; n];
    let mut roc_col = vec![f64::NAN; n];
    let mut bb_width = vec![f64::NAN; n];
    let mut sma_ratio = vec![f64::NAN; n];
    let mut pct_change = vec![f64::NAN; n];
    let mut volume_change = vec![f64::NAN; n];

    for i in 0..n {
        let price = close[i];
        let rsi_val = rsi.next(price);
        let roc_val = roc.next(price);
        let bb_val = bb.next(price);
        let sma_val = sma.next(price);

        if i >= periods.rsi {
            rsi_col[i] = rsi_val;
        }
        if i >= periods.roc {
            roc_col[i] = roc_val;
        }
        if i + 1 >= periods.bollinger && bb_val.average > 0.0 {
            bb_width[i] = (bb_val.upper - bb_val.lower) / bb_val.average;
        }
        if i + 1 >= periods.sma && sma_val > 0.0 {
            sma_ratio[i] = price / sma_val - 1.0;
        }
        if i > 0 {
            if close[i - 1] != 0.0 {
                pct_change[i] = price / close[i - 1] - 1.0;
            }
            if volume[i - 1] != 0.0 {
                volume_change[i] = volume[i] / volume[i - 1] - 1.0;
            }
        }
    }

    let columns: [Vec<f64>; INDICATOR_FEATURES.len()] = [
        rsi_col,
        roc_col,
        bb_width,
        sma_ratio,
        pct_change,
        volume_change,
    ];
    let mut out = dataframe.clone();
    for (name, values) in INDICATOR_FEATURES.iter().zip(columns) {
        out = out.with_column(&Series::new(*name, values))?;
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candles(n: usize) -> DataFrame {
        let close: Vec<f64> = (0..n)
            .map(|i| 100.0 + (i as f64 * 0.2).sin() * 3.0 + i as f64 * 0.05)
            .collect();
        let volume: Vec<f64> = (0..n).map(|i| 1000.0 + (i % 7) as f64 * 50.0).collect();
        DataFrame::from_columns(vec![
            ("close".to_string(), close),
            ("volume".to_string(), volume),
        ])
        .unwrap()
    }

    #[test]
    fn test_populates_every_indicator() {
        let df = populate_indicators(&candles(60), &IndicatorPeriods::default()).unwrap();
        for name in INDICATOR_FEATURES {
            assert!(df.column_index(name).is_some(), "missing {}", name);
        }
        assert_eq!(df.ncols(), 2 + INDICATOR_FEATURES.len());
        assert_eq!(df.nrows(), 60);
    }

    #[test]
    fn test_warmup_rows_are_nan_and_rest_finite() {
        let periods = IndicatorPeriods::default();
        let df = populate_indicators(&candles(60), &periods).unwrap();
        assert!(df.column("%-rsi").unwrap()[periods.rsi - 1].is_nan());
        assert!(df.column("%-pct_change").unwrap()[0].is_nan());
        for row in periods.warmup()..60 {
            assert!(df.row_is_finite(row), "row {} not finite", row);
        }
    }

    #[test]
    fn test_pct_change_values() {
        let df = DataFrame::from_columns(vec![
            ("close".to_string(), vec![100.0, 110.0, 99.0]),
            ("volume".to_string(), vec![10.0, 20.0, 10.0]),
        ])
        .unwrap();
        let out = populate_indicators(&df, &IndicatorPeriods::default()).unwrap();
        let pct = out.column("%-pct_change").unwrap();
        assert!((pct[1] - 0.1).abs() < 1e-12);
        assert!((pct[2] + 0.1).abs() < 1e-12);
        let vol = out.column("%-volume_change").unwrap();
        assert!((vol[1] - 1.0).abs() < 1e-12);
        assert!((vol[2] + 0.5).abs() < 1e-12);
    }

    #[test]
    fn test_requires_volume_and_valid_periods() {
        let df = DataFrame::from_columns(vec![("close".to_string(), vec![1.0, 2.0])]).unwrap();
        assert!(matches!(
            populate_indicators(&df, &IndicatorPeriods::default()),
            Err(ModelError::MissingColumn(c)) if c == "volume"
        ));

        let periods = IndicatorPeriods {
            rsi: 0,
            ..IndicatorPeriods::default()
        };
        assert!(matches!(
            populate_indicators(&candles(10), &periods),
            Err(ModelError::Config(_))
        ));
    }
}
