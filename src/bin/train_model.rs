//! Train a prediction model on a candle CSV and evaluate it on a held-out tail.
//!
//! # Usage
//! ```sh
//! cargo run --bin train_model -- --candles data/BTC_USDT-5m.csv --holdout 500
//! ```
//!
//! # Environment Variables
//! - `FREQAI_CONFIG` - Path to a TOML model config (used when `--config` is absent)
//! - `FREQAI_MODEL`, `FREQAI_PERIOD`, `FREQAI_TEST_SIZE`, `FREQAI_RANDOM_SEED`,
//!   `FREQAI_ITERATIONS` - Override single config values

use anyhow::{Context, Result, bail};
use clap::Parser;
use rustfreqai::application::ml::feature_engineering::{IndicatorPeriods, populate_indicators};
use rustfreqai::application::ml::gradient_boosting::GradientBoostingBackend;
use rustfreqai::application::ml::{
    FreqaiDataKitchen, GbmPredictionModel, PredictionModel, PredictionModelFactory,
};
use rustfreqai::config::{FreqaiConfig, ModelKind};
use rustfreqai::domain::ml::{DataFrame, Series};
use rustfreqai::domain::ports::DataKitchen;
use rustfreqai::infrastructure::{ModelStore, SavedModel, load_candles};
use std::path::PathBuf;
use tracing::{Level, info, warn};
use tracing_subscriber::prelude::*;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to candle CSV (date,open,high,low,close,volume)
    #[arg(long)]
    candles: PathBuf,

    /// Path to TOML model config. Falls back to FREQAI_CONFIG / defaults.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Override the configured model (gradient_boosting | random_forest)
    #[arg(long)]
    model: Option<ModelKind>,

    /// Pair name used in logs and saved model names
    #[arg(long, default_value = "BTC/USDT")]
    pair: String,

    /// Number of most recent candles held out for evaluation
    #[arg(long, default_value_t = 200)]
    holdout: usize,

    /// Directory to save the trained model to (gradient boosting only)
    #[arg(long)]
    save_dir: Option<PathBuf>,
}

fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    let stdout_layer = tracing_subscriber::fmt::layer().with_target(false).pretty();
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::from_default_env().add_directive(Level::INFO.into()))
        .with(stdout_layer)
        .init();

    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => FreqaiConfig::from_file(path)?,
        None => FreqaiConfig::from_env()?,
    };
    if let Some(model) = args.model {
        config.model = model;
    }
    info!(
        "Configuration loaded: Model={}, Period={}, Labels={:?}",
        config.model, config.feature_parameters.period, config.feature_parameters.label_list
    );

    let candles = load_candles(&args.candles)?;
    let dataframe = populate_indicators(&candles, &IndicatorPeriods::default())?;

    let n = dataframe.nrows();
    if args.holdout == 0 || args.holdout >= n {
        bail!("Holdout of {} rows leaves nothing to train on ({} candles)", args.holdout, n);
    }
    let split = n - args.holdout;
    let mut dk = PredictionModelFactory::create_kitchen(&config)?;

    match config.model {
        ModelKind::GradientBoosting => {
            let mut model = GbmPredictionModel::new(
                config.feature_parameters.clone(),
                GradientBoostingBackend::new(&config.model_training_parameters)?,
            )?;
            evaluate(&mut model, &mut dk, &dataframe, split, &args.pair)?;

            if let Some(dir) = &args.save_dir {
                let trained = model
                    .into_trained()
                    .context("Model has no trained state to save")?;
                let store = ModelStore::new(dir)?;
                let path = store.save(&SavedModel {
                    identifier: config.identifier.clone(),
                    pair: args.pair.clone(),
                    training_features: trained.features,
                    normalization: dk.normalization().clone(),
                    model: trained.model,
                })?;
                println!("Model saved to {:?}", path);
            }
        }
        ModelKind::RandomForest => {
            let mut model = PredictionModelFactory::create(&config)?;
            evaluate(model.as_mut(), &mut dk, &dataframe, split, &args.pair)?;
            if args.save_dir.is_some() {
                warn!("Saving is only supported for gradient boosting models; skipping");
            }
        }
    }

    Ok(())
}

/// Train on rows `..split`, predict rows `split..` and print the evaluation.
fn evaluate(
    model: &mut dyn PredictionModel,
    dk: &mut FreqaiDataKitchen,
    dataframe: &DataFrame,
    split: usize,
    pair: &str,
) -> Result<()> {
    let n = dataframe.nrows();

    // Labels for the training window only see training closes
    let train_window = dataframe.slice_rows(0, split);
    let train_labels = model.make_labels(&train_window)?;
    let train_window = train_window.with_column(&train_labels)?;

    let all_labels = model.make_labels(dataframe)?;
    let holdout = dataframe.slice_rows(split, n);

    let report = model.train(&train_window, pair, dk)?;
    println!(
        "Trained {} on {} features, {} train rows, {} test rows",
        model.name(),
        report.feature_count,
        report.train_rows,
        report.test_rows
    );

    let prediction = model.predict(&holdout, dk, true)?;
    let mut output = holdout.clone();
    for label in prediction.predictions.columns() {
        let values = prediction.predictions.column(label)?.to_vec();
        output = output.with_column(&Series::new(format!("{}_pred", label), values))?;
    }
    let output = model.return_values(output, &*dk)?;
    let predicted = output.column(&format!("{}_pred", all_labels.name))?;

    let mut preds = Vec::new();
    let mut actuals = Vec::new();
    for (i, pred) in predicted.iter().enumerate() {
        let actual = all_labels.values[split + i];
        if actual.is_finite() && prediction.do_predict.get(i).copied().unwrap_or(0) == 1 {
            preds.push(*pred);
            actuals.push(actual);
        }
    }

    print_evaluation(&preds, &actuals, holdout.nrows());
    Ok(())
}

fn print_evaluation(predictions: &[f64], actuals: &[f64], holdout_rows: usize) {
    let n = predictions.len();
    println!("\n══════════════════════════════════════════════════════");
    println!("  HOLDOUT EVALUATION ({} of {} rows scored)", n, holdout_rows);
    println!("══════════════════════════════════════════════════════");
    if n == 0 {
        println!("  No scorable rows.");
        return;
    }

    let sq_err: f64 = predictions
        .iter()
        .zip(actuals)
        .map(|(p, a)| (p - a).powi(2))
        .sum();
    let rmse = (sq_err / n as f64).sqrt();

    let correct_direction = predictions
        .iter()
        .zip(actuals)
        .filter(|(p, a)| (**p > 0.0 && **a > 0.0) || (**p < 0.0 && **a < 0.0))
        .count();

    println!("  RMSE:                 {:.6}", rmse);
    println!(
        "  Directional Accuracy: {:.1}%  ({}/{})",
        correct_direction as f64 / n as f64 * 100.0,
        correct_direction,
        n
    );
    match correlation(predictions, actuals) {
        Some(r) => println!("  Correlation:          {:.4}", r),
        None => println!("  Correlation:          n/a (constant series)"),
    }
    println!("══════════════════════════════════════════════════════\n");
}

fn correlation(x: &[f64], y: &[f64]) -> Option<f64> {
    let n = x.len() as f64;
    let mean_x = x.iter().sum::<f64>() / n;
    let mean_y = y.iter().sum::<f64>() / n;
    let cov: f64 = x
        .iter()
        .zip(y)
        .map(|(a, b)| (a - mean_x) * (b - mean_y))
        .sum();
    let var_x: f64 = x.iter().map(|a| (a - mean_x).powi(2)).sum();
    let var_y: f64 = y.iter().map(|b| (b - mean_y).powi(2)).sum();
    let denom = (var_x * var_y).sqrt();
    (denom > 0.0).then(|| cov / denom)
}
