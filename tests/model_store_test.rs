use rustfreqai::application::ml::feature_engineering::{IndicatorPeriods, populate_indicators};
use rustfreqai::application::ml::gradient_boosting::GradientBoostingBackend;
use rustfreqai::application::ml::{
    GbmPredictionModel, PredictionModel, PredictionModelFactory, TrainedModel,
};
use rustfreqai::config::FreqaiConfig;
use rustfreqai::domain::ports::DataKitchen;
use rustfreqai::infrastructure::candle_csv::read_candles;
use rustfreqai::infrastructure::{ModelStore, SavedModel};
use std::fmt::Write as _;
use std::fs;

fn candle_csv(rows: usize) -> String {
    let mut csv = String::from("date,open,high,low,close,volume\n");
    for i in 0..rows {
        let close = 50.0 + 0.01 * i as f64 + 2.0 * (i as f64 / 8.0).sin();
        let volume = 500.0 + 40.0 * ((i % 11) as f64);
        writeln!(
            csv,
            "{},{},{},{},{},{}",
            1_704_067_200 + i * 300,
            close - 0.1,
            close + 0.3,
            close - 0.3,
            close,
            volume
        )
        .unwrap();
    }
    csv
}

fn config() -> FreqaiConfig {
    FreqaiConfig::from_toml_str(
        r#"
        identifier = "store-test"
        model = "gradient_boosting"

        [feature_parameters]
        period = 6

        [model_training_parameters]
        iterations = 40
        learning_rate = 0.2
        depth = 3
        "#,
    )
    .expect("valid config")
}

#[test]
fn test_saved_model_predicts_like_the_trained_one() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
    let config = config();

    let candles = read_candles(candle_csv(300).as_bytes()).unwrap();
    let df = populate_indicators(&candles, &IndicatorPeriods::default()).unwrap();
    let train = df.slice_rows(0, 250);

    let mut model = GbmPredictionModel::new(
        config.feature_parameters.clone(),
        GradientBoostingBackend::new(&config.model_training_parameters).unwrap(),
    )
    .unwrap();
    let labels = model.make_labels(&train).unwrap();
    let train = train.with_column(&labels).unwrap();

    let mut dk = PredictionModelFactory::create_kitchen(&config).unwrap();
    model.train(&train, "SOL/USDT", &mut dk).unwrap();

    let probe = df.slice_rows(250, 300);
    let expected = model.predict(&probe, &mut dk, true).unwrap();

    let dir = std::env::temp_dir().join(format!("rustfreqai_store_{}", std::process::id()));
    let store = ModelStore::new(&dir).unwrap();
    let trained = model.into_trained().unwrap();
    let path = store
        .save(&SavedModel {
            identifier: config.identifier.clone(),
            pair: "SOL/USDT".to_string(),
            training_features: trained.features,
            normalization: dk.normalization().clone(),
            model: trained.model,
        })
        .unwrap();
    assert!(path.exists());

    let saved = store.load("store-test", "SOL/USDT").unwrap().expect("saved model");
    let mut restored_dk = PredictionModelFactory::create_kitchen(&config).unwrap();
    restored_dk.restore_metadata(saved.training_features.clone(), saved.normalization);
    let restored = GbmPredictionModel::with_model(
        config.feature_parameters.clone(),
        GradientBoostingBackend::new(&config.model_training_parameters).unwrap(),
        TrainedModel {
            model: saved.model,
            pair: saved.pair,
            features: saved.training_features,
        },
    )
    .unwrap();

    let actual = restored.predict(&probe, &mut restored_dk, true).unwrap();
    assert_eq!(actual, expected);

    let _ = fs::remove_dir_all(dir);
}
