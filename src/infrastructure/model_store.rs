//! JSON persistence of trained gradient boosting models.
//!
//! Fitting never writes files. Saving is an explicit step taken by the caller
//! after training, one file per identifier and pair.

use crate::application::ml::gradient_boosting::MultiOutputBooster;
use crate::domain::ml::NormalizationMetadata;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;

/// Everything needed to predict with a model outside the process that trained it.
#[derive(Serialize, Deserialize)]
pub struct SavedModel {
    pub identifier: String,
    pub pair: String,
    pub training_features: Vec<String>,
    pub normalization: NormalizationMetadata,
    pub model: MultiOutputBooster,
}

pub struct ModelStore {
    dir: PathBuf,
}

impl ModelStore {
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        if !dir.exists() {
            fs::create_dir_all(&dir)
                .with_context(|| format!("Failed to create model directory {:?}", dir))?;
        }
        Ok(Self { dir })
    }

    /// File for `identifier` and `pair`. Both are reduced to `[A-Za-z0-9_-]`
    /// so the file always lands inside the store directory.
    pub fn path_for(&self, identifier: &str, pair: &str) -> PathBuf {
        self.dir
            .join(format!("{}_{}.json", file_stem(identifier), file_stem(pair)))
    }

    pub fn save(&self, saved: &SavedModel) -> Result<PathBuf> {
        let path = self.path_for(&saved.identifier, &saved.pair);
        save_model(&path, saved)?;
        Ok(path)
    }

    pub fn load(&self, identifier: &str, pair: &str) -> Result<Option<SavedModel>> {
        let path = self.path_for(identifier, pair);
        if !path.exists() {
            return Ok(None);
        }
        load_model(&path).map(Some)
    }
}

fn file_stem(name: &str) -> String {
    name.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' {
                c
            } else {
                '_'
            }
        })
        .collect()
}

pub fn save_model(path: &Path, saved: &SavedModel) -> Result<()> {
    let content = serde_json::to_string(saved).context("Failed to serialize model")?;

    // Atomic write: write to temp file then rename
    let temp_path = path.with_extension("tmp");
    fs::write(&temp_path, content).context("Failed to write temp file")?;
    fs::rename(&temp_path, path).context("Failed to rename temp file")?;

    info!("Saved model {} / {} to {:?}", saved.identifier, saved.pair, path);
    Ok(())
}

pub fn load_model(path: &Path) -> Result<SavedModel> {
    let content =
        fs::read_to_string(path).with_context(|| format!("Failed to read model {:?}", path))?;
    let saved: SavedModel =
        serde_json::from_str(&content).context("Failed to parse model JSON")?;
    info!("Loaded model {} / {} from {:?}", saved.identifier, saved.pair, path);
    Ok(saved)
}
