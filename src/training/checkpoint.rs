//! Checkpoint persistence
//!
//! The best model is stored as a full-precision Burn MessagePack record
//! (`best_model.mpk`) with a JSON sidecar describing when and why it was
//! saved. The architecture lives in `model_config.json`.

use std::fs;
use std::path::{Path, PathBuf};

use burn::{
    config::Config,
    module::Module,
    record::{FullPrecisionSettings, NamedMpkFileRecorder},
    tensor::backend::Backend,
};
use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};

use crate::model::{ClassifierConfig, TransferClassifier, MODEL_CONFIG_FILE};
use crate::training::history::EpochMetrics;
use crate::training::Phase;
use crate::utils::error::{Result, TransferError};

/// Weights are stored as f32 so a reloaded model reproduces the saved one
pub type CheckpointRecorder = NamedMpkFileRecorder<FullPrecisionSettings>;

/// Record name of the best model; the recorder adds `.mpk`
pub const BEST_MODEL_NAME: &str = "best_model";
pub const BEST_MODEL_META_FILE: &str = "best_model.json";

/// Sidecar metadata for a saved checkpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckpointMetadata {
    pub phase: Phase,
    /// 1-based epoch within the phase
    pub epoch: usize,
    pub val_loss: f64,
    pub val_accuracy: f64,
    pub saved_at: DateTime<Local>,
}

impl CheckpointMetadata {
    pub fn new(phase: Phase, metrics: &EpochMetrics) -> Self {
        Self {
            phase,
            epoch: metrics.epoch,
            val_loss: metrics.val_loss,
            val_accuracy: metrics.val_accuracy,
            saved_at: Local::now(),
        }
    }

    pub fn save(&self, dir: &Path) -> Result<()> {
        fs::write(dir.join(BEST_MODEL_META_FILE), serde_json::to_string_pretty(self)?)?;
        Ok(())
    }

    pub fn load(dir: &Path) -> Result<Self> {
        let path = dir.join(BEST_MODEL_META_FILE);
        let content = fs::read_to_string(&path)
            .map_err(|e| TransferError::Checkpoint(format!("Failed to read {:?}: {}", path, e)))?;
        Ok(serde_json::from_str(&content)?)
    }
}

/// Path of the best-model record without extension
pub fn best_model_path(dir: &Path) -> PathBuf {
    dir.join(BEST_MODEL_NAME)
}

/// Persist model weights and metadata as the new best checkpoint
pub fn save_best<B: Backend>(
    model: &TransferClassifier<B>,
    dir: &Path,
    metadata: &CheckpointMetadata,
) -> Result<()> {
    fs::create_dir_all(dir)?;
    model
        .clone()
        .save_file(best_model_path(dir), &CheckpointRecorder::new())
        .map_err(|e| TransferError::Checkpoint(format!("Failed to save model: {:?}", e)))?;
    metadata.save(dir)?;
    Ok(())
}

/// Rebuild the model from `model_config.json` and load the best weights
pub fn load_best<B: Backend>(dir: &Path, device: &B::Device) -> Result<(TransferClassifier<B>, ClassifierConfig)> {
    let config = load_model_config(dir)?;
    let record_path = best_model_path(dir);
    if !record_path.with_extension("mpk").exists() {
        return Err(TransferError::PathNotFound(record_path.with_extension("mpk")));
    }

    let model = TransferClassifier::new(&config, device)
        .load_file(record_path, &CheckpointRecorder::new(), device)
        .map_err(|e| TransferError::Checkpoint(format!("Failed to load model: {:?}", e)))?;
    Ok((model, config))
}

pub fn save_model_config(config: &ClassifierConfig, dir: &Path) -> Result<()> {
    fs::create_dir_all(dir)?;
    config
        .save(dir.join(MODEL_CONFIG_FILE))
        .map_err(|e| TransferError::Checkpoint(format!("Failed to save model config: {}", e)))
}

pub fn load_model_config(dir: &Path) -> Result<ClassifierConfig> {
    let path = dir.join(MODEL_CONFIG_FILE);
    if !path.exists() {
        return Err(TransferError::PathNotFound(path));
    }
    ClassifierConfig::load(&path)
        .map_err(|e| TransferError::Checkpoint(format!("Failed to load {:?}: {}", path, e)))
}
