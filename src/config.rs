//! Pipeline configuration
//!
//! Every section has defaults, so a TOML file only needs the keys it
//! changes. Command-line flags are applied on top by the binary.

use std::fs;
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::dataset::{AugmentationConfig, ValidationSplit};
use crate::model::{BackboneConfig, ClassifierConfig, DEFAULT_DENSE_UNITS, DEFAULT_DROPOUT};
use crate::training::TrainingConfig;
use crate::utils::error::{Result, TransferError};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DataConfig {
    /// Root with one subdirectory per class
    pub data_dir: PathBuf,
    /// Square size images are resized to
    pub image_size: u32,
    pub validation_split: f64,
    /// Decode every image once and keep the resized pixels in memory
    pub cache_images: bool,
}

impl Default for DataConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("data"),
            image_size: 128,
            validation_split: 0.2,
            cache_images: true,
        }
    }
}

/// Named backbone topologies
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum BackboneVariant {
    #[default]
    EfficientnetV2B2,
    Tiny,
}

impl BackboneVariant {
    pub fn config(&self) -> BackboneConfig {
        match self {
            BackboneVariant::EfficientnetV2B2 => BackboneConfig::efficientnet_v2_b2(),
            BackboneVariant::Tiny => BackboneConfig::tiny(),
        }
    }

    pub fn parse(s: &str) -> Result<Self> {
        match s.to_lowercase().replace('-', "_").as_str() {
            "efficientnet_v2_b2" | "efficientnetv2b2" | "b2" => Ok(BackboneVariant::EfficientnetV2B2),
            "tiny" => Ok(BackboneVariant::Tiny),
            other => Err(TransferError::Config(format!("unknown backbone '{}'", other))),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelSection {
    pub backbone: BackboneVariant,
    /// Burn record with pretrained backbone weights
    pub pretrained_weights: Option<PathBuf>,
    pub dense_units: usize,
    pub dropout: f64,
}

impl Default for ModelSection {
    fn default() -> Self {
        Self {
            backbone: BackboneVariant::default(),
            pretrained_weights: None,
            dense_units: DEFAULT_DENSE_UNITS,
            dropout: DEFAULT_DROPOUT,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    pub output_dir: PathBuf,
    /// Write SVG charts for distributions and training curves
    pub save_charts: bool,
    /// Augmented samples in the preview grid (0 disables it)
    pub preview_samples: usize,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("output"),
            save_charts: true,
            preview_samples: 9,
        }
    }
}

/// Complete configuration of a training run
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub data: DataConfig,
    pub augmentation: AugmentationConfig,
    pub model: ModelSection,
    pub training: TrainingConfig,
    pub output: OutputConfig,
    /// Seed for the split, shuffling and augmentation
    pub seed: u64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            data: DataConfig::default(),
            augmentation: AugmentationConfig::default(),
            model: ModelSection::default(),
            training: TrainingConfig::default(),
            output: OutputConfig::default(),
            seed: 42,
        }
    }
}

impl PipelineConfig {
    pub fn load(path: &Path) -> Result<Self> {
        load_toml_config(path)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| TransferError::Serialization(format!("Failed to serialize config: {e}")))?;
        fs::write(path, content)?;
        Ok(())
    }

    pub fn split(&self) -> ValidationSplit {
        ValidationSplit {
            fraction: self.data.validation_split,
            seed: self.seed,
        }
    }

    /// Model architecture for `num_classes` classes
    pub fn classifier_config(&self, num_classes: usize) -> ClassifierConfig {
        ClassifierConfig::new(num_classes, self.model.backbone.config())
            .with_input_size(self.data.image_size as usize)
            .with_dense_units(self.model.dense_units)
            .with_dropout(self.model.dropout)
    }

    pub fn validate(&self) -> Result<()> {
        if self.data.image_size == 0 {
            return Err(TransferError::Config("image_size must be positive".to_string()));
        }
        self.split().validate()?;
        self.augmentation.validate()?;
        self.training.validate()?;
        // num_classes is only known after loading; 2 is the smallest valid count
        self.classifier_config(2).validate()
    }
}

pub fn load_toml_config<T>(path: &Path) -> Result<T>
where
    T: DeserializeOwned,
{
    let content = fs::read_to_string(path)
        .map_err(|e| TransferError::Config(format!("Failed to read config {}: {e}", path.display())))?;

    toml::from_str(&content)
        .map_err(|e| TransferError::Config(format!("Failed to parse config {}: {e}", path.display())))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_defaults_are_valid() {
        let config = PipelineConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.seed, 42);
        assert_eq!(config.data.image_size, 128);
        assert_eq!(config.split(), ValidationSplit::default());
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("run.toml");
        fs::write(
            &path,
            r#"
seed = 7

[data]
data_dir = "flowers"

[training.phase1]
epochs = 3
learning_rate = 0.001

[model]
backbone = "tiny"
"#,
        )
        .unwrap();

        let config = PipelineConfig::load(&path).unwrap();
        assert_eq!(config.seed, 7);
        assert_eq!(config.data.data_dir, PathBuf::from("flowers"));
        assert_eq!(config.data.image_size, 128);
        assert_eq!(config.training.phase1.epochs, 3);
        assert_eq!(config.training.phase2.epochs, 5);
        assert_eq!(config.model.backbone, BackboneVariant::Tiny);
    }

    #[test]
    fn test_save_and_reload() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("run.toml");
        let mut config = PipelineConfig::default();
        config.training.unfreeze_last = 12;
        config.save(&path).unwrap();

        let restored = PipelineConfig::load(&path).unwrap();
        assert_eq!(restored.training.unfreeze_last, 12);
    }

    #[test]
    fn test_invalid_split_rejected() {
        let mut config = PipelineConfig::default();
        config.data.validation_split = 1.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_backbone_parse() {
        assert_eq!(BackboneVariant::parse("B2").unwrap(), BackboneVariant::EfficientnetV2B2);
        assert_eq!(BackboneVariant::parse("tiny").unwrap(), BackboneVariant::Tiny);
        assert!(BackboneVariant::parse("resnet").is_err());
    }

    #[test]
    fn test_classifier_config_follows_sections() {
        let config = PipelineConfig::default();
        let classifier = config.classifier_config(5);
        assert_eq!(classifier.num_classes, 5);
        assert_eq!(classifier.dense_units, 256);
        assert_eq!(classifier.backbone.num_layers(), 76);
    }
}
