//! Model Configuration Module
//!
//! Burn `Config` structures for the backbone topology and the classifier
//! head. The classifier config is saved as `model_config.json` next to the
//! weights so inference can rebuild the exact architecture.

use burn::config::Config;
use serde::{Deserialize, Serialize};

use crate::utils::error::TransferError;

/// File name of the persisted classifier config
pub const MODEL_CONFIG_FILE: &str = "model_config.json";

/// Block family used by a backbone stage
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BlockKind {
    /// Full 3x3 conv expansion followed by a 1x1 projection
    FusedMbConv,
    /// 1x1 expansion, depthwise conv with squeeze-excitation, 1x1 projection
    MbConv,
}

/// One stage of repeated blocks
#[derive(Config, Debug)]
pub struct StageConfig {
    pub kind: BlockKind,
    /// Number of blocks in the stage
    pub repeats: usize,
    pub out_channels: usize,
    /// Stride of the first block
    pub stride: usize,
    pub expand_ratio: usize,
    #[config(default = "3")]
    pub kernel_size: usize,
}

impl StageConfig {
    /// Layer units contributed by one block of this stage
    pub fn units_per_block(&self) -> usize {
        match (self.kind, self.expand_ratio) {
            (BlockKind::FusedMbConv, 1) => 1,
            (BlockKind::FusedMbConv, _) => 2,
            (BlockKind::MbConv, 1) => 2,
            (BlockKind::MbConv, _) => 3,
        }
    }
}

/// EfficientNetV2-style backbone topology
#[derive(Config, Debug)]
pub struct BackboneConfig {
    pub stem_channels: usize,
    pub stages: Vec<StageConfig>,
    /// Channels of the final 1x1 conv
    pub head_channels: usize,
    #[config(default = "0.25")]
    pub se_ratio: f64,
}

impl BackboneConfig {
    /// EfficientNetV2-B2 layout (width 1.1, depth 1.2 of the B0 base)
    pub fn efficientnet_v2_b2() -> Self {
        Self::new(
            32,
            vec![
                StageConfig::new(BlockKind::FusedMbConv, 2, 16, 1, 1),
                StageConfig::new(BlockKind::FusedMbConv, 3, 32, 2, 4),
                StageConfig::new(BlockKind::FusedMbConv, 3, 56, 2, 4),
                StageConfig::new(BlockKind::MbConv, 4, 104, 2, 4),
                StageConfig::new(BlockKind::MbConv, 6, 120, 1, 6),
                StageConfig::new(BlockKind::MbConv, 10, 208, 2, 6),
            ],
            1408,
        )
    }

    /// A few-layer backbone for smoke tests and CPU experiments
    pub fn tiny() -> Self {
        Self::new(
            8,
            vec![
                StageConfig::new(BlockKind::FusedMbConv, 1, 8, 1, 1),
                StageConfig::new(BlockKind::FusedMbConv, 1, 16, 2, 2),
                StageConfig::new(BlockKind::MbConv, 1, 24, 2, 2),
            ],
            32,
        )
    }

    /// Ordered names of every freezable layer unit, input to output
    pub fn layer_names(&self) -> Vec<String> {
        let mut names = vec!["stem_conv".to_string()];
        let mut block = 0;

        for (stage_idx, stage) in self.stages.iter().enumerate() {
            for repeat in 0..stage.repeats {
                let prefix = format!("block{}{}", stage_idx + 1, block_letter(repeat));
                let units: &[&str] = match (stage.kind, stage.expand_ratio) {
                    (BlockKind::FusedMbConv, 1) => &["project_conv"],
                    (BlockKind::FusedMbConv, _) => &["expand_conv", "project_conv"],
                    (BlockKind::MbConv, 1) => &["dwconv_se", "project_conv"],
                    (BlockKind::MbConv, _) => &["expand_conv", "dwconv_se", "project_conv"],
                };
                names.extend(units.iter().map(|unit| format!("{}_{}", prefix, unit)));
                block += 1;
            }
        }
        debug_assert_eq!(block, self.num_blocks());

        names.push("top_conv".to_string());
        names
    }

    pub fn num_layers(&self) -> usize {
        2 + self
            .stages
            .iter()
            .map(|s| s.repeats * s.units_per_block())
            .sum::<usize>()
    }

    pub fn num_blocks(&self) -> usize {
        self.stages.iter().map(|s| s.repeats).sum()
    }

    /// Total spatial downsampling factor
    pub fn reduction(&self) -> usize {
        2 * self.stages.iter().map(|s| s.stride).product::<usize>()
    }

    pub fn validate(&self) -> crate::utils::error::Result<()> {
        if self.stages.is_empty() {
            return Err(TransferError::Config("backbone needs at least one stage".to_string()));
        }
        for (i, stage) in self.stages.iter().enumerate() {
            if stage.repeats == 0 || stage.out_channels == 0 || stage.expand_ratio == 0 {
                return Err(TransferError::Config(format!(
                    "backbone stage {} has a zero repeats, channels or expand ratio",
                    i + 1
                )));
            }
            if stage.kernel_size % 2 == 0 || !(1..=2).contains(&stage.stride) {
                return Err(TransferError::Config(format!(
                    "backbone stage {}: kernel must be odd and stride 1 or 2",
                    i + 1
                )));
            }
        }
        Ok(())
    }
}

fn block_letter(repeat: usize) -> char {
    (b'a' + (repeat % 26) as u8) as char
}

/// Classifier = backbone + pooling + dense head
#[derive(Config, Debug)]
pub struct ClassifierConfig {
    pub num_classes: usize,
    pub backbone: BackboneConfig,
    /// Square input size in pixels
    #[config(default = "128")]
    pub input_size: usize,
    #[config(default = "256")]
    pub dense_units: usize,
    #[config(default = "0.3")]
    pub dropout: f64,
}

impl ClassifierConfig {
    pub fn validate(&self) -> crate::utils::error::Result<()> {
        if self.num_classes < 2 {
            return Err(TransferError::Config(format!(
                "num_classes must be at least 2, got {}",
                self.num_classes
            )));
        }
        if self.input_size < self.backbone.reduction() {
            return Err(TransferError::Config(format!(
                "input_size {} is smaller than the backbone reduction factor {}",
                self.input_size,
                self.backbone.reduction()
            )));
        }
        if !(0.0..1.0).contains(&self.dropout) {
            return Err(TransferError::Config(format!(
                "dropout must be in [0, 1), got {}",
                self.dropout
            )));
        }
        if self.dense_units == 0 {
            return Err(TransferError::Config("dense_units must be positive".to_string()));
        }
        self.backbone.validate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_b2_layer_count() {
        let config = BackboneConfig::efficientnet_v2_b2();
        // stem + 2 + 6 + 6 + 12 + 18 + 30 + top
        assert_eq!(config.num_layers(), 76);
        assert_eq!(config.layer_names().len(), 76);
        assert_eq!(config.reduction(), 32);
    }

    #[test]
    fn test_layer_names_are_unique_and_ordered() {
        let names = BackboneConfig::efficientnet_v2_b2().layer_names();
        let unique: std::collections::HashSet<_> = names.iter().collect();
        assert_eq!(unique.len(), names.len());
        assert_eq!(names.first().map(String::as_str), Some("stem_conv"));
        assert_eq!(names.last().map(String::as_str), Some("top_conv"));
        assert!(names.contains(&"block6j_dwconv_se".to_string()));
    }

    #[test]
    fn test_tiny_layout() {
        let config = BackboneConfig::tiny();
        assert_eq!(config.num_layers(), 8);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_classifier_defaults() {
        let config = ClassifierConfig::new(5, BackboneConfig::tiny());
        assert_eq!(config.input_size, 128);
        assert_eq!(config.dense_units, 256);
        assert!((config.dropout - 0.3).abs() < 1e-12);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_classifier_validation() {
        assert!(ClassifierConfig::new(1, BackboneConfig::tiny()).validate().is_err());
        assert!(ClassifierConfig::new(3, BackboneConfig::tiny())
            .with_input_size(4)
            .validate()
            .is_err());
    }

    #[test]
    fn test_config_json_round_trip() {
        let config = ClassifierConfig::new(4, BackboneConfig::tiny()).with_dense_units(64);
        let json = serde_json::to_string(&config).unwrap();
        let restored: ClassifierConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(restored.dense_units, 64);
        assert_eq!(restored.backbone.num_layers(), 8);
    }
}
