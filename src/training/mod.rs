//! Training module for two-phase transfer learning
//!
//! This module provides:
//! - Class-weighted cross-entropy loss
//! - Early stopping and best-checkpoint tracking
//! - Per-epoch history with JSON/CSV export and curve plots
//! - The phase controller (frozen backbone, then partial fine-tuning)
//!   and its Burn epoch runner

pub mod callbacks;
pub mod checkpoint;
pub mod controller;
pub mod history;
pub mod loss;

use serde::{Deserialize, Serialize};

use crate::utils::error::{Result, TransferError};

pub use callbacks::{BestCheckpoint, EarlyStopping, EarlyStoppingConfig, StopDecision};
pub use checkpoint::{CheckpointMetadata, BEST_MODEL_META_FILE, BEST_MODEL_NAME};
pub use controller::{BurnEpochRunner, ControllerState, EpochRunner, PhaseOutcome, TrainingController, TrainingSummary};
pub use history::{EpochMetrics, TrainingHistory};
pub use loss::WeightedCrossEntropy;

/// Which training phase is running
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    /// Backbone fully frozen, only the head learns
    FrozenBackbone,
    /// Last layers of the backbone unfrozen
    FineTune,
}

impl Phase {
    /// Short name used in file names
    pub fn name(&self) -> &'static str {
        match self {
            Phase::FrozenBackbone => "phase1",
            Phase::FineTune => "phase2",
        }
    }

    pub fn title(&self) -> &'static str {
        match self {
            Phase::FrozenBackbone => "Phase 1 (frozen backbone)",
            Phase::FineTune => "Phase 2 (fine-tuning)",
        }
    }
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.title())
    }
}

/// Epoch budget and learning rate of one phase
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PhaseConfig {
    pub epochs: usize,
    pub learning_rate: f64,
}

impl PhaseConfig {
    pub fn validate(&self, phase: Phase) -> Result<()> {
        if !(self.learning_rate > 0.0 && self.learning_rate.is_finite()) {
            return Err(TransferError::Config(format!(
                "{}: learning rate must be positive, got {}",
                phase, self.learning_rate
            )));
        }
        Ok(())
    }
}

/// Training hyperparameters
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainingConfig {
    pub batch_size: usize,
    pub phase1: PhaseConfig,
    pub phase2: PhaseConfig,
    /// Backbone layers left trainable in phase 2
    pub unfreeze_last: usize,
    pub early_stopping: EarlyStoppingConfig,
    /// Weight the loss by inverse class frequency
    pub use_class_weights: bool,
    pub adam_epsilon: f64,
    /// Batches prepared ahead of the training step
    pub prefetch: usize,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            batch_size: 32,
            phase1: PhaseConfig {
                epochs: 10,
                learning_rate: 1e-4,
            },
            phase2: PhaseConfig {
                epochs: 5,
                learning_rate: 1e-5,
            },
            unfreeze_last: 40,
            early_stopping: EarlyStoppingConfig::default(),
            use_class_weights: true,
            adam_epsilon: 1e-7,
            prefetch: 2,
        }
    }
}

impl TrainingConfig {
    pub fn phase(&self, phase: Phase) -> &PhaseConfig {
        match phase {
            Phase::FrozenBackbone => &self.phase1,
            Phase::FineTune => &self.phase2,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.batch_size == 0 {
            return Err(TransferError::Config("batch_size must be at least 1".to_string()));
        }
        if !(self.adam_epsilon > 0.0) {
            return Err(TransferError::Config("adam_epsilon must be positive".to_string()));
        }
        self.phase1.validate(Phase::FrozenBackbone)?;
        self.phase2.validate(Phase::FineTune)?;
        self.early_stopping.validate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = TrainingConfig::default();
        assert_eq!(config.batch_size, 32);
        assert_eq!(config.phase1.epochs, 10);
        assert_eq!(config.phase2.epochs, 5);
        assert!((config.phase2.learning_rate - config.phase1.learning_rate / 10.0).abs() < 1e-12);
        assert_eq!(config.unfreeze_last, 40);
        assert_eq!(config.early_stopping.patience, 5);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_invalid_learning_rate() {
        let mut config = TrainingConfig::default();
        config.phase2.learning_rate = 0.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_phase_names() {
        assert_eq!(Phase::FrozenBackbone.name(), "phase1");
        assert_eq!(Phase::FineTune.name(), "phase2");
    }
}
