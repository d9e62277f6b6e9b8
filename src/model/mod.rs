//! Model module for transfer learning using the Burn framework
//!
//! This module provides:
//! - An EfficientNetV2-style backbone with per-layer freezing
//! - The classification head placed on top of the pooled backbone features
//! - Architecture configuration persisted alongside checkpoints
//!
//! ## Architecture
//!
//! ImageNet normalization → backbone → global max pool → BatchNorm →
//! Dense(256, ReLU) → BatchNorm → Dropout(0.3) → Dense(num_classes)

pub mod backbone;
pub mod classifier;
pub mod config;
pub mod trainability;

pub use backbone::Backbone;
pub use classifier::TransferClassifier;
pub use config::{BackboneConfig, BlockKind, ClassifierConfig, StageConfig, MODEL_CONFIG_FILE};
pub use trainability::{LayerState, TrainabilityPlan};

/// Default width of the hidden dense layer
pub const DEFAULT_DENSE_UNITS: usize = 256;

/// Default dropout rate for the head
pub const DEFAULT_DROPOUT: f64 = 0.3;
