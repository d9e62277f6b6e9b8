//! # Transfer Classifier
//!
//! Two-phase transfer-learning image classification with the Burn framework.
//!
//! ## Features
//!
//! - **Directory datasets**: `root/<class>/<image>` with a seeded validation split
//! - **Class balance**: distribution report and inverse-frequency class weights
//! - **On-the-fly augmentation**: flip, rotation, zoom and contrast, re-sampled every epoch
//! - **Transfer learning**: frozen EfficientNetV2-style backbone, then partial fine-tuning
//! - **Early stopping and best checkpoints** on validation loss
//!
//! ## Modules
//!
//! - `dataset`: Loading, splitting, class index, distribution analysis, augmentation, batching
//! - `model`: Backbone, classification head and per-layer trainability
//! - `training`: Loss, callbacks, history and the two-phase controller
//! - `evaluation`: Classification report on the validation subset
//! - `inference`: Prediction for single images or directories
//! - `utils`: Errors, logging, metrics and charts
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use transfer_classifier::backend::{default_device, TrainingBackend};
//! use transfer_classifier::config::PipelineConfig;
//! use transfer_classifier::pipeline::run_training;
//!
//! let mut config = PipelineConfig::default();
//! config.data.data_dir = "data/flowers".into();
//! let run = run_training::<TrainingBackend>(&config, default_device())?;
//! println!("{}", run.report.to_text());
//! ```

pub mod backend;
pub mod config;
pub mod dataset;
pub mod evaluation;
pub mod inference;
pub mod model;
pub mod pipeline;
pub mod training;
pub mod utils;

// Re-export commonly used items for convenience
pub use config::PipelineConfig;
pub use dataset::{ClassIndex, ClassWeights, ImageFolder, SplitDataset, ValidationSplit};
pub use evaluation::ClassificationReport;
pub use inference::Predictor;
pub use model::{ClassifierConfig, TrainabilityPlan, TransferClassifier};
pub use training::{TrainingConfig, TrainingController};
pub use utils::error::{Result, TransferError};
pub use utils::metrics::{ConfusionMatrix, Metrics};

/// Default image size fed to the model
pub const IMAGE_SIZE: usize = 128;

/// Default batch size
pub const BATCH_SIZE: usize = 32;

/// Default random seed
pub const SEED: u64 = 42;

/// Version of the library
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
