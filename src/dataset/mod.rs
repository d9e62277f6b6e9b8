//! Dataset module
//!
//! This module provides functionality for:
//! - Indexing a `root/<class>/<image>` directory into labelled samples
//! - A seeded, reproducible training/validation split
//! - Persisting the class index for inference-time decoding
//! - Class distribution analysis and inverse-frequency class weights
//! - Training-time augmentation and Burn batching

pub mod augmentation;
pub mod burn_dataset;
pub mod class_index;
pub mod distribution;
pub mod loader;
pub mod split;

pub use augmentation::{AugmentationConfig, Augmenter};
pub use burn_dataset::{ClassificationBatch, ClassificationBatcher, EpochLoader, ImageDataset, ImageItem};
pub use class_index::{ClassIndex, CLASS_INDEX_FILE};
pub use distribution::{ClassCounts, ClassWeights, DistributionReport};
pub use loader::{ImageFolder, ImageSample};
pub use split::{SplitDataset, ValidationSplit};
