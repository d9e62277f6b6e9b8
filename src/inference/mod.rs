//! Inference module
//!
//! Loads a finished training run (architecture, best weights, class index)
//! and classifies single images or whole directories.

pub mod predictor;

pub use predictor::{PredictionResult, Predictor};

/// Default number of ranked classes reported per image
pub const DEFAULT_TOP_K: usize = 3;
