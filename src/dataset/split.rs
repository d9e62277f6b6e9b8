//! Seeded training/validation split
//!
//! The full ordered sample list is shuffled once with a seeded ChaCha8 RNG and
//! the last `floor(fraction * n)` samples become the validation subset. The
//! same directory, fraction and seed always produce the same assignment.

use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::dataset::class_index::ClassIndex;
use crate::dataset::loader::{ImageFolder, ImageSample};
use crate::utils::error::{Result, TransferError};

/// Split parameters
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ValidationSplit {
    /// Fraction of all samples held out for validation, in (0, 1)
    pub fraction: f64,
    /// Shuffle seed
    pub seed: u64,
}

impl Default for ValidationSplit {
    fn default() -> Self {
        Self {
            fraction: 0.2,
            seed: 42,
        }
    }
}

impl ValidationSplit {
    pub fn new(fraction: f64, seed: u64) -> Result<Self> {
        let split = Self { fraction, seed };
        split.validate()?;
        Ok(split)
    }

    pub fn validate(&self) -> Result<()> {
        if !(self.fraction > 0.0 && self.fraction < 1.0) {
            return Err(TransferError::Config(format!(
                "validation fraction must be in (0, 1), got {}",
                self.fraction
            )));
        }
        Ok(())
    }

    /// Number of validation samples for a dataset of `total` samples
    pub fn validation_count(&self, total: usize) -> usize {
        (self.fraction * total as f64).floor() as usize
    }

    /// Partition an indexed folder into training and validation subsets
    pub fn apply(&self, folder: &ImageFolder) -> Result<SplitDataset> {
        self.validate()?;

        let mut samples = folder.samples.clone();
        let mut rng = ChaCha8Rng::seed_from_u64(self.seed);
        samples.shuffle(&mut rng);

        let num_val = self.validation_count(samples.len());
        if num_val == 0 || num_val == samples.len() {
            return Err(TransferError::Dataset(format!(
                "{} images cannot be split with validation fraction {}: one subset would be empty",
                samples.len(),
                self.fraction
            )));
        }

        let validation = samples.split_off(samples.len() - num_val);
        let training = samples;

        info!(
            "Using {} files for training, {} files for validation",
            training.len(),
            validation.len()
        );

        Ok(SplitDataset {
            training,
            validation,
            classes: folder.classes.clone(),
        })
    }
}

/// Disjoint training and validation subsets of one image folder
#[derive(Debug, Clone)]
pub struct SplitDataset {
    pub training: Vec<ImageSample>,
    pub validation: Vec<ImageSample>,
    pub classes: ClassIndex,
}

impl SplitDataset {
    pub fn num_classes(&self) -> usize {
        self.classes.len()
    }

    pub fn training_labels(&self) -> Vec<usize> {
        self.training.iter().map(|s| s.label).collect()
    }

    pub fn validation_labels(&self) -> Vec<usize> {
        self.validation.iter().map(|s| s.label).collect()
    }
}
