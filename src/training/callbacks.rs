//! Early stopping and best-checkpoint tracking on validation loss
//!
//! Both monitor `val_loss` and count an epoch as an improvement only when it
//! is strictly lower than the best seen. Early stopping is reset at the start
//! of every phase; the checkpoint tracker lives for the whole run.

use serde::{Deserialize, Serialize};

use crate::utils::error::{Result, TransferError};

/// Early stopping settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EarlyStoppingConfig {
    /// Consecutive non-improving epochs tolerated before stopping
    pub patience: usize,
    /// Required decrease to count as an improvement
    pub min_delta: f64,
    /// Restore the best epoch's weights at the end of the phase
    pub restore_best_weights: bool,
}

impl Default for EarlyStoppingConfig {
    fn default() -> Self {
        Self {
            patience: 5,
            min_delta: 0.0,
            restore_best_weights: true,
        }
    }
}

impl EarlyStoppingConfig {
    pub fn validate(&self) -> Result<()> {
        if self.patience == 0 {
            return Err(TransferError::Config("early stopping patience must be at least 1".to_string()));
        }
        if self.min_delta < 0.0 || !self.min_delta.is_finite() {
            return Err(TransferError::Config(format!(
                "early stopping min_delta must be a non-negative number, got {}",
                self.min_delta
            )));
        }
        Ok(())
    }
}

/// What the early stopper decided after an epoch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopDecision {
    Improved,
    /// No improvement; `wait` consecutive epochs so far
    Continue { wait: usize },
    /// Patience exhausted
    Stop,
}

#[derive(Debug, Clone)]
pub struct EarlyStopping {
    config: EarlyStoppingConfig,
    best: f64,
    best_epoch: Option<usize>,
    wait: usize,
    stopped_epoch: Option<usize>,
}

impl EarlyStopping {
    pub fn new(config: EarlyStoppingConfig) -> Self {
        Self {
            config,
            best: f64::INFINITY,
            best_epoch: None,
            wait: 0,
            stopped_epoch: None,
        }
    }

    /// Forget everything seen so far
    pub fn reset(&mut self) {
        self.best = f64::INFINITY;
        self.best_epoch = None;
        self.wait = 0;
        self.stopped_epoch = None;
    }

    /// Feed the validation loss of a finished epoch (1-based)
    pub fn update(&mut self, epoch: usize, val_loss: f64) -> StopDecision {
        if val_loss < self.best - self.config.min_delta {
            self.best = val_loss;
            self.best_epoch = Some(epoch);
            self.wait = 0;
            return StopDecision::Improved;
        }

        self.wait += 1;
        if self.wait >= self.config.patience {
            self.stopped_epoch = Some(epoch);
            StopDecision::Stop
        } else {
            StopDecision::Continue { wait: self.wait }
        }
    }

    pub fn best(&self) -> f64 {
        self.best
    }

    pub fn best_epoch(&self) -> Option<usize> {
        self.best_epoch
    }

    pub fn wait(&self) -> usize {
        self.wait
    }

    pub fn stopped_epoch(&self) -> Option<usize> {
        self.stopped_epoch
    }

    pub fn patience(&self) -> usize {
        self.config.patience
    }

    pub fn restore_best_weights(&self) -> bool {
        self.config.restore_best_weights
    }
}

/// Tracks the best validation loss across all phases
#[derive(Debug, Clone)]
pub struct BestCheckpoint {
    best: f64,
    saves: usize,
}

impl Default for BestCheckpoint {
    fn default() -> Self {
        Self::new()
    }
}

impl BestCheckpoint {
    pub fn new() -> Self {
        Self {
            best: f64::INFINITY,
            saves: 0,
        }
    }

    /// Returns the previous best when `val_loss` beats it, recording the new best
    pub fn improve(&mut self, val_loss: f64) -> Option<f64> {
        if val_loss < self.best {
            let previous = self.best;
            self.best = val_loss;
            self.saves += 1;
            Some(previous)
        } else {
            None
        }
    }

    pub fn best(&self) -> f64 {
        self.best
    }

    /// Number of times a new best was recorded
    pub fn saves(&self) -> usize {
        self.saves
    }
}
