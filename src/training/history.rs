//! Per-epoch training history
//!
//! One append-only record per phase, saved as JSON and CSV and plotted as
//! accuracy and loss curves.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::utils::charts::{generate_line_chart, DataSeries, YAxis, COLOR_PRIMARY, COLOR_TERTIARY};
use crate::utils::error::Result;

/// Metrics of one finished epoch. Accuracies are fractions in [0, 1].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EpochMetrics {
    /// 1-based epoch within its phase
    pub epoch: usize,
    /// Mean class-weighted training loss
    pub loss: f64,
    pub accuracy: f64,
    /// Mean unweighted validation loss
    pub val_loss: f64,
    pub val_accuracy: f64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TrainingHistory {
    pub phase: String,
    pub epochs: Vec<EpochMetrics>,
}

impl TrainingHistory {
    pub fn new(phase: &str) -> Self {
        Self {
            phase: phase.to_string(),
            epochs: Vec::new(),
        }
    }

    pub fn push(&mut self, metrics: EpochMetrics) {
        self.epochs.push(metrics);
    }

    pub fn len(&self) -> usize {
        self.epochs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.epochs.is_empty()
    }

    /// Epoch with the lowest validation loss (first one on ties)
    pub fn best_epoch(&self) -> Option<&EpochMetrics> {
        self.epochs.iter().fold(None, |best: Option<&EpochMetrics>, m| match best {
            Some(b) if b.val_loss <= m.val_loss => Some(b),
            _ => Some(m),
        })
    }

    pub fn last(&self) -> Option<&EpochMetrics> {
        self.epochs.last()
    }

    fn column(&self, f: impl Fn(&EpochMetrics) -> f64) -> Vec<f64> {
        self.epochs.iter().map(f).collect()
    }

    pub fn save_json(&self, path: &Path) -> Result<()> {
        fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }

    pub fn load_json(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }

    pub fn save_csv(&self, path: &Path) -> Result<()> {
        let mut csv = String::from("epoch,loss,accuracy,val_loss,val_accuracy\n");
        for m in &self.epochs {
            csv.push_str(&format!(
                "{},{:.6},{:.6},{:.6},{:.6}\n",
                m.epoch, m.loss, m.accuracy, m.val_loss, m.val_accuracy
            ));
        }
        fs::write(path, csv)?;
        Ok(())
    }

    /// Write `<stem>.json`, `<stem>.csv`, `<stem>_accuracy.svg` and `<stem>_loss.svg`
    pub fn save_all(&self, dir: &Path, stem: &str) -> Result<()> {
        fs::create_dir_all(dir)?;
        self.save_json(&dir.join(format!("{}.json", stem)))?;
        self.save_csv(&dir.join(format!("{}.csv", stem)))?;

        if self.is_empty() {
            return Ok(());
        }

        generate_line_chart(
            &format!("Training and Validation Accuracy ({})", self.phase),
            "Epoch",
            "Accuracy",
            YAxis::Fraction,
            &[
                DataSeries::from_epochs("Training", &self.column(|m| m.accuracy), COLOR_PRIMARY),
                DataSeries::from_epochs("Validation", &self.column(|m| m.val_accuracy), COLOR_TERTIARY),
            ],
            &dir.join(format!("{}_accuracy.svg", stem)),
        )?;
        generate_line_chart(
            &format!("Training and Validation Loss ({})", self.phase),
            "Epoch",
            "Loss",
            YAxis::Value,
            &[
                DataSeries::from_epochs("Training", &self.column(|m| m.loss), COLOR_PRIMARY),
                DataSeries::from_epochs("Validation", &self.column(|m| m.val_loss), COLOR_TERTIARY),
            ],
            &dir.join(format!("{}_loss.svg", stem)),
        )?;
        Ok(())
    }
}
