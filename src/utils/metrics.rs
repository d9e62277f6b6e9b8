//! Metrics Module for Model Evaluation
//!
//! Classification metrics computed from integer labels:
//! - Confusion matrix (rows = actual, columns = predicted)
//! - Per-class precision, recall, F1 and support
//! - Accuracy with macro and support-weighted averages
//! - Sample-weighted running averages used during training

use serde::{Deserialize, Serialize};

use crate::utils::error::{Result, TransferError};

/// Aggregate metrics for one evaluation pass
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Metrics {
    /// Total number of samples evaluated
    pub total_samples: usize,

    /// Number of correct predictions
    pub correct_predictions: usize,

    /// Overall accuracy (correct / total)
    pub accuracy: f64,

    /// Unweighted mean over the averaged labels
    pub macro_avg: AveragedScores,

    /// Mean weighted by per-class support
    pub weighted_avg: AveragedScores,

    /// Per-class metrics, indexed by class
    pub per_class: Vec<ClassMetrics>,

    /// Confusion matrix
    pub confusion_matrix: ConfusionMatrix,
}

/// Precision / recall / F1 triple produced by an averaging strategy
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct AveragedScores {
    pub precision: f64,
    pub recall: f64,
    pub f1: f64,
}

impl Metrics {
    /// Compute metrics from predicted and true labels.
    ///
    /// Macro averages cover every label that occurs in either the truth or the
    /// predictions; a class that never occurs in both is left out of the mean.
    pub fn from_predictions(
        predictions: &[usize],
        ground_truth: &[usize],
        num_classes: usize,
    ) -> Result<Self> {
        if predictions.len() != ground_truth.len() {
            return Err(TransferError::ShapeMismatch {
                context: "evaluation labels".to_string(),
                expected: format!("{} predictions", ground_truth.len()),
                actual: format!("{} predictions", predictions.len()),
            });
        }
        if let Some(&bad) = predictions
            .iter()
            .chain(ground_truth.iter())
            .find(|&&label| label >= num_classes)
        {
            return Err(TransferError::InvalidInput(format!(
                "label {} out of range for {} classes",
                bad, num_classes
            )));
        }

        let total_samples = predictions.len();
        let confusion_matrix =
            ConfusionMatrix::from_predictions(predictions, ground_truth, num_classes);
        let correct_predictions = confusion_matrix.correct();
        let accuracy = confusion_matrix.accuracy();

        let per_class: Vec<ClassMetrics> = (0..num_classes)
            .map(|class_idx| ClassMetrics::from_confusion_matrix(&confusion_matrix, class_idx))
            .collect();

        let predicted_counts = confusion_matrix.col_sums();
        let averaged: Vec<&ClassMetrics> = per_class
            .iter()
            .filter(|m| m.support > 0 || predicted_counts[m.class_idx] > 0)
            .collect();

        let macro_avg = if averaged.is_empty() {
            AveragedScores::default()
        } else {
            let n = averaged.len() as f64;
            AveragedScores {
                precision: averaged.iter().map(|m| m.precision).sum::<f64>() / n,
                recall: averaged.iter().map(|m| m.recall).sum::<f64>() / n,
                f1: averaged.iter().map(|m| m.f1).sum::<f64>() / n,
            }
        };

        let total_support: usize = per_class.iter().map(|m| m.support).sum();
        let weighted_avg = if total_support > 0 {
            let weighted = |f: fn(&ClassMetrics) -> f64| {
                per_class
                    .iter()
                    .map(|m| f(m) * m.support as f64)
                    .sum::<f64>()
                    / total_support as f64
            };
            AveragedScores {
                precision: weighted(|m: &ClassMetrics| m.precision),
                recall: weighted(|m: &ClassMetrics| m.recall),
                f1: weighted(|m: &ClassMetrics| m.f1),
            }
        } else {
            AveragedScores::default()
        };

        Ok(Self {
            total_samples,
            correct_predictions,
            accuracy,
            macro_avg,
            weighted_avg,
            per_class,
            confusion_matrix,
        })
    }

    /// Attach class names to the per-class entries
    pub fn with_class_names(mut self, names: &[String]) -> Self {
        for metrics in &mut self.per_class {
            if let Some(name) = names.get(metrics.class_idx) {
                metrics.class_name = Some(name.clone());
            }
        }
        self
    }
}

/// Per-class metrics
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ClassMetrics {
    /// Class index
    pub class_idx: usize,

    /// Class name (if available)
    pub class_name: Option<String>,

    pub true_positives: usize,
    pub false_positives: usize,
    pub false_negatives: usize,

    /// Precision = TP / (TP + FP), 0 when nothing was predicted as this class
    pub precision: f64,

    /// Recall = TP / (TP + FN), 0 when the class has no support
    pub recall: f64,

    /// Harmonic mean of precision and recall
    pub f1: f64,

    /// Number of actual samples of this class
    pub support: usize,
}

impl ClassMetrics {
    /// Calculate metrics for a class from confusion matrix
    pub fn from_confusion_matrix(cm: &ConfusionMatrix, class_idx: usize) -> Self {
        let true_positives = cm.get(class_idx, class_idx);

        // Predicted as this class but actually another
        let false_positives: usize = (0..cm.num_classes)
            .filter(|&i| i != class_idx)
            .map(|i| cm.get(i, class_idx))
            .sum();

        // Actually this class but predicted as another
        let false_negatives: usize = (0..cm.num_classes)
            .filter(|&i| i != class_idx)
            .map(|i| cm.get(class_idx, i))
            .sum();

        let support = true_positives + false_negatives;

        let precision = if true_positives + false_positives > 0 {
            true_positives as f64 / (true_positives + false_positives) as f64
        } else {
            0.0
        };

        let recall = if support > 0 {
            true_positives as f64 / support as f64
        } else {
            0.0
        };

        let f1 = if precision + recall > 0.0 {
            2.0 * precision * recall / (precision + recall)
        } else {
            0.0
        };

        Self {
            class_idx,
            class_name: None,
            true_positives,
            false_positives,
            false_negatives,
            precision,
            recall,
            f1,
            support,
        }
    }

    /// Display name, falling back to the index
    pub fn label(&self) -> String {
        self.class_name
            .clone()
            .unwrap_or_else(|| self.class_idx.to_string())
    }
}

/// Confusion Matrix for multi-class classification
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConfusionMatrix {
    /// Number of classes
    pub num_classes: usize,

    /// Row-major counts (row = actual, column = predicted)
    pub matrix: Vec<usize>,
}

impl ConfusionMatrix {
    /// Create a new empty confusion matrix
    pub fn new(num_classes: usize) -> Self {
        Self {
            num_classes,
            matrix: vec![0; num_classes * num_classes],
        }
    }

    /// Create confusion matrix from predictions and ground truth
    pub fn from_predictions(predictions: &[usize], ground_truth: &[usize], num_classes: usize) -> Self {
        let mut cm = Self::new(num_classes);

        for (&pred, &actual) in predictions.iter().zip(ground_truth.iter()) {
            cm.add(actual, pred);
        }

        cm
    }

    /// Add a single prediction to the matrix
    pub fn add(&mut self, actual: usize, predicted: usize) {
        if actual < self.num_classes && predicted < self.num_classes {
            self.matrix[actual * self.num_classes + predicted] += 1;
        }
    }

    /// Get the count at (actual, predicted)
    pub fn get(&self, actual: usize, predicted: usize) -> usize {
        if actual < self.num_classes && predicted < self.num_classes {
            self.matrix[actual * self.num_classes + predicted]
        } else {
            0
        }
    }

    pub fn total(&self) -> usize {
        self.matrix.iter().sum()
    }

    /// Number of correct predictions (diagonal sum)
    pub fn correct(&self) -> usize {
        (0..self.num_classes).map(|i| self.get(i, i)).sum()
    }

    pub fn accuracy(&self) -> f64 {
        let total = self.total();
        if total > 0 {
            self.correct() as f64 / total as f64
        } else {
            0.0
        }
    }

    /// Column sums (predicted class counts)
    pub fn col_sums(&self) -> Vec<usize> {
        (0..self.num_classes)
            .map(|col| (0..self.num_classes).map(|row| self.get(row, col)).sum())
            .collect()
    }

    /// Render the matrix with optional class names (truncated to fit)
    pub fn display(&self, class_names: Option<&[String]>) -> String {
        let mut output = String::new();

        output.push_str("Confusion Matrix (rows=actual, cols=predicted):\n\n");

        if self.num_classes > 20 {
            output.push_str(&format!(
                "(Matrix too large to display: {}x{})\n",
                self.num_classes, self.num_classes
            ));
            return output;
        }

        let short = |idx: usize, width: usize| -> String {
            match class_names.and_then(|names| names.get(idx)) {
                Some(name) => name.chars().take(width).collect(),
                None => idx.to_string(),
            }
        };

        output.push_str("          ");
        for col in 0..self.num_classes {
            output.push_str(&format!("{:>6}", short(col, 6)));
        }
        output.push('\n');

        for row in 0..self.num_classes {
            output.push_str(&format!("{:>8} ", short(row, 8)));
            for col in 0..self.num_classes {
                let count = self.get(row, col);
                if row == col {
                    output.push_str(&format!("[{:>4}]", count));
                } else if count > 0 {
                    output.push_str(&format!(" {:>4} ", count));
                } else {
                    output.push_str("    . ");
                }
            }
            output.push('\n');
        }

        output
    }
}

/// Sample-weighted running mean, used for per-epoch loss and accuracy
#[derive(Debug, Clone, Default)]
pub struct RunningAverage {
    sum: f64,
    count: usize,
}

impl RunningAverage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a batch mean computed over `n` samples
    pub fn update(&mut self, batch_mean: f64, n: usize) {
        self.sum += batch_mean * n as f64;
        self.count += n;
    }

    pub fn average(&self) -> f64 {
        if self.count > 0 {
            self.sum / self.count as f64
        } else {
            0.0
        }
    }

    pub fn count(&self) -> usize {
        self.count
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_confusion_matrix_counts() {
        let predictions = vec![0, 1, 2, 0, 1, 2];
        let ground_truth = vec![0, 1, 2, 1, 1, 0];
        let cm = ConfusionMatrix::from_predictions(&predictions, &ground_truth, 3);

        assert_eq!(cm.get(0, 0), 1);
        assert_eq!(cm.get(1, 1), 2);
        assert_eq!(cm.get(1, 0), 1);
        assert_eq!(cm.get(0, 2), 1);
        assert_eq!(cm.total(), 6);
        assert_eq!(cm.correct(), 4);
    }

    #[test]
    fn test_perfect_predictions() {
        let labels = vec![0, 1, 2, 0, 1, 2];
        let metrics = Metrics::from_predictions(&labels, &labels, 3).unwrap();

        assert_eq!(metrics.accuracy, 1.0);
        assert_eq!(metrics.macro_avg.f1, 1.0);
        assert_eq!(metrics.weighted_avg.recall, 1.0);
    }

    #[test]
    fn test_class_metrics_values() {
        // class 0: TP=2, FP=1, FN=1
        let predictions = vec![0, 0, 0, 1, 1];
        let ground_truth = vec![0, 0, 1, 0, 1];
        let metrics = Metrics::from_predictions(&predictions, &ground_truth, 2).unwrap();

        let c0 = &metrics.per_class[0];
        assert_eq!(c0.support, 3);
        assert!((c0.precision - 2.0 / 3.0).abs() < 1e-9);
        assert!((c0.recall - 2.0 / 3.0).abs() < 1e-9);

        let c1 = &metrics.per_class[1];
        assert_eq!(c1.support, 2);
        assert!((c1.precision - 0.5).abs() < 1e-9);
        assert!((c1.recall - 0.5).abs() < 1e-9);

        // weighted = (3 * 2/3 + 2 * 0.5) / 5
        assert!((metrics.weighted_avg.recall - 0.6).abs() < 1e-9);
        assert!((metrics.accuracy - 0.6).abs() < 1e-9);
    }

    #[test]
    fn test_macro_average_skips_absent_labels() {
        // class 2 never appears in truth or predictions
        let predictions = vec![0, 1];
        let ground_truth = vec![0, 1];
        let metrics = Metrics::from_predictions(&predictions, &ground_truth, 3).unwrap();
        assert_eq!(metrics.macro_avg.precision, 1.0);
    }

    #[test]
    fn test_macro_average_counts_predicted_only_labels() {
        // class 1 is predicted but has no support: precision 0 enters the mean
        let predictions = vec![0, 1];
        let ground_truth = vec![0, 0];
        let metrics = Metrics::from_predictions(&predictions, &ground_truth, 2).unwrap();
        assert!((metrics.macro_avg.precision - 0.5).abs() < 1e-9);
    }

    #[test]
    fn test_length_mismatch_is_error() {
        let result = Metrics::from_predictions(&[0, 1], &[0], 2);
        assert!(matches!(result, Err(TransferError::ShapeMismatch { .. })));
    }

    #[test]
    fn test_out_of_range_label_is_error() {
        assert!(Metrics::from_predictions(&[0, 5], &[0, 1], 2).is_err());
    }

    #[test]
    fn test_running_average_weights_by_samples() {
        let mut avg = RunningAverage::new();
        avg.update(1.0, 3);
        avg.update(0.0, 1);
        assert!((avg.average() - 0.75).abs() < 1e-12);
        assert_eq!(avg.count(), 4);
    }

    #[test]
    fn test_confusion_display_uses_names() {
        let cm = ConfusionMatrix::from_predictions(&[0, 1], &[0, 1], 2);
        let names = vec!["daisy".to_string(), "rose".to_string()];
        let text = cm.display(Some(&names));
        assert!(text.contains("daisy"));
        assert!(text.contains("[   1]"));
    }
}
