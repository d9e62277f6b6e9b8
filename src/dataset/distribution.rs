//! Class distribution analysis and class weights
//!
//! Counts are exact. Percentages are kept unrounded and only rounded to two
//! decimals when displayed, so nothing downstream depends on display rounding.

use std::path::Path;

use colored::Colorize;
use serde::{Deserialize, Serialize};

use crate::dataset::class_index::ClassIndex;
use crate::utils::charts::{generate_bar_chart, BarData, COLOR_PRIMARY, COLOR_SECONDARY, COLOR_TERTIARY};
use crate::utils::error::{Result, TransferError};
use crate::utils::format_bar;

/// Per-class sample counts for one subset
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassCounts {
    counts: Vec<usize>,
}

impl ClassCounts {
    /// Count labels in a single pass
    pub fn from_labels(labels: &[usize], num_classes: usize) -> Result<Self> {
        let mut counts = vec![0usize; num_classes];
        for &label in labels {
            match counts.get_mut(label) {
                Some(count) => *count += 1,
                None => {
                    return Err(TransferError::InvalidInput(format!(
                        "label {} out of range for {} classes",
                        label, num_classes
                    )))
                }
            }
        }
        Ok(Self { counts })
    }

    pub fn from_counts(counts: Vec<usize>) -> Self {
        Self { counts }
    }

    pub fn counts(&self) -> &[usize] {
        &self.counts
    }

    pub fn total(&self) -> usize {
        self.counts.iter().sum()
    }

    pub fn num_classes(&self) -> usize {
        self.counts.len()
    }

    /// Unrounded percentage share per class (all zero for an empty subset)
    pub fn percentages(&self) -> Vec<f64> {
        let total = self.total();
        self.counts
            .iter()
            .map(|&c| {
                if total == 0 {
                    0.0
                } else {
                    c as f64 / total as f64 * 100.0
                }
            })
            .collect()
    }
}

/// Round to two decimals for display
pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Class distribution of the training and validation subsets
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DistributionReport {
    pub class_names: Vec<String>,
    pub training: ClassCounts,
    pub validation: ClassCounts,
}

impl DistributionReport {
    pub fn new(classes: &ClassIndex, training: ClassCounts, validation: ClassCounts) -> Self {
        Self {
            class_names: classes.names().to_vec(),
            training,
            validation,
        }
    }

    /// Mean of the training and validation percentages per class
    pub fn overall_percentages(&self) -> Vec<f64> {
        self.training
            .percentages()
            .iter()
            .zip(self.validation.percentages())
            .map(|(t, v)| (t + v) / 2.0)
            .collect()
    }

    /// Formatted console table
    pub fn display(&self) -> String {
        let mut out = String::new();
        let train_pct = self.training.percentages();
        let val_pct = self.validation.percentages();
        let overall = self.overall_percentages();
        let width = self
            .class_names
            .iter()
            .map(|n| n.chars().count())
            .max()
            .unwrap_or(5)
            .max(5);

        out.push_str(&format!(
            "{:<width$} {:>8} {:>9} {:>8} {:>9} {:>9}\n",
            "Class",
            "Train",
            "Train %",
            "Val",
            "Val %",
            "Overall %",
            width = width
        ));
        for (i, name) in self.class_names.iter().enumerate() {
            out.push_str(&format!(
                "{:<width$} {:>8} {:>8.2}% {:>8} {:>8.2}% {:>8.2}%  {}\n",
                name,
                self.training.counts()[i],
                round2(train_pct[i]),
                self.validation.counts()[i],
                round2(val_pct[i]),
                round2(overall[i]),
                format_bar(overall[i] / 100.0, 20),
                width = width
            ));
        }
        out.push_str(&format!(
            "{:<width$} {:>8} {:>9} {:>8}\n",
            "Total",
            self.training.total(),
            "",
            self.validation.total(),
            width = width
        ));
        out
    }

    pub fn print(&self) {
        println!("{}", "Class Distribution:".cyan().bold());
        print!("{}", self.display());
    }

    /// Write training, validation and overall bar charts into `dir`
    pub fn save_charts(&self, dir: &Path) -> Result<()> {
        std::fs::create_dir_all(dir)?;
        let charts = [
            ("Training Distribution", self.training.percentages(), COLOR_PRIMARY, "distribution_training.svg"),
            ("Validation Distribution", self.validation.percentages(), COLOR_SECONDARY, "distribution_validation.svg"),
            ("Overall Distribution", self.overall_percentages(), COLOR_TERTIARY, "distribution_overall.svg"),
        ];

        for (title, values, color, file) in charts {
            let bars: Vec<BarData> = self
                .class_names
                .iter()
                .zip(values)
                .map(|(name, value)| BarData {
                    label: name.clone(),
                    value: round2(value),
                    color: color.to_string(),
                })
                .collect();
            generate_bar_chart(title, "Share of images (%)", &bars, &dir.join(file))?;
        }
        Ok(())
    }
}

/// Inverse-frequency class weights
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassWeights {
    weights: Vec<f64>,
}

impl ClassWeights {
    /// `weight[c] = total / (num_classes * count[c])`.
    ///
    /// Fails on a class with zero samples, naming the class.
    pub fn inverse_frequency(counts: &ClassCounts, classes: &ClassIndex) -> Result<Self> {
        let total = counts.total() as f64;
        let num_classes = counts.num_classes() as f64;

        let weights = counts
            .counts()
            .iter()
            .enumerate()
            .map(|(index, &count)| {
                if count == 0 {
                    Err(TransferError::EmptyClass {
                        class: classes.name(index).unwrap_or("<unnamed>").to_string(),
                        index,
                    })
                } else {
                    Ok(total / (num_classes * count as f64))
                }
            })
            .collect::<Result<Vec<f64>>>()?;

        Ok(Self { weights })
    }

    pub fn as_slice(&self) -> &[f64] {
        &self.weights
    }

    pub fn get(&self, class: usize) -> Option<f64> {
        self.weights.get(class).copied()
    }

    pub fn len(&self) -> usize {
        self.weights.len()
    }

    pub fn is_empty(&self) -> bool {
        self.weights.is_empty()
    }

    /// Weights as f32 for building the loss tensor
    pub fn to_f32(&self) -> Vec<f32> {
        self.weights.iter().map(|&w| w as f32).collect()
    }

    pub fn print(&self, classes: &ClassIndex) {
        println!("{}", "Class Weights:".cyan().bold());
        for (i, w) in self.weights.iter().enumerate() {
            println!("  {:>3} {:<30} {:.4}", i, classes.name(i).unwrap_or("?"), w);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::{Rng, SeedableRng};
    use rand_chacha::ChaCha8Rng;

    fn abc() -> ClassIndex {
        ClassIndex::new(vec!["A".to_string(), "B".to_string(), "C".to_string()])
    }

    #[test]
    fn test_counts_single_pass() {
        let counts = ClassCounts::from_labels(&[0, 2, 2, 1, 2], 3).unwrap();
        assert_eq!(counts.counts(), &[1, 1, 3]);
        assert_eq!(counts.total(), 5);
    }

    #[test]
    fn test_count_rejects_out_of_range() {
        assert!(ClassCounts::from_labels(&[0, 3], 3).is_err());
    }

    #[test]
    fn test_weights_for_imbalanced_counts() {
        let counts = ClassCounts::from_counts(vec![50, 30, 20]);
        let weights = ClassWeights::inverse_frequency(&counts, &abc()).unwrap();

        assert!((weights.as_slice()[0] - 0.6667).abs() < 1e-3);
        assert!((weights.as_slice()[1] - 1.1111).abs() < 1e-3);
        assert!((weights.as_slice()[2] - 1.6667).abs() < 1e-3);
    }

    #[test]
    fn test_weighted_counts_sum_to_total() {
        let counts = ClassCounts::from_counts(vec![7, 13, 101, 1]);
        let classes = ClassIndex::new((0..4).map(|i| i.to_string()).collect());
        let weights = ClassWeights::inverse_frequency(&counts, &classes).unwrap();

        let weighted: f64 = counts
            .counts()
            .iter()
            .zip(weights.as_slice())
            .map(|(&c, &w)| c as f64 * w)
            .sum();
        assert!((weighted - counts.total() as f64).abs() < 1e-9);
    }

    #[test]
    fn test_zero_count_names_class() {
        let counts = ClassCounts::from_counts(vec![10, 0, 5]);
        let err = ClassWeights::inverse_frequency(&counts, &abc()).unwrap_err();
        match err {
            TransferError::EmptyClass { class, index } => {
                assert_eq!(class, "B");
                assert_eq!(index, 1);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_rounded_percentages_sum_to_hundred() {
        let counts = ClassCounts::from_counts(vec![1, 1, 1]);
        let sum: f64 = counts.percentages().iter().map(|&p| round2(p)).sum();
        assert!((sum - 100.0).abs() <= 0.1);
    }

    #[test]
    fn test_uneven_percentages_sum_to_hundred() {
        let check = |counts: Vec<usize>| {
            let counts = ClassCounts::from_counts(counts);
            let exact: f64 = counts.percentages().iter().sum();
            let rounded: f64 = counts.percentages().iter().map(|&p| round2(p)).sum();
            assert!((exact - 100.0).abs() < 1e-9);
            assert!((rounded - 100.0).abs() <= 0.1, "{:?} sums to {}", counts.counts(), rounded);
        };

        check(vec![7, 13, 101, 1]);
        check(vec![1, 2]);
        check(vec![333, 333, 334]);

        let mut rng = ChaCha8Rng::seed_from_u64(7);
        for _ in 0..200 {
            let classes = rng.gen_range(2..=20);
            check((0..classes).map(|_| rng.gen_range(1..500)).collect());
        }
    }

    #[test]
    fn test_overall_is_mean_of_subsets() {
        let report = DistributionReport::new(
            &ClassIndex::new(vec!["x".to_string(), "y".to_string()]),
            ClassCounts::from_counts(vec![75, 25]),
            ClassCounts::from_counts(vec![5, 15]),
        );
        let overall = report.overall_percentages();
        assert!((overall[0] - 50.0).abs() < 1e-9);
        assert!((overall[1] - 50.0).abs() < 1e-9);
        assert!(report.display().contains("Overall %"));
    }
}
