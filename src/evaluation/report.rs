//! Classification report
//!
//! Text layout follows the familiar precision / recall / f1-score / support
//! table with two-decimal scores. Rows cover the labels that occur in the
//! ground truth or the predictions, the same set the macro average uses.

use std::fs;
use std::path::Path;

use colored::Colorize;
use serde::{Deserialize, Serialize};

use crate::dataset::ClassIndex;
use crate::utils::error::Result;
use crate::utils::metrics::{AveragedScores, Metrics};

pub const REPORT_FILE: &str = "classification_report.txt";
pub const METRICS_FILE: &str = "metrics.json";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassificationReport {
    pub class_names: Vec<String>,
    pub metrics: Metrics,
}

impl ClassificationReport {
    pub fn new(metrics: Metrics, classes: &ClassIndex) -> Self {
        Self {
            class_names: classes.names().to_vec(),
            metrics: metrics.with_class_names(classes.names()),
        }
    }

    /// Fixed-width text table
    pub fn to_text(&self) -> String {
        let m = &self.metrics;
        let predicted = m.confusion_matrix.col_sums();
        let rows: Vec<_> = m
            .per_class
            .iter()
            .filter(|c| c.support > 0 || predicted[c.class_idx] > 0)
            .collect();

        let width = rows
            .iter()
            .map(|c| c.label().chars().count())
            .chain(std::iter::once("weighted avg".len()))
            .max()
            .unwrap_or(12);

        let mut out = format!(
            "{:>width$} {:>9} {:>9} {:>9} {:>9}\n\n",
            "",
            "precision",
            "recall",
            "f1-score",
            "support",
            width = width
        );

        for class in &rows {
            out.push_str(&format!(
                "{:>width$} {:>9.2} {:>9.2} {:>9.2} {:>9}\n",
                class.label(),
                class.precision,
                class.recall,
                class.f1,
                class.support,
                width = width
            ));
        }

        out.push('\n');
        out.push_str(&format!(
            "{:>width$} {:>9} {:>9} {:>9.2} {:>9}\n",
            "accuracy",
            "",
            "",
            m.accuracy,
            m.total_samples,
            width = width
        ));
        out.push_str(&averaged_row("macro avg", &m.macro_avg, m.total_samples, width));
        out.push_str(&averaged_row("weighted avg", &m.weighted_avg, m.total_samples, width));
        out
    }

    pub fn print(&self) {
        println!("{}", "Classification Report:".cyan().bold());
        println!("{}", self.to_text());
        println!("{}", self.metrics.confusion_matrix.display(Some(&self.class_names)));
    }

    /// Write the text report and the full metrics as JSON into `dir`
    pub fn save(&self, dir: &Path) -> Result<()> {
        fs::create_dir_all(dir)?;
        let text = format!(
            "{}\n{}",
            self.to_text(),
            self.metrics.confusion_matrix.display(Some(&self.class_names))
        );
        fs::write(dir.join(REPORT_FILE), text)?;
        fs::write(dir.join(METRICS_FILE), serde_json::to_string_pretty(self)?)?;
        Ok(())
    }
}

fn averaged_row(label: &str, scores: &AveragedScores, support: usize, width: usize) -> String {
    format!(
        "{:>width$} {:>9.2} {:>9.2} {:>9.2} {:>9}\n",
        label,
        scores.precision,
        scores.recall,
        scores.f1,
        support,
        width = width
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn report() -> ClassificationReport {
        let classes = ClassIndex::new(vec!["cat".to_string(), "dog".to_string(), "fox".to_string()]);
        let truth = [0, 0, 1, 1, 1, 0];
        let preds = [0, 1, 1, 1, 0, 0];
        let metrics = Metrics::from_predictions(&preds, &truth, 3).unwrap();
        ClassificationReport::new(metrics, &classes)
    }

    #[test]
    fn test_text_uses_class_names() {
        let text = report().to_text();
        assert!(text.contains("cat"));
        assert!(text.contains("dog"));
        assert!(text.contains("macro avg"));
        assert!(text.contains("weighted avg"));
        // fox never appears in truth or predictions
        assert!(!text.contains("fox"));
    }

    #[test]
    fn test_accuracy_row() {
        let text = report().to_text();
        let line = text.lines().find(|l| l.trim_start().starts_with("accuracy")).unwrap();
        assert!(line.contains("0.67"));
        assert!(line.trim_end().ends_with('6'));
    }

    #[test]
    fn test_save_writes_both_files() {
        let dir = TempDir::new().unwrap();
        report().save(dir.path()).unwrap();
        assert!(dir.path().join(REPORT_FILE).exists());

        let json = fs::read_to_string(dir.path().join(METRICS_FILE)).unwrap();
        let restored: ClassificationReport = serde_json::from_str(&json).unwrap();
        assert_eq!(restored.metrics.total_samples, 6);
    }
}
