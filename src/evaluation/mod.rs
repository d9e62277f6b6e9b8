//! Evaluation module
//!
//! Collects predictions on the validation subset and turns them into a
//! per-class classification report with a confusion matrix.

pub mod evaluator;
pub mod report;

pub use evaluator::{collect_predictions, evaluate, Predictions};
pub use report::{ClassificationReport, METRICS_FILE, REPORT_FILE};
