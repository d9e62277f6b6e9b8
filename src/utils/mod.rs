//! Utilities module for logging, metrics, and helper functions
//!
//! This module provides:
//! - Structured logging with tracing
//! - Classification metrics (confusion matrix, precision, recall, F1)
//! - SVG charts for training curves and class distributions
//! - Error handling types

pub mod charts;
pub mod error;
pub mod logging;
pub mod metrics;

pub use error::{Result, TransferError};
pub use logging::init_logging;
pub use metrics::{ConfusionMatrix, Metrics};

/// Elapsed seconds as `12.3s`, `4m 05s` or `2h 10m`
pub fn format_duration(seconds: f64) -> String {
    if seconds < 60.0 {
        return format!("{:.1}s", seconds);
    }
    let total = seconds.round() as u64;
    let (hours, minutes, secs) = (total / 3600, (total % 3600) / 60, total % 60);
    if hours == 0 {
        format!("{}m {:02}s", minutes, secs)
    } else {
        format!("{}h {}m", hours, minutes)
    }
}

/// Group digits in threes: `1234567` → `1,234,567`
pub fn format_number(n: usize) -> String {
    let digits = n.to_string();
    let groups: Vec<&str> = digits
        .as_bytes()
        .rchunks(3)
        .rev()
        .filter_map(|chunk| std::str::from_utf8(chunk).ok())
        .collect();
    groups.join(",")
}

/// Render a horizontal bar for a fraction in [0, 1]
pub fn format_bar(fraction: f64, width: usize) -> String {
    let filled = (fraction.clamp(0.0, 1.0) * width as f64).round() as usize;
    let empty = width.saturating_sub(filled);
    format!("{}{}", "█".repeat(filled), "░".repeat(empty))
}
