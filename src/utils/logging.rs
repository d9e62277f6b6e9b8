//! Logging Module
//!
//! Structured logging with the `tracing` crate plus a small training logger
//! that reports phase and epoch progress in a consistent format.

use std::time::Instant;

use tracing::Level;
use tracing_subscriber::FmtSubscriber;

use crate::training::history::EpochMetrics;

/// Logging configuration
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Minimum log level to display
    pub level: LogLevel,
    /// Whether to include target (module path)
    pub include_target: bool,
    /// Whether to include thread IDs
    pub include_thread_ids: bool,
    /// Whether to use ANSI colors
    pub ansi_colors: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: LogLevel::Info,
            include_target: false,
            include_thread_ids: false,
            ansi_colors: true,
        }
    }
}

impl LogConfig {
    /// Verbose logging config for debugging
    pub fn verbose() -> Self {
        Self {
            level: LogLevel::Debug,
            include_target: true,
            include_thread_ids: true,
            ansi_colors: true,
        }
    }

    /// Quiet logging config (errors only)
    pub fn quiet() -> Self {
        Self {
            level: LogLevel::Error,
            include_target: false,
            include_thread_ids: false,
            ansi_colors: true,
        }
    }
}

/// Log level enum
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl LogLevel {
    /// Convert to tracing Level
    pub fn to_tracing_level(&self) -> Level {
        match self {
            LogLevel::Trace => Level::TRACE,
            LogLevel::Debug => Level::DEBUG,
            LogLevel::Info => Level::INFO,
            LogLevel::Warn => Level::WARN,
            LogLevel::Error => Level::ERROR,
        }
    }

    /// Parse a level name, falling back to `Info`
    pub fn parse(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "trace" => LogLevel::Trace,
            "debug" => LogLevel::Debug,
            "info" => LogLevel::Info,
            "warn" | "warning" => LogLevel::Warn,
            "error" => LogLevel::Error,
            _ => LogLevel::Info,
        }
    }
}

impl std::fmt::Display for LogLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LogLevel::Trace => write!(f, "TRACE"),
            LogLevel::Debug => write!(f, "DEBUG"),
            LogLevel::Info => write!(f, "INFO"),
            LogLevel::Warn => write!(f, "WARN"),
            LogLevel::Error => write!(f, "ERROR"),
        }
    }
}

/// Initialize the global subscriber
pub fn init_logging(config: &LogConfig) -> Result<(), String> {
    let subscriber = FmtSubscriber::builder()
        .with_max_level(config.level.to_tracing_level())
        .with_ansi(config.ansi_colors)
        .with_target(config.include_target)
        .with_thread_ids(config.include_thread_ids)
        .compact()
        .finish();

    tracing::subscriber::set_global_default(subscriber)
        .map_err(|e| format!("Failed to initialize logging: {}", e))?;

    Ok(())
}

/// Phase-aware training progress logger
pub struct TrainingLogger {
    phase: String,
    epoch: usize,
    max_epochs: usize,
    epoch_start: Instant,
    phase_start: Instant,
}

impl TrainingLogger {
    /// Create a logger for one training phase
    pub fn new(phase: &str, max_epochs: usize) -> Self {
        Self {
            phase: phase.to_string(),
            epoch: 0,
            max_epochs,
            epoch_start: Instant::now(),
            phase_start: Instant::now(),
        }
    }

    pub fn start_phase(&mut self, learning_rate: f64, trainable_layers: usize, total_layers: usize) {
        self.phase_start = Instant::now();
        tracing::info!(
            "{} started: lr={:e}, {}/{} backbone layers trainable, up to {} epochs",
            self.phase,
            learning_rate,
            trainable_layers,
            total_layers,
            self.max_epochs
        );
    }

    /// Log start of an epoch (1-based)
    pub fn start_epoch(&mut self, epoch: usize) {
        self.epoch = epoch;
        self.epoch_start = Instant::now();
        tracing::debug!("{} epoch {}/{} started", self.phase, epoch, self.max_epochs);
    }

    /// Log end of an epoch with its metrics
    pub fn end_epoch(&self, metrics: &EpochMetrics) {
        tracing::info!(
            "{} epoch {}/{} in {:.1}s | loss {:.4} | acc {:.2}% | val_loss {:.4} | val_acc {:.2}%",
            self.phase,
            self.epoch,
            self.max_epochs,
            self.epoch_start.elapsed().as_secs_f64(),
            metrics.loss,
            metrics.accuracy * 100.0,
            metrics.val_loss,
            metrics.val_accuracy * 100.0
        );
    }

    /// Log a checkpointed improvement
    pub fn log_new_best(&self, previous: f64, current: f64) {
        tracing::info!(
            "val_loss improved from {:.5} to {:.5}, saving best model",
            previous,
            current
        );
    }

    pub fn log_no_improvement(&self, best: f64, wait: usize, patience: usize) {
        tracing::info!(
            "val_loss did not improve from {:.5} ({}/{})",
            best,
            wait,
            patience
        );
    }

    /// Log early stopping and weight restoration
    pub fn log_early_stop(&self, patience: usize, best_epoch: usize) {
        tracing::warn!(
            "{}: early stopping after {} epochs without improvement, restoring weights from epoch {}",
            self.phase,
            patience,
            best_epoch
        );
    }

    /// Log phase completion
    pub fn log_complete(&self, epochs_run: usize, best_val_loss: f64) {
        tracing::info!(
            "{} complete: {} epochs in {:.1}s | best val_loss {:.4}",
            self.phase,
            epochs_run,
            self.phase_start.elapsed().as_secs_f64(),
            best_val_loss
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_level_parse() {
        assert_eq!(LogLevel::parse("debug"), LogLevel::Debug);
        assert_eq!(LogLevel::parse("INFO"), LogLevel::Info);
        assert_eq!(LogLevel::parse("Warning"), LogLevel::Warn);
        assert_eq!(LogLevel::parse("unknown"), LogLevel::Info);
    }

    #[test]
    fn test_log_config_presets() {
        assert_eq!(LogConfig::default().level, LogLevel::Info);
        assert_eq!(LogConfig::verbose().level, LogLevel::Debug);
        assert_eq!(LogConfig::quiet().level, LogLevel::Error);
    }

    #[test]
    fn test_second_init_reports_error() {
        let config = LogConfig::quiet();
        let _ = init_logging(&config);
        let err = init_logging(&config).unwrap_err();
        assert!(err.contains("Failed to initialize logging"));
    }

    #[test]
    fn test_training_logger_tracks_epoch() {
        let mut logger = TrainingLogger::new("Phase 1", 10);
        logger.start_epoch(3);
        assert_eq!(logger.epoch, 3);
    }
}
