//! Transfer Classifier CLI
//!
//! Entry point for training, evaluating and running a two-phase
//! transfer-learning image classifier built on the Burn framework.

use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::Result;
use clap::{Parser, Subcommand};
use colored::Colorize;
use tracing::info;

use transfer_classifier::backend::{backend_name, default_device, DefaultBackend, TrainingBackend};
use transfer_classifier::config::{BackboneVariant, PipelineConfig};
use transfer_classifier::dataset::AugmentationConfig;
use transfer_classifier::inference::{Predictor, DEFAULT_TOP_K};
use transfer_classifier::pipeline::{prepare_data, run_evaluation, run_training, RUN_CONFIG_FILE};
use transfer_classifier::utils::logging::{init_logging, LogConfig, LogLevel};
use transfer_classifier::utils::{format_duration, format_number};

/// Two-phase transfer-learning image classification
///
/// Trains a classification head on a frozen pretrained backbone, then
/// fine-tunes the last backbone layers at a lower learning rate.
#[derive(Parser, Debug)]
#[command(name = "transfer_classifier")]
#[command(version)]
#[command(about = "Transfer-learning image classification with Burn", long_about = None)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, default_value = "false")]
    verbose: bool,

    /// Only log errors
    #[arg(short, long, default_value = "false", conflicts_with = "verbose")]
    quiet: bool,

    /// Log level (trace, debug, info, warn, error); overrides --verbose/--quiet
    #[arg(long)]
    log_level: Option<String>,

    /// Subcommand to execute
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Train the classifier (frozen backbone, then fine-tuning)
    Train {
        /// TOML configuration file; flags below override it
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Dataset root with one subdirectory per class
        #[arg(short, long)]
        data_dir: Option<PathBuf>,

        /// Output directory for checkpoints, histories and reports
        #[arg(short, long)]
        output_dir: Option<PathBuf>,

        /// Epochs of phase 1 (frozen backbone)
        #[arg(long)]
        epochs1: Option<usize>,

        /// Epochs of phase 2 (fine-tuning)
        #[arg(long)]
        epochs2: Option<usize>,

        /// Phase 1 learning rate; phase 2 uses a tenth of it
        #[arg(short, long)]
        learning_rate: Option<f64>,

        /// Batch size for training
        #[arg(short, long)]
        batch_size: Option<usize>,

        /// Random seed for the split, shuffling and augmentation
        #[arg(long)]
        seed: Option<u64>,

        /// Backbone topology (efficientnet_v2_b2, tiny)
        #[arg(long)]
        backbone: Option<String>,

        /// Burn record with pretrained backbone weights
        #[arg(long)]
        pretrained: Option<PathBuf>,

        /// Backbone layers unfrozen in phase 2
        #[arg(long)]
        unfreeze_last: Option<usize>,

        /// Early stopping patience in epochs
        #[arg(long)]
        patience: Option<usize>,

        /// Disable data augmentation
        #[arg(long, default_value = "false")]
        no_augmentation: bool,

        /// Train with an unweighted loss
        #[arg(long, default_value = "false")]
        no_class_weights: bool,
    },

    /// Show class distribution and class weights of a dataset
    Stats {
        /// Dataset root with one subdirectory per class
        #[arg(short, long, default_value = "data")]
        data_dir: PathBuf,

        /// Fraction of images held out for validation
        #[arg(long, default_value = "0.2")]
        validation_split: f64,

        /// Random seed for the split
        #[arg(long, default_value = "42")]
        seed: u64,
    },

    /// Evaluate the best checkpoint of a run on its validation subset
    Evaluate {
        /// Run directory written by `train`
        #[arg(short, long, default_value = "output")]
        run_dir: PathBuf,
    },

    /// Predict the class of an image or of every image in a directory
    Predict {
        /// Path to input image or directory
        #[arg(short, long)]
        input: PathBuf,

        /// Run directory written by `train`
        #[arg(short, long, default_value = "output")]
        run_dir: PathBuf,

        /// Number of ranked classes to show
        #[arg(short = 'k', long, default_value_t = DEFAULT_TOP_K)]
        top_k: usize,

        /// Batch size for directory inference
        #[arg(short, long, default_value = "32")]
        batch_size: usize,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut log_config = if cli.verbose {
        LogConfig::verbose()
    } else if cli.quiet {
        LogConfig::quiet()
    } else {
        LogConfig::default()
    };
    if let Some(level) = &cli.log_level {
        log_config.level = LogLevel::parse(level);
    }

    if let Err(e) = init_logging(&log_config) {
        eprintln!("{} {}", "Warning:".yellow(), e);
    }
    tracing::debug!("Log level: {}", log_config.level);

    print_banner();

    match cli.command {
        Commands::Train {
            config,
            data_dir,
            output_dir,
            epochs1,
            epochs2,
            learning_rate,
            batch_size,
            seed,
            backbone,
            pretrained,
            unfreeze_last,
            patience,
            no_augmentation,
            no_class_weights,
        } => {
            let mut pipeline = match config {
                Some(path) => PipelineConfig::load(&path)?,
                None => PipelineConfig::default(),
            };

            if let Some(dir) = data_dir {
                pipeline.data.data_dir = dir;
            }
            if let Some(dir) = output_dir {
                pipeline.output.output_dir = dir;
            }
            if let Some(epochs) = epochs1 {
                pipeline.training.phase1.epochs = epochs;
            }
            if let Some(epochs) = epochs2 {
                pipeline.training.phase2.epochs = epochs;
            }
            if let Some(lr) = learning_rate {
                pipeline.training.phase1.learning_rate = lr;
                pipeline.training.phase2.learning_rate = lr / 10.0;
            }
            if let Some(size) = batch_size {
                pipeline.training.batch_size = size;
            }
            if let Some(seed) = seed {
                pipeline.seed = seed;
            }
            if let Some(name) = backbone {
                pipeline.model.backbone = BackboneVariant::parse(&name)?;
            }
            if pretrained.is_some() {
                pipeline.model.pretrained_weights = pretrained;
            }
            if let Some(n) = unfreeze_last {
                pipeline.training.unfreeze_last = n;
            }
            if let Some(p) = patience {
                pipeline.training.early_stopping.patience = p;
            }
            if no_augmentation {
                pipeline.augmentation = AugmentationConfig::none();
            }
            if no_class_weights {
                pipeline.training.use_class_weights = false;
            }

            cmd_train(&pipeline)?;
        }

        Commands::Stats {
            data_dir,
            validation_split,
            seed,
        } => {
            cmd_stats(&data_dir, validation_split, seed)?;
        }

        Commands::Evaluate { run_dir } => {
            cmd_evaluate(&run_dir)?;
        }

        Commands::Predict {
            input,
            run_dir,
            top_k,
            batch_size,
        } => {
            cmd_predict(&input, &run_dir, top_k, batch_size)?;
        }
    }

    Ok(())
}

fn print_banner() {
    println!(
        "{}",
        r#"
 ╔══════════════════════════════════════════════════════════════════╗
 ║   🌼 Transfer Classifier                                          ║
 ║   Two-phase transfer learning with Burn + Rust                    ║
 ╚══════════════════════════════════════════════════════════════════╝
  "#
        .green()
    );
}

fn cmd_train(config: &PipelineConfig) -> Result<()> {
    info!("Training on {:?}", config.data.data_dir);

    println!("{}", "Training Configuration:".cyan().bold());
    println!("  📁 Data:        {:?}", config.data.data_dir);
    println!("  💾 Output:      {:?}", config.output.output_dir);
    println!("  🧠 Backbone:    {:?}", config.model.backbone);
    println!(
        "  🔁 Epochs:      {} + {}",
        config.training.phase1.epochs, config.training.phase2.epochs
    );
    println!(
        "  📈 LR:          {} → {}",
        config.training.phase1.learning_rate, config.training.phase2.learning_rate
    );
    println!("  📦 Batch size:  {}", config.training.batch_size);
    println!("  🎲 Seed:        {}", config.seed);
    println!("  🖥️  Backend:     {}", backend_name());
    println!();

    let start = Instant::now();
    let run = run_training::<TrainingBackend>(config, default_device())?;

    println!();
    println!(
        "{} in {}",
        "Training Complete!".green().bold(),
        format_duration(start.elapsed().as_secs_f64())
    );
    for outcome in &run.summary.phases {
        let best_epoch = outcome
            .best_epoch
            .map(|e| e.to_string())
            .unwrap_or_else(|| "-".to_string());
        println!(
            "  {}: {} epochs, best val loss {:.4} (epoch {}){}",
            outcome.phase,
            outcome.history.len(),
            outcome.best_val_loss,
            best_epoch,
            if outcome.stopped_early { ", stopped early" } else { "" }
        );
    }
    println!("  ✅ Accuracy: {:.2}%", run.report.metrics.accuracy * 100.0);
    println!("  💾 Results saved to {:?}", run.output_dir);

    Ok(())
}

fn cmd_stats(data_dir: &Path, validation_split: f64, seed: u64) -> Result<()> {
    info!("Computing dataset statistics for: {:?}", data_dir);

    if !data_dir.exists() {
        println!("{} Dataset directory not found: {:?}", "Error:".red(), data_dir);
        return Ok(());
    }

    let mut config = PipelineConfig::default();
    config.data.data_dir = data_dir.to_path_buf();
    config.data.validation_split = validation_split;
    config.seed = seed;

    let data = prepare_data(&config)?;

    println!("{}", "Dataset Statistics:".cyan().bold());
    println!(
        "  📊 Total samples: {} ({} training / {} validation)",
        format_number(data.split.training.len() + data.split.validation.len()),
        format_number(data.split.training.len()),
        format_number(data.split.validation.len())
    );
    println!("  🏷️  Number of classes: {}", data.split.num_classes());
    println!();
    data.distribution.print();
    println!();
    data.class_weights.print(&data.split.classes);

    Ok(())
}

fn cmd_evaluate(run_dir: &Path) -> Result<()> {
    info!("Evaluating run {:?}", run_dir);

    let config = PipelineConfig::load(&run_dir.join(RUN_CONFIG_FILE))?;
    println!("{}", "Evaluation Configuration:".cyan().bold());
    println!("  📁 Run:     {:?}", run_dir);
    println!("  📁 Data:    {:?}", config.data.data_dir);
    println!("  🖥️  Backend: {}", backend_name());
    println!();

    let report = run_evaluation::<DefaultBackend>(&config, run_dir, default_device())?;
    report.print();
    report.save(run_dir)?;
    println!("  💾 Report saved to {:?}", run_dir);

    Ok(())
}

fn cmd_predict(input: &Path, run_dir: &Path, top_k: usize, batch_size: usize) -> Result<()> {
    info!("Running inference on {:?}", input);

    println!("{}", "Inference Configuration:".cyan().bold());
    println!("  📷 Input:   {:?}", input);
    println!("  🧠 Run:     {:?}", run_dir);
    println!("  🖥️  Backend: {}", backend_name());
    println!();

    if !input.exists() {
        println!("{} Input path not found: {:?}", "Error:".red(), input);
        return Ok(());
    }

    println!("{}", "Loading model...".cyan());
    let predictor = Predictor::<DefaultBackend>::load(run_dir, default_device())?;

    let results = if input.is_dir() {
        predictor.predict_dir(input, top_k, batch_size)?
    } else {
        vec![predictor.predict_image(input, top_k)?]
    };

    println!();
    println!("{}", "Predictions:".green().bold());
    for result in &results {
        print!("{}", result.display());
    }

    Ok(())
}
