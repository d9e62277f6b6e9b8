//! End-to-end training pipeline
//!
//! load → analyse → augmentation → assemble → phase 1 → phase 2 → evaluate.
//! Each stage finishes before the next one starts; the first error aborts
//! the run.

use std::path::{Path, PathBuf};

use burn::{
    module::{AutodiffModule, Module},
    tensor::backend::{AutodiffBackend, Backend},
};
use colored::Colorize;
use tracing::info;

use crate::config::PipelineConfig;
use crate::dataset::augmentation::{item_rng, save_preview_grid};
use crate::dataset::{
    Augmenter, ClassCounts, ClassWeights, DistributionReport, ImageDataset, ImageFolder, ImageSample, SplitDataset,
};
use crate::evaluation::{evaluate, ClassificationReport};
use crate::model::TransferClassifier;
use crate::training::checkpoint::{load_best, save_model_config};
use crate::training::{BurnEpochRunner, TrainingController, TrainingSummary};
use crate::utils::error::{Result, TransferError};

pub const RUN_CONFIG_FILE: &str = "run_config.toml";
pub const PREVIEW_FILE: &str = "augmentation_preview.png";

/// Split dataset with its distribution and class weights
#[derive(Debug, Clone)]
pub struct PreparedData {
    pub split: SplitDataset,
    pub distribution: DistributionReport,
    /// Inverse-frequency weights of the training subset
    pub class_weights: ClassWeights,
}

/// Outputs of a finished training run
#[derive(Debug, Clone)]
pub struct TrainingRun {
    pub summary: TrainingSummary,
    pub report: ClassificationReport,
    pub output_dir: PathBuf,
}

/// Load the image folder, split it, and analyse the class distribution
pub fn prepare_data(config: &PipelineConfig) -> Result<PreparedData> {
    let folder = ImageFolder::open(&config.data.data_dir)?;
    let split = config.split().apply(&folder)?;

    let num_classes = split.num_classes();
    let training = ClassCounts::from_labels(&split.training_labels(), num_classes)?;
    let validation = ClassCounts::from_labels(&split.validation_labels(), num_classes)?;

    let class_weights = ClassWeights::inverse_frequency(&training, &split.classes)?;
    let distribution = DistributionReport::new(&split.classes, training, validation);

    Ok(PreparedData {
        split,
        distribution,
        class_weights,
    })
}

fn build_dataset(config: &PipelineConfig, samples: Vec<ImageSample>, name: &str) -> Result<ImageDataset> {
    if config.data.cache_images {
        ImageDataset::new_cached(samples, config.data.image_size, name)
    } else {
        Ok(ImageDataset::new(samples, config.data.image_size))
    }
}

/// Write a grid of augmented training samples
pub fn save_augmentation_preview(
    dataset: &ImageDataset,
    augmenter: &Augmenter,
    count: usize,
    seed: u64,
    path: &Path,
) -> Result<()> {
    let images = (0..count.min(dataset.len()))
        .map(|i| {
            let mut rng = item_rng(seed, 0, i);
            dataset.image(i).map(|img| augmenter.augment(&img, &mut rng))
        })
        .collect::<Result<Vec<_>>>()?;

    if images.is_empty() {
        return Ok(());
    }
    save_preview_grid(&images, 3, path)?;
    info!("Augmentation preview saved to {:?}", path);
    Ok(())
}

/// Run the full two-phase training pipeline on backend `B`
pub fn run_training<B: AutodiffBackend>(config: &PipelineConfig, device: B::Device) -> Result<TrainingRun> {
    config.validate()?;
    let output_dir = config.output.output_dir.clone();
    std::fs::create_dir_all(&output_dir)?;
    config.save(&output_dir.join(RUN_CONFIG_FILE))?;

    // Dataset and analysis
    println!("{}", "Loading Dataset...".cyan().bold());
    let data = prepare_data(config)?;
    let classes = data.split.classes.clone();
    classes.save_to_dir(&output_dir)?;
    println!(
        "  📊 {} classes, {} training / {} validation images",
        classes.len(),
        data.split.training.len(),
        data.split.validation.len()
    );
    println!();
    data.distribution.print();
    println!();
    data.class_weights.print(&classes);
    println!();
    if config.output.save_charts {
        data.distribution.save_charts(&output_dir)?;
    }

    let train_ds = build_dataset(config, data.split.training.clone(), "training")?;
    let val_ds = build_dataset(config, data.split.validation.clone(), "validation")?;

    let augmenter = Augmenter::new(config.augmentation.clone());
    if config.output.preview_samples > 0 && augmenter.is_enabled() {
        save_augmentation_preview(
            &train_ds,
            &augmenter,
            config.output.preview_samples,
            config.seed,
            &output_dir.join(PREVIEW_FILE),
        )?;
    }

    // Model assembly
    println!("{}", "Creating Model...".cyan().bold());
    let model_config = config.classifier_config(classes.len());
    model_config.validate()?;
    save_model_config(&model_config, &output_dir)?;
    let model = TransferClassifier::<B>::with_backbone_weights(
        &model_config,
        config.model.pretrained_weights.as_deref(),
        &device,
    )?;
    println!(
        "  🧠 Backbone: {:?} ({} layers), head {} → {} → {}",
        config.model.backbone,
        model.backbone.num_layers(),
        model.backbone.out_channels(),
        model_config.dense_units,
        classes.len()
    );
    println!();

    // Training
    println!("{}", "Starting Training...".green().bold());
    let class_weights = config.training.use_class_weights.then_some(&data.class_weights);
    let mut runner = BurnEpochRunner::new(
        model,
        model_config.backbone.layer_names(),
        &train_ds,
        &val_ds,
        augmenter,
        class_weights,
        config.training.clone(),
        config.seed,
        output_dir.clone(),
        device,
    );
    let mut controller = TrainingController::new(config.training.clone());
    let summary = controller.run(&mut runner)?;

    for outcome in &summary.phases {
        let stem = format!("history_{}", outcome.phase.name());
        if config.output.save_charts {
            outcome.history.save_all(&output_dir, &stem)?;
        } else {
            outcome.history.save_json(&output_dir.join(format!("{}.json", stem)))?;
            outcome.history.save_csv(&output_dir.join(format!("{}.csv", stem)))?;
        }
    }

    // Evaluation with the final weights
    println!();
    println!("{}", "Evaluating Model...".cyan().bold());
    let model = runner.into_model().valid();
    let inner_device = model
        .devices()
        .into_iter()
        .next()
        .ok_or_else(|| TransferError::Model("model has no parameters on any device".to_string()))?;
    let report = evaluate(&model, &val_ds, &classes, config.training.batch_size, &inner_device)?;
    report.print();
    report.save(&output_dir)?;

    Ok(TrainingRun {
        summary,
        report,
        output_dir,
    })
}

/// Rebuild the validation subset of a run and evaluate its best checkpoint
pub fn run_evaluation<B: Backend>(
    config: &PipelineConfig,
    run_dir: &Path,
    device: B::Device,
) -> Result<ClassificationReport> {
    let data = prepare_data(config)?;
    let (model, model_config) = load_best::<B>(run_dir, &device)?;
    if model_config.num_classes != data.split.num_classes() {
        return Err(TransferError::ShapeMismatch {
            context: "checkpoint classes".to_string(),
            expected: format!("{} classes", data.split.num_classes()),
            actual: format!("{} classes", model_config.num_classes),
        });
    }

    let val_ds = build_dataset(config, data.split.validation.clone(), "validation")?;
    evaluate(&model, &val_ds, &data.split.classes, config.training.batch_size, &device)
}
