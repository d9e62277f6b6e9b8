//! Two-phase training controller
//!
//! `Phase1Frozen → Phase2FineTune → Done`. The move to phase 2 is
//! unconditional. Each phase gets a fresh optimizer and a fresh early
//! stopper; the best checkpoint is tracked across both.
//!
//! The epoch policy (early stopping, checkpointing, weight restoration) is
//! written against [`EpochRunner`], so it can be driven by the Burn runner
//! below or by a scripted runner in tests.

use std::path::PathBuf;

use burn::{
    data::dataloader::batcher::Batcher,
    module::AutodiffModule,
    optim::{adaptor::OptimizerAdaptor, Adam, AdamConfig, GradientsParams, Optimizer},
    tensor::{
        backend::{AutodiffBackend, Backend},
        ElementConversion, Int, Tensor,
    },
};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::{debug, info};

use crate::dataset::{Augmenter, ClassWeights, ClassificationBatch, ClassificationBatcher, EpochLoader, ImageDataset};
use crate::model::{TrainabilityPlan, TransferClassifier};
use crate::training::callbacks::{BestCheckpoint, EarlyStopping, StopDecision};
use crate::training::checkpoint::{save_best, CheckpointMetadata};
use crate::training::history::{EpochMetrics, TrainingHistory};
use crate::training::loss::WeightedCrossEntropy;
use crate::training::{Phase, PhaseConfig, TrainingConfig};
use crate::utils::error::{Result, TransferError};
use crate::utils::logging::TrainingLogger;
use crate::utils::metrics::RunningAverage;

/// Everything the phase policy needs from a trainable model
pub trait EpochRunner {
    /// In-memory copy of the weights
    type Snapshot;

    /// Ordered backbone layer names, input first
    fn layer_names(&self) -> Vec<String>;

    /// Apply the trainability plan and build a fresh optimizer
    fn begin_phase(&mut self, phase: Phase, learning_rate: f64, plan: &TrainabilityPlan) -> Result<()>;

    /// One training pass followed by one validation pass
    fn run_epoch(&mut self, phase: Phase, epoch: usize) -> Result<EpochMetrics>;

    fn snapshot(&self) -> Self::Snapshot;

    fn restore(&mut self, snapshot: Self::Snapshot);

    /// Persist the current weights as the best model
    fn save_checkpoint(&mut self, metadata: &CheckpointMetadata) -> Result<()>;
}

/// Controller states
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControllerState {
    Phase1Frozen,
    Phase2FineTune,
    Done,
}

impl ControllerState {
    pub fn next(self) -> Self {
        match self {
            ControllerState::Phase1Frozen => ControllerState::Phase2FineTune,
            ControllerState::Phase2FineTune | ControllerState::Done => ControllerState::Done,
        }
    }
}

/// Result of one phase
#[derive(Debug, Clone)]
pub struct PhaseOutcome {
    pub phase: Phase,
    pub history: TrainingHistory,
    /// Best epoch of this phase by validation loss
    pub best_epoch: Option<usize>,
    pub best_val_loss: f64,
    pub stopped_early: bool,
    /// Epoch whose weights were restored after stopping
    pub restored_epoch: Option<usize>,
}

#[derive(Debug, Clone)]
pub struct TrainingSummary {
    pub phases: Vec<PhaseOutcome>,
    /// Lowest validation loss over the whole run
    pub best_val_loss: f64,
    pub checkpoints_saved: usize,
}

pub struct TrainingController {
    config: TrainingConfig,
    checkpoint: BestCheckpoint,
    state: ControllerState,
}

impl TrainingController {
    pub fn new(config: TrainingConfig) -> Self {
        Self {
            config,
            checkpoint: BestCheckpoint::new(),
            state: ControllerState::Phase1Frozen,
        }
    }

    pub fn state(&self) -> ControllerState {
        self.state
    }

    /// Run both phases to completion
    pub fn run<R: EpochRunner>(&mut self, runner: &mut R) -> Result<TrainingSummary> {
        let mut phases = Vec::with_capacity(2);

        loop {
            let outcome = match self.state {
                ControllerState::Phase1Frozen => {
                    let plan = TrainabilityPlan::frozen(runner.layer_names());
                    self.run_phase(runner, Phase::FrozenBackbone, &plan)?
                }
                ControllerState::Phase2FineTune => {
                    let mut plan = TrainabilityPlan::trainable(runner.layer_names());
                    plan.freeze_all_but_last(self.config.unfreeze_last);
                    info!("Fine-tuning plan: {}", plan.summary());
                    self.run_phase(runner, Phase::FineTune, &plan)?
                }
                ControllerState::Done => break,
            };
            phases.push(outcome);
            self.state = self.state.next();
        }

        Ok(TrainingSummary {
            phases,
            best_val_loss: self.checkpoint.best(),
            checkpoints_saved: self.checkpoint.saves(),
        })
    }

    fn run_phase<R: EpochRunner>(
        &mut self,
        runner: &mut R,
        phase: Phase,
        plan: &TrainabilityPlan,
    ) -> Result<PhaseOutcome> {
        let phase_config: PhaseConfig = self.config.phase(phase).clone();
        run_phase(
            runner,
            phase,
            &phase_config,
            plan,
            EarlyStopping::new(self.config.early_stopping.clone()),
            &mut self.checkpoint,
        )
    }
}

/// Epoch loop of a single phase.
///
/// Every strictly better validation loss (across phases) is checkpointed.
/// After `patience` epochs without improvement in this phase the loop stops.
/// Whether it stopped or ran out of epochs, the best weights of this phase
/// are restored when `restore_best_weights` is set.
pub fn run_phase<R: EpochRunner>(
    runner: &mut R,
    phase: Phase,
    config: &PhaseConfig,
    plan: &TrainabilityPlan,
    mut stopper: EarlyStopping,
    checkpoint: &mut BestCheckpoint,
) -> Result<PhaseOutcome> {
    stopper.reset();
    runner.begin_phase(phase, config.learning_rate, plan)?;

    let mut logger = TrainingLogger::new(phase.title(), config.epochs);
    logger.start_phase(config.learning_rate, plan.num_trainable(), plan.len());

    let mut history = TrainingHistory::new(phase.name());
    let mut best_weights: Option<R::Snapshot> = None;
    let mut stopped_early = false;
    let mut restored_epoch = None;

    for epoch in 1..=config.epochs {
        logger.start_epoch(epoch);
        let metrics = runner.run_epoch(phase, epoch)?;
        logger.end_epoch(&metrics);
        history.push(metrics);

        if let Some(previous) = checkpoint.improve(metrics.val_loss) {
            logger.log_new_best(previous, metrics.val_loss);
            runner.save_checkpoint(&CheckpointMetadata::new(phase, &metrics))?;
        }

        match stopper.update(epoch, metrics.val_loss) {
            StopDecision::Improved => {
                if stopper.restore_best_weights() {
                    best_weights = Some(runner.snapshot());
                }
            }
            StopDecision::Continue { wait } => {
                logger.log_no_improvement(stopper.best(), wait, stopper.patience());
            }
            StopDecision::Stop => {
                stopped_early = true;
                logger.log_early_stop(stopper.patience(), stopper.best_epoch().unwrap_or(0));
                if let Some(weights) = best_weights.take() {
                    runner.restore(weights);
                    restored_epoch = stopper.best_epoch();
                }
                break;
            }
        }
    }

    // Epoch budget exhausted without a stop: still end on the best weights
    if !stopped_early {
        if let Some(weights) = best_weights.take() {
            runner.restore(weights);
            restored_epoch = stopper.best_epoch();
            debug!("{}: restored weights of epoch {:?}", phase, restored_epoch);
        }
    }

    logger.log_complete(history.len(), stopper.best());

    Ok(PhaseOutcome {
        phase,
        best_epoch: stopper.best_epoch(),
        best_val_loss: stopper.best(),
        history,
        stopped_early,
        restored_epoch,
    })
}

type AdamOptimizer<B> = OptimizerAdaptor<Adam, TransferClassifier<B>, B>;

/// Epoch runner backed by a Burn autodiff model
pub struct BurnEpochRunner<'a, B: AutodiffBackend> {
    model: TransferClassifier<B>,
    optimizer: Option<AdamOptimizer<B>>,
    plan: Option<TrainabilityPlan>,
    learning_rate: f64,
    layer_names: Vec<String>,
    train: &'a ImageDataset,
    validation: &'a ImageDataset,
    augmenter: Augmenter,
    loss_fn: WeightedCrossEntropy<B>,
    batcher: ClassificationBatcher,
    config: TrainingConfig,
    seed: u64,
    /// Epochs run over all phases; keys the augmentation stream
    global_epoch: usize,
    checkpoint_dir: PathBuf,
    device: B::Device,
}

impl<'a, B: AutodiffBackend> BurnEpochRunner<'a, B> {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        model: TransferClassifier<B>,
        layer_names: Vec<String>,
        train: &'a ImageDataset,
        validation: &'a ImageDataset,
        augmenter: Augmenter,
        class_weights: Option<&ClassWeights>,
        config: TrainingConfig,
        seed: u64,
        checkpoint_dir: PathBuf,
        device: B::Device,
    ) -> Self {
        let loss_fn = match class_weights {
            Some(weights) => WeightedCrossEntropy::new(weights, &device),
            None => WeightedCrossEntropy::unweighted(),
        };
        let batcher = ClassificationBatcher::new(train.image_size() as usize);

        Self {
            model,
            optimizer: None,
            plan: None,
            learning_rate: 0.0,
            layer_names,
            train,
            validation,
            augmenter,
            loss_fn,
            batcher,
            config,
            seed,
            global_epoch: 0,
            checkpoint_dir,
            device,
        }
    }

    pub fn model(&self) -> &TransferClassifier<B> {
        &self.model
    }

    pub fn into_model(self) -> TransferClassifier<B> {
        self.model
    }

    fn train_epoch(&mut self, phase: Phase, epoch: usize) -> Result<(f64, f64)> {
        let train = self.train;
        let loader = EpochLoader::training(
            train,
            self.config.batch_size,
            self.augmenter.clone(),
            self.seed,
            self.global_epoch,
        )
        .with_prefetch(self.config.prefetch);
        let num_batches = loader.num_batches();

        let optimizer = self
            .optimizer
            .as_mut()
            .ok_or_else(|| TransferError::Training("run_epoch called before begin_phase".to_string()))?;
        let plan = self
            .plan
            .as_ref()
            .ok_or_else(|| TransferError::Training("no trainability plan set".to_string()))?;
        let model = &mut self.model;
        let loss_fn = &self.loss_fn;
        let batcher = &self.batcher;
        let device = &self.device;
        let learning_rate = self.learning_rate;

        let pb = ProgressBar::new(num_batches as u64);
        pb.set_style(
            ProgressStyle::with_template("  {spinner:.green} [{bar:40.cyan/blue}] {pos}/{len} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("#>-"),
        );

        let mut loss_avg = RunningAverage::new();
        let mut correct = 0usize;

        let result = loader.for_each_batch(|batch_idx, items| {
            let batch: ClassificationBatch<B> = batcher.batch(items, device);
            model.check_input(batch.images.dims())?;
            let batch_size = batch.targets.dims()[0];

            let logits = model.forward_train(batch.images, plan)?;
            let loss = loss_fn.forward(logits.clone(), batch.targets.clone());

            let loss_value: f64 = loss.clone().into_scalar().elem();
            if !loss_value.is_finite() {
                return Err(TransferError::Divergence {
                    phase: phase.title().to_string(),
                    epoch,
                    batch: batch_idx + 1,
                    value: loss_value,
                });
            }
            loss_avg.update(loss_value, batch_size);
            correct += count_correct(logits, batch.targets);

            let grads = GradientsParams::from_grads(loss.backward(), &*model);
            *model = optimizer.step(learning_rate, model.clone(), grads);

            pb.set_message(format!("loss {:.4}", loss_avg.average()));
            pb.inc(1);
            Ok(())
        });
        pb.finish_and_clear();
        result?;

        let total = loss_avg.count().max(1);
        Ok((loss_avg.average(), correct as f64 / total as f64))
    }

    /// Unweighted loss and accuracy in inference mode
    fn validate(&self) -> Result<(f64, f64)> {
        let model = self.model.valid();
        let loss_fn = WeightedCrossEntropy::<B::InnerBackend>::unweighted();
        let mut loss_avg = RunningAverage::new();
        let mut correct = 0usize;

        EpochLoader::sequential(self.validation, self.config.batch_size)
            .with_prefetch(self.config.prefetch)
            .for_each_batch(|_, items| {
                let batch: ClassificationBatch<B> = self.batcher.batch(items, &self.device);
                model.check_input(batch.images.dims())?;
                let images = batch.images.inner();
                let targets = batch.targets.inner();
                let batch_size = targets.dims()[0];

                let logits = model.forward(images);
                let loss: f64 = loss_fn
                    .forward(logits.clone(), targets.clone())
                    .into_scalar()
                    .elem();
                loss_avg.update(loss, batch_size);
                correct += count_correct(logits, targets);
                Ok(())
            })?;

        let total = loss_avg.count().max(1);
        Ok((loss_avg.average(), correct as f64 / total as f64))
    }
}

impl<B: AutodiffBackend> EpochRunner for BurnEpochRunner<'_, B> {
    type Snapshot = TransferClassifier<B>;

    fn layer_names(&self) -> Vec<String> {
        self.layer_names.clone()
    }

    fn begin_phase(&mut self, phase: Phase, learning_rate: f64, plan: &TrainabilityPlan) -> Result<()> {
        plan.trainable_from()?;
        self.plan = Some(plan.clone());
        self.learning_rate = learning_rate;
        self.optimizer = Some(
            AdamConfig::new()
                .with_epsilon(self.config.adam_epsilon as f32)
                .init(),
        );
        debug!("{}: fresh Adam optimizer at lr={:e}", phase, learning_rate);
        Ok(())
    }

    fn run_epoch(&mut self, phase: Phase, epoch: usize) -> Result<EpochMetrics> {
        let (loss, accuracy) = self.train_epoch(phase, epoch)?;
        let (val_loss, val_accuracy) = self.validate()?;
        self.global_epoch += 1;

        if !val_loss.is_finite() {
            return Err(TransferError::Divergence {
                phase: phase.title().to_string(),
                epoch,
                batch: 0,
                value: val_loss,
            });
        }

        Ok(EpochMetrics {
            epoch,
            loss,
            accuracy,
            val_loss,
            val_accuracy,
        })
    }

    fn snapshot(&self) -> Self::Snapshot {
        self.model.clone()
    }

    fn restore(&mut self, snapshot: Self::Snapshot) {
        self.model = snapshot;
    }

    fn save_checkpoint(&mut self, metadata: &CheckpointMetadata) -> Result<()> {
        save_best(&self.model, &self.checkpoint_dir, metadata)
    }
}

/// Number of rows whose argmax equals the target
pub fn count_correct<B: Backend>(logits: Tensor<B, 2>, targets: Tensor<B, 1, Int>) -> usize {
    let [batch, _] = logits.dims();
    let predictions = logits.argmax(1).reshape([batch]);
    let correct: i64 = predictions.equal(targets).int().sum().into_scalar().elem();
    correct as usize
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::training::EarlyStoppingConfig;

    /// Replays fixed validation losses; weights are the epoch that produced them
    struct ScriptedRunner {
        val_losses: Vec<f64>,
        cursor: usize,
        weights: (Phase, usize),
        saved: Vec<(Phase, usize)>,
        phases_started: Vec<(Phase, f64, usize)>,
    }

    impl ScriptedRunner {
        fn new(val_losses: Vec<f64>) -> Self {
            Self {
                val_losses,
                cursor: 0,
                weights: (Phase::FrozenBackbone, 0),
                saved: Vec::new(),
                phases_started: Vec::new(),
            }
        }
    }

    impl EpochRunner for ScriptedRunner {
        type Snapshot = (Phase, usize);

        fn layer_names(&self) -> Vec<String> {
            (0..50).map(|i| format!("layer{}", i)).collect()
        }

        fn begin_phase(&mut self, phase: Phase, learning_rate: f64, plan: &TrainabilityPlan) -> Result<()> {
            self.phases_started.push((phase, learning_rate, plan.num_trainable()));
            Ok(())
        }

        fn run_epoch(&mut self, phase: Phase, epoch: usize) -> Result<EpochMetrics> {
            let val_loss = self.val_losses.get(self.cursor).copied().unwrap_or(10.0);
            self.cursor += 1;
            self.weights = (phase, epoch);
            Ok(EpochMetrics {
                epoch,
                loss: val_loss,
                accuracy: 0.5,
                val_loss,
                val_accuracy: 0.5,
            })
        }

        fn snapshot(&self) -> Self::Snapshot {
            self.weights
        }

        fn restore(&mut self, snapshot: Self::Snapshot) {
            self.weights = snapshot;
        }

        fn save_checkpoint(&mut self, metadata: &CheckpointMetadata) -> Result<()> {
            self.saved.push((metadata.phase, metadata.epoch));
            Ok(())
        }
    }

    fn phase(epochs: usize) -> PhaseConfig {
        PhaseConfig {
            epochs,
            learning_rate: 1e-4,
        }
    }

    fn all_trainable() -> TrainabilityPlan {
        TrainabilityPlan::trainable(vec!["a".to_string()])
    }

    #[test]
    fn test_six_epoch_scenario_keeps_epoch_two() {
        let mut runner = ScriptedRunner::new(vec![1.0, 0.9, 0.95, 0.97, 0.99, 1.01]);
        let mut checkpoint = BestCheckpoint::new();

        let outcome = run_phase(
            &mut runner,
            Phase::FrozenBackbone,
            &phase(6),
            &all_trainable(),
            EarlyStopping::new(EarlyStoppingConfig::default()),
            &mut checkpoint,
        )
        .unwrap();

        assert_eq!(outcome.best_epoch, Some(2));
        assert_eq!(outcome.history.len(), 6);
        // only four non-improving epochs, patience 5 is not exhausted
        assert!(!outcome.stopped_early);
        assert_eq!(
            runner.saved,
            vec![(Phase::FrozenBackbone, 1), (Phase::FrozenBackbone, 2)]
        );
        assert_eq!(checkpoint.best(), 0.9);
        assert_eq!(outcome.restored_epoch, Some(2));
        assert_eq!(runner.weights, (Phase::FrozenBackbone, 2));
    }

    #[test]
    fn test_no_restore_when_disabled() {
        let mut runner = ScriptedRunner::new(vec![1.0, 0.9, 0.95]);
        let mut checkpoint = BestCheckpoint::new();
        let config = EarlyStoppingConfig {
            restore_best_weights: false,
            ..Default::default()
        };

        let outcome = run_phase(
            &mut runner,
            Phase::FrozenBackbone,
            &phase(3),
            &all_trainable(),
            EarlyStopping::new(config),
            &mut checkpoint,
        )
        .unwrap();

        assert_eq!(outcome.restored_epoch, None);
        assert_eq!(runner.weights, (Phase::FrozenBackbone, 3));
    }

    #[test]
    fn test_patience_exhausted_restores_best_weights() {
        let mut runner = ScriptedRunner::new(vec![1.0, 0.9, 0.95, 0.97, 0.99, 1.01, 1.02]);
        let mut checkpoint = BestCheckpoint::new();

        let outcome = run_phase(
            &mut runner,
            Phase::FrozenBackbone,
            &phase(10),
            &all_trainable(),
            EarlyStopping::new(EarlyStoppingConfig::default()),
            &mut checkpoint,
        )
        .unwrap();

        assert!(outcome.stopped_early);
        assert_eq!(outcome.history.len(), 7);
        assert_eq!(outcome.restored_epoch, Some(2));
        assert_eq!(runner.weights, (Phase::FrozenBackbone, 2));
    }

    #[test]
    fn test_checkpoint_best_persists_across_phases() {
        // phase 1 reaches 0.5; phase 2 improves its own early stopper but not the checkpoint
        let mut runner = ScriptedRunner::new(vec![0.8, 0.5, 0.7, 0.6, 0.4]);
        let config = TrainingConfig {
            phase1: phase(2),
            phase2: PhaseConfig {
                epochs: 3,
                learning_rate: 1e-5,
            },
            ..Default::default()
        };

        let mut controller = TrainingController::new(config);
        let summary = controller.run(&mut runner).unwrap();

        assert_eq!(controller.state(), ControllerState::Done);
        assert_eq!(summary.phases.len(), 2);
        assert_eq!(summary.phases[1].best_epoch, Some(3));
        assert_eq!(
            runner.saved,
            vec![
                (Phase::FrozenBackbone, 1),
                (Phase::FrozenBackbone, 2),
                (Phase::FineTune, 3)
            ]
        );
        assert_eq!(summary.best_val_loss, 0.4);
    }

    #[test]
    fn test_phase_two_unfreezes_last_layers_with_lower_rate() {
        let mut runner = ScriptedRunner::new(vec![1.0; 4]);
        let config = TrainingConfig {
            phase1: phase(1),
            phase2: PhaseConfig {
                epochs: 1,
                learning_rate: 1e-5,
            },
            ..Default::default()
        };

        TrainingController::new(config).run(&mut runner).unwrap();

        assert_eq!(
            runner.phases_started,
            vec![(Phase::FrozenBackbone, 1e-4, 0), (Phase::FineTune, 1e-5, 40)]
        );
    }

    #[test]
    fn test_state_transitions() {
        assert_eq!(ControllerState::Phase1Frozen.next(), ControllerState::Phase2FineTune);
        assert_eq!(ControllerState::Phase2FineTune.next(), ControllerState::Done);
        assert_eq!(ControllerState::Done.next(), ControllerState::Done);
    }
}
