//! Transfer-learning classifier
//!
//! Backbone features are max-pooled and fed through a small head:
//! batch norm, dense + ReLU, batch norm, dropout, dense. `forward` returns
//! logits; the loss applies log-softmax itself.

use std::path::Path;

use burn::{
    module::Module,
    nn::{BatchNorm, BatchNormConfig, Dropout, DropoutConfig, Linear, LinearConfig, Relu},
    tensor::{
        activation::softmax,
        backend::{AutodiffBackend, Backend},
        Tensor,
    },
};

use crate::model::backbone::Backbone;
use crate::model::config::ClassifierConfig;
use crate::model::trainability::TrainabilityPlan;
use crate::utils::error::{Result, TransferError};

/// ImageNet channel means for inputs scaled to [0, 1]
pub const IMAGENET_MEAN: [f32; 3] = [0.485, 0.456, 0.406];
/// ImageNet channel standard deviations
pub const IMAGENET_STD: [f32; 3] = [0.229, 0.224, 0.225];

#[derive(Module, Debug)]
pub struct TransferClassifier<B: Backend> {
    pub backbone: Backbone<B>,
    pub bn_features: BatchNorm<B, 1>,
    pub dense: Linear<B>,
    pub relu: Relu,
    pub bn_dense: BatchNorm<B, 1>,
    pub dropout: Dropout,
    pub output: Linear<B>,

    num_classes: usize,
    input_size: usize,
}

impl<B: Backend> TransferClassifier<B> {
    pub fn new(config: &ClassifierConfig, device: &B::Device) -> Self {
        let backbone = Backbone::new(&config.backbone, device);
        let features = backbone.out_channels();

        Self {
            backbone,
            bn_features: BatchNormConfig::new(features).init(device),
            dense: LinearConfig::new(features, config.dense_units).init(device),
            relu: Relu::new(),
            bn_dense: BatchNormConfig::new(config.dense_units).init(device),
            dropout: DropoutConfig::new(config.dropout).init(),
            output: LinearConfig::new(config.dense_units, config.num_classes).init(device),
            num_classes: config.num_classes,
            input_size: config.input_size,
        }
    }

    /// Build the model and load backbone weights if a file is given.
    ///
    /// Without weights the backbone keeps its random initialization.
    pub fn with_backbone_weights(
        config: &ClassifierConfig,
        weights: Option<&Path>,
        device: &B::Device,
    ) -> Result<Self> {
        let mut model = Self::new(config, device);
        match weights {
            Some(path) => {
                model.backbone = model.backbone.load_pretrained(path, device)?;
                tracing::info!("Loaded pretrained backbone weights from {:?}", path);
            }
            None => {
                tracing::warn!("No pretrained backbone weights configured, using random initialization");
            }
        }
        Ok(model)
    }

    /// Check a [batch, 3, H, W] input against the configured size
    pub fn check_input(&self, dims: [usize; 4]) -> Result<()> {
        let expected = [dims[0], 3, self.input_size, self.input_size];
        if dims != expected {
            return Err(TransferError::ShapeMismatch {
                context: "model input".to_string(),
                expected: format!("{:?}", expected),
                actual: format!("{:?}", dims),
            });
        }
        Ok(())
    }

    /// Logits of shape [batch, num_classes]; images in [0, 1]
    pub fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 2> {
        let x = self.preprocess(x);
        let features = self.backbone.forward(x);
        self.head(features)
    }

    /// Class probabilities
    pub fn forward_softmax(&self, x: Tensor<B, 4>) -> Tensor<B, 2> {
        softmax(self.forward(x), 1)
    }

    pub fn num_classes(&self) -> usize {
        self.num_classes
    }

    pub fn input_size(&self) -> usize {
        self.input_size
    }

    fn preprocess(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        let device = x.device();
        let mean = Tensor::<B, 1>::from_floats(IMAGENET_MEAN, &device).reshape([1, 3, 1, 1]);
        let std = Tensor::<B, 1>::from_floats(IMAGENET_STD, &device).reshape([1, 3, 1, 1]);
        (x - mean) / std
    }

    fn head(&self, features: Tensor<B, 4>) -> Tensor<B, 2> {
        // Global max pool: [B, C, H, W] -> [B, C]
        let [batch, channels, _, _] = features.dims();
        let x = features.max_dim(3).max_dim(2).reshape([batch, channels, 1]);

        let x = self.bn_features.forward(x).reshape([batch, channels]);
        let x = self.relu.forward(self.dense.forward(x));

        let units = x.dims()[1];
        let x = self.bn_dense.forward(x.reshape([batch, units, 1])).reshape([batch, units]);
        let x = self.dropout.forward(x);
        self.output.forward(x)
    }
}

impl<B: AutodiffBackend> TransferClassifier<B> {
    /// Training forward pass honoring the backbone trainability plan
    pub fn forward_train(&self, x: Tensor<B, 4>, plan: &TrainabilityPlan) -> Result<Tensor<B, 2>> {
        if plan.len() != self.backbone.num_layers() {
            return Err(TransferError::Model(format!(
                "trainability plan covers {} layers but the backbone has {}",
                plan.len(),
                self.backbone.num_layers()
            )));
        }
        let trainable_from = plan.trainable_from()?;

        let x = self.preprocess(x);
        let features = self.backbone.forward_partially_frozen(x, trainable_from);
        Ok(self.head(features))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::config::BackboneConfig;
    use burn::backend::Autodiff;
    use burn_ndarray::NdArray;
    use burn::module::AutodiffModule;

    type TestBackend = NdArray<f32>;
    type TestAutodiff = Autodiff<TestBackend>;

    fn tiny_config() -> ClassifierConfig {
        ClassifierConfig::new(4, BackboneConfig::tiny())
            .with_input_size(32)
            .with_dense_units(16)
    }

    #[test]
    fn test_output_shape() {
        let device = Default::default();
        let model = TransferClassifier::<TestBackend>::new(&tiny_config(), &device);
        let input = Tensor::<TestBackend, 4>::zeros([2, 3, 32, 32], &device);

        assert_eq!(model.forward(input).dims(), [2, 4]);
    }

    #[test]
    fn test_softmax_rows_sum_to_one() {
        let device = Default::default();
        let model = TransferClassifier::<TestBackend>::new(&tiny_config(), &device);
        let input = Tensor::<TestBackend, 4>::ones([3, 3, 32, 32], &device) * 0.5;

        let probs: Vec<f32> = model.forward_softmax(input).into_data().to_vec().unwrap();
        for row in probs.chunks(4) {
            let sum: f32 = row.iter().sum();
            assert!((sum - 1.0).abs() < 1e-4);
        }
    }

    #[test]
    fn test_check_input_rejects_wrong_size() {
        let device = Default::default();
        let model = TransferClassifier::<TestBackend>::new(&tiny_config(), &device);

        assert!(model.check_input([2, 3, 32, 32]).is_ok());
        match model.check_input([2, 3, 64, 64]) {
            Err(TransferError::ShapeMismatch { .. }) => {}
            other => panic!("expected shape mismatch, got {:?}", other),
        }
    }

    #[test]
    fn test_frozen_backbone_gets_no_gradients() {
        let device = Default::default();
        let config = tiny_config();
        let model = TransferClassifier::<TestAutodiff>::new(&config, &device);
        let plan = TrainabilityPlan::frozen(config.backbone.layer_names());

        let input = Tensor::<TestAutodiff, 4>::ones([2, 3, 32, 32], &device);
        let loss = model.forward_train(input, &plan).unwrap().sum();
        let grads = loss.backward();

        let stem = model.backbone.blocks[0].units[0].conv.weight.val();
        assert!(stem.grad(&grads).is_none());
        assert!(model.output.weight.val().grad(&grads).is_some());

        // the inference copy is still usable
        let _ = model.valid();
    }

    #[test]
    fn test_missing_weights_file_is_model_error() {
        let device = Default::default();
        let result = TransferClassifier::<TestBackend>::with_backbone_weights(
            &tiny_config(),
            Some(Path::new("/nonexistent/backbone")),
            &device,
        );
        assert!(matches!(result, Err(TransferError::Model(_))));
    }
}
