//! EfficientNetV2-style convolutional backbone
//!
//! The backbone is a flat sequence of layer units (conv + batch norm + SiLU)
//! grouped into residual blocks. Units are the granularity at which layers
//! are frozen: a frozen unit runs through its inference-mode copy so it
//! neither receives gradients nor updates batch-norm statistics.

use std::path::Path;

use burn::{
    module::{AutodiffModule, Module},
    nn::{
        conv::{Conv2d, Conv2dConfig},
        BatchNorm, BatchNormConfig, PaddingConfig2d,
    },
    record::CompactRecorder,
    tensor::{
        activation::{sigmoid, silu},
        backend::{AutodiffBackend, Backend},
        Tensor,
    },
};

use crate::model::config::{BackboneConfig, BlockKind};
use crate::utils::error::{Result, TransferError};

/// Channel attention inside MBConv blocks
#[derive(Module, Debug)]
pub struct SqueezeExcite<B: Backend> {
    pub reduce: Conv2d<B>,
    pub expand: Conv2d<B>,
}

impl<B: Backend> SqueezeExcite<B> {
    pub fn new(channels: usize, squeezed: usize, device: &B::Device) -> Self {
        let squeezed = squeezed.max(1);
        Self {
            reduce: Conv2dConfig::new([channels, squeezed], [1, 1]).init(device),
            expand: Conv2dConfig::new([squeezed, channels], [1, 1]).init(device),
        }
    }

    pub fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        // [B, C, H, W] -> [B, C, 1, 1]
        let scale = x.clone().mean_dim(3).mean_dim(2);
        let scale = silu(self.reduce.forward(scale));
        let scale = sigmoid(self.expand.forward(scale));
        x * scale
    }
}

/// One freezable layer: conv, batch norm, optional SiLU, optional SE
#[derive(Module, Debug)]
pub struct ConvUnit<B: Backend> {
    pub conv: Conv2d<B>,
    pub bn: BatchNorm<B, 2>,
    pub se: Option<SqueezeExcite<B>>,
    activate: bool,
}

impl<B: Backend> ConvUnit<B> {
    #[allow(clippy::too_many_arguments)]
    fn new(
        in_channels: usize,
        out_channels: usize,
        kernel_size: usize,
        stride: usize,
        groups: usize,
        activate: bool,
        se: Option<SqueezeExcite<B>>,
        device: &B::Device,
    ) -> Self {
        let padding = kernel_size / 2;
        let conv = Conv2dConfig::new([in_channels, out_channels], [kernel_size, kernel_size])
            .with_stride([stride, stride])
            .with_padding(PaddingConfig2d::Explicit(padding, padding))
            .with_groups(groups)
            .with_bias(false)
            .init(device);

        Self {
            conv,
            bn: BatchNormConfig::new(out_channels).init(device),
            se,
            activate,
        }
    }

    pub fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        let x = self.conv.forward(x);
        let x = self.bn.forward(x);
        let x = if self.activate { silu(x) } else { x };

        match &self.se {
            Some(se) => se.forward(x),
            None => x,
        }
    }
}

/// A run of units with an optional identity shortcut
#[derive(Module, Debug)]
pub struct BackboneBlock<B: Backend> {
    pub units: Vec<ConvUnit<B>>,
    residual: bool,
}

impl<B: Backend> BackboneBlock<B> {
    pub fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        let out = self.units.iter().fold(x.clone(), |h, unit| unit.forward(h));
        if self.residual {
            out + x
        } else {
            out
        }
    }
}

#[derive(Module, Debug)]
pub struct Backbone<B: Backend> {
    pub blocks: Vec<BackboneBlock<B>>,
    num_layers: usize,
    out_channels: usize,
}

impl<B: Backend> Backbone<B> {
    pub fn new(config: &BackboneConfig, device: &B::Device) -> Self {
        let single = |unit: ConvUnit<B>| BackboneBlock {
            units: vec![unit],
            residual: false,
        };

        let mut blocks = vec![single(ConvUnit::new(
            3,
            config.stem_channels,
            3,
            2,
            1,
            true,
            None,
            device,
        ))];
        let mut channels = config.stem_channels;

        for stage in &config.stages {
            for repeat in 0..stage.repeats {
                let stride = if repeat == 0 { stage.stride } else { 1 };
                let out = stage.out_channels;
                let expanded = channels * stage.expand_ratio;
                let k = stage.kernel_size;

                let units = match (stage.kind, stage.expand_ratio) {
                    (BlockKind::FusedMbConv, 1) => {
                        vec![ConvUnit::new(channels, out, k, stride, 1, true, None, device)]
                    }
                    (BlockKind::FusedMbConv, _) => vec![
                        ConvUnit::new(channels, expanded, k, stride, 1, true, None, device),
                        ConvUnit::new(expanded, out, 1, 1, 1, false, None, device),
                    ],
                    (BlockKind::MbConv, ratio) => {
                        let squeezed = (channels as f64 * config.se_ratio) as usize;
                        let mut units = Vec::with_capacity(3);
                        if ratio > 1 {
                            units.push(ConvUnit::new(channels, expanded, 1, 1, 1, true, None, device));
                        }
                        let se = SqueezeExcite::new(expanded, squeezed, device);
                        units.push(ConvUnit::new(
                            expanded,
                            expanded,
                            k,
                            stride,
                            expanded,
                            true,
                            Some(se),
                            device,
                        ));
                        units.push(ConvUnit::new(expanded, out, 1, 1, 1, false, None, device));
                        units
                    }
                };

                blocks.push(BackboneBlock {
                    units,
                    residual: stride == 1 && channels == out,
                });
                channels = out;
            }
        }

        blocks.push(single(ConvUnit::new(
            channels,
            config.head_channels,
            1,
            1,
            1,
            true,
            None,
            device,
        )));

        let num_layers = blocks.iter().map(|b| b.units.len()).sum();
        Self {
            blocks,
            num_layers,
            out_channels: config.head_channels,
        }
    }

    /// Feature map of shape [batch, out_channels, H/32, W/32]
    pub fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        self.blocks.iter().fold(x, |x, block| block.forward(x))
    }

    pub fn num_layers(&self) -> usize {
        self.num_layers
    }

    pub fn out_channels(&self) -> usize {
        self.out_channels
    }

    /// Load pretrained weights saved with `CompactRecorder`
    pub fn load_pretrained(self, path: &Path, device: &B::Device) -> Result<Self> {
        self.load_file(path.to_path_buf(), &CompactRecorder::new(), device)
            .map_err(|e| {
                TransferError::Model(format!(
                    "Failed to load backbone weights from {:?}: {:?}",
                    path, e
                ))
            })
    }
}

impl<B: AutodiffBackend> Backbone<B> {
    /// Training forward pass where the first `trainable_from` units are frozen.
    ///
    /// Frozen units are evaluated on the inner backend, detached from the
    /// graph and with batch norm in inference mode.
    pub fn forward_partially_frozen(&self, x: Tensor<B, 4>, trainable_from: usize) -> Tensor<B, 4> {
        if trainable_from == 0 {
            return self.forward(x);
        }

        let mut layer = 0;
        let mut x = x;
        for block in &self.blocks {
            let input = x.clone();
            let mut h = x;
            for unit in &block.units {
                h = if layer < trainable_from {
                    Tensor::from_inner(unit.valid().forward(h.inner()))
                } else {
                    unit.forward(h)
                };
                layer += 1;
            }
            x = if block.residual { h + input } else { h };
        }
        x
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::Autodiff;
    use burn_ndarray::NdArray;

    type TestBackend = NdArray<f32>;

    #[test]
    fn test_unit_count_matches_config() {
        let device = Default::default();
        let config = BackboneConfig::tiny();
        let backbone = Backbone::<TestBackend>::new(&config, &device);
        assert_eq!(backbone.num_layers(), config.num_layers());
        assert_eq!(backbone.out_channels(), 32);
    }

    #[test]
    fn test_feature_map_shape() {
        let device = Default::default();
        let backbone = Backbone::<TestBackend>::new(&BackboneConfig::tiny(), &device);
        let input = Tensor::<TestBackend, 4>::zeros([2, 3, 32, 32], &device);

        let features = backbone.forward(input);
        // tiny reduces by 2 * 1 * 2 * 2 = 8
        assert_eq!(features.dims(), [2, 32, 4, 4]);
    }

    #[test]
    fn test_frozen_forward_keeps_shape() {
        let device = Default::default();
        let backbone = Backbone::<Autodiff<TestBackend>>::new(&BackboneConfig::tiny(), &device);
        let input = Tensor::<Autodiff<TestBackend>, 4>::ones([1, 3, 16, 16], &device);

        let features = backbone.forward_partially_frozen(input, 5);
        assert_eq!(features.dims(), [1, 32, 2, 2]);
    }
}
