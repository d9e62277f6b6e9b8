//! Class-weighted sparse categorical cross-entropy
//!
//! `loss = Σ w[yᵢ] · (−log softmax(zᵢ)[yᵢ]) / batch_size`
//!
//! Weighting is per sample through its label, reduced over the batch size
//! (not over the weight sum). Without weights this is the plain mean
//! cross-entropy used for validation.

use burn::tensor::{activation::log_softmax, backend::Backend, Int, Tensor, TensorData};

use crate::dataset::distribution::ClassWeights;

#[derive(Debug, Clone)]
pub struct WeightedCrossEntropy<B: Backend> {
    weights: Option<Tensor<B, 1>>,
}

impl<B: Backend> WeightedCrossEntropy<B> {
    pub fn new(weights: &ClassWeights, device: &B::Device) -> Self {
        let data = TensorData::new(weights.to_f32(), [weights.len()]);
        Self {
            weights: Some(Tensor::from_data(data, device)),
        }
    }

    /// Plain mean cross-entropy
    pub fn unweighted() -> Self {
        Self { weights: None }
    }

    /// Scalar loss for logits `[batch, classes]` and targets `[batch]`
    pub fn forward(&self, logits: Tensor<B, 2>, targets: Tensor<B, 1, Int>) -> Tensor<B, 1> {
        let [batch, _] = logits.dims();

        let log_probs = log_softmax(logits, 1);
        let nll = log_probs
            .gather(1, targets.clone().reshape([batch, 1]))
            .reshape([batch])
            .neg();

        let per_sample = match &self.weights {
            Some(weights) => nll * weights.clone().select(0, targets),
            None => nll,
        };
        per_sample.sum().div_scalar(batch as f32)
    }
}
