//! Per-layer trainability of the backbone
//!
//! Mirrors the two switches a transfer-learning run needs: a whole-backbone
//! toggle for the frozen phase, and "freeze everything except the last N
//! layers" for fine-tuning. The head is always trainable.

use serde::{Deserialize, Serialize};

use crate::utils::error::{Result, TransferError};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LayerState {
    pub name: String,
    pub trainable: bool,
}

/// Ordered trainability flags, input layer first
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrainabilityPlan {
    layers: Vec<LayerState>,
}

impl TrainabilityPlan {
    /// Every layer frozen
    pub fn frozen(names: Vec<String>) -> Self {
        Self {
            layers: names
                .into_iter()
                .map(|name| LayerState { name, trainable: false })
                .collect(),
        }
    }

    /// Every layer trainable
    pub fn trainable(names: Vec<String>) -> Self {
        let mut plan = Self::frozen(names);
        plan.set_all(true);
        plan
    }

    /// Set the flag on every layer at once
    pub fn set_all(&mut self, trainable: bool) {
        for layer in &mut self.layers {
            layer.trainable = trainable;
        }
    }

    /// Freeze all layers except the last `n`, which become trainable.
    ///
    /// With `n >= len` the whole backbone is trainable.
    pub fn freeze_all_but_last(&mut self, n: usize) {
        let boundary = self.layers.len().saturating_sub(n);
        for (i, layer) in self.layers.iter_mut().enumerate() {
            layer.trainable = i >= boundary;
        }
    }

    pub fn set_layer(&mut self, index: usize, trainable: bool) -> Result<()> {
        let len = self.layers.len();
        let layer = self.layers.get_mut(index).ok_or_else(|| {
            TransferError::InvalidInput(format!("layer index {} out of range ({} layers)", index, len))
        })?;
        layer.trainable = trainable;
        Ok(())
    }

    /// Index of the first trainable layer (`len` when fully frozen).
    ///
    /// The backbone can only skip gradients for a frozen prefix, so a frozen
    /// layer after a trainable one is rejected.
    pub fn trainable_from(&self) -> Result<usize> {
        let first = self
            .layers
            .iter()
            .position(|l| l.trainable)
            .unwrap_or(self.layers.len());

        if let Some(offset) = self.layers[first..].iter().position(|l| !l.trainable) {
            return Err(TransferError::Model(format!(
                "layer '{}' is frozen after trainable layer '{}'; only a frozen prefix is supported",
                self.layers[first + offset].name, self.layers[first].name
            )));
        }
        Ok(first)
    }

    pub fn layers(&self) -> &[LayerState] {
        &self.layers
    }

    pub fn len(&self) -> usize {
        self.layers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.layers.is_empty()
    }

    pub fn num_trainable(&self) -> usize {
        self.layers.iter().filter(|l| l.trainable).count()
    }

    pub fn num_frozen(&self) -> usize {
        self.len() - self.num_trainable()
    }

    pub fn summary(&self) -> String {
        format!(
            "{} backbone layers: {} frozen, {} trainable",
            self.len(),
            self.num_frozen(),
            self.num_trainable()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(n: usize) -> Vec<String> {
        (0..n).map(|i| format!("layer_{}", i)).collect()
    }

    #[test]
    fn test_freeze_all_but_last_forty_of_fifty() {
        let mut plan = TrainabilityPlan::trainable(names(50));
        plan.freeze_all_but_last(40);

        assert_eq!(plan.num_frozen(), 10);
        assert_eq!(plan.num_trainable(), 40);
        assert!(plan.layers()[..10].iter().all(|l| !l.trainable));
        assert!(plan.layers()[10..].iter().all(|l| l.trainable));
        assert_eq!(plan.trainable_from().unwrap(), 10);
    }

    #[test]
    fn test_fewer_layers_than_n_is_fully_trainable() {
        let mut plan = TrainabilityPlan::frozen(names(8));
        plan.freeze_all_but_last(40);
        assert_eq!(plan.num_trainable(), 8);
        assert_eq!(plan.trainable_from().unwrap(), 0);
    }

    #[test]
    fn test_frozen_plan_starts_past_end() {
        let plan = TrainabilityPlan::frozen(names(5));
        assert_eq!(plan.trainable_from().unwrap(), 5);
    }

    #[test]
    fn test_non_prefix_pattern_rejected() {
        let mut plan = TrainabilityPlan::trainable(names(5));
        plan.set_layer(3, false).unwrap();
        assert!(plan.trainable_from().is_err());
        assert!(plan.set_layer(9, true).is_err());
    }
}
