//! Inference Predictor Module
//!
//! Rebuilds a trained classifier from its run directory and predicts class
//! probabilities for images on disk.

use std::path::{Path, PathBuf};
use std::time::Instant;

use burn::{data::dataloader::batcher::Batcher, tensor::backend::Backend};
use serde::{Deserialize, Serialize};
use tracing::info;
use walkdir::WalkDir;

use crate::dataset::augmentation::to_chw;
use crate::dataset::burn_dataset::decode_image;
use crate::dataset::loader::is_image_path;
use crate::dataset::{ClassIndex, ClassificationBatch, ClassificationBatcher, ImageItem, CLASS_INDEX_FILE};
use crate::model::TransferClassifier;
use crate::training::checkpoint::load_best;
use crate::utils::error::{Result, ResultExt, TransferError};

/// Result of a single prediction
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PredictionResult {
    pub image_path: PathBuf,

    /// Predicted class index
    pub predicted_class: usize,

    /// Predicted class name
    pub class_name: String,

    /// Probability of the predicted class
    pub confidence: f32,

    /// Full probability distribution over all classes
    pub probabilities: Vec<f32>,

    /// Highest-ranked classes as (index, name, probability)
    pub top_k: Vec<(usize, String, f32)>,
}

impl PredictionResult {
    pub fn new(image_path: PathBuf, probabilities: Vec<f32>, classes: &ClassIndex, k: usize) -> Self {
        let mut ranked: Vec<(usize, f32)> = probabilities.iter().copied().enumerate().collect();
        ranked.sort_by(|a, b| b.1.total_cmp(&a.1));

        let name = |idx: usize| classes.name(idx).unwrap_or("Unknown").to_string();
        let (predicted_class, confidence) = ranked.first().copied().unwrap_or((0, 0.0));
        let top_k = ranked
            .iter()
            .take(k.max(1))
            .map(|&(idx, p)| (idx, name(idx), p))
            .collect();

        Self {
            image_path,
            predicted_class,
            class_name: name(predicted_class),
            confidence,
            probabilities,
            top_k,
        }
    }

    /// Pretty print the prediction result
    pub fn display(&self) -> String {
        let mut output = format!("Image: {:?}\n", self.image_path);
        output.push_str(&format!(
            "Prediction: {} (class {}) - {:.2}%\n",
            self.class_name,
            self.predicted_class,
            self.confidence * 100.0
        ));
        for (i, (idx, name, prob)) in self.top_k.iter().enumerate().skip(1) {
            output.push_str(&format!("  {}. {} (class {}) - {:.2}%\n", i + 1, name, idx, prob * 100.0));
        }
        output
    }
}

/// Predictor for running inference with a trained model
pub struct Predictor<B: Backend> {
    model: TransferClassifier<B>,
    classes: ClassIndex,
    batcher: ClassificationBatcher,
    device: B::Device,
}

impl<B: Backend> Predictor<B> {
    pub fn new(model: TransferClassifier<B>, classes: ClassIndex, device: B::Device) -> Result<Self> {
        if classes.len() != model.num_classes() {
            return Err(TransferError::ShapeMismatch {
                context: "class index".to_string(),
                expected: format!("{} classes", model.num_classes()),
                actual: format!("{} classes", classes.len()),
            });
        }
        let batcher = ClassificationBatcher::new(model.input_size());
        Ok(Self {
            model,
            classes,
            batcher,
            device,
        })
    }

    /// Load `model_config.json`, `best_model.mpk` and `class_indices.json` from a run directory
    pub fn load(run_dir: &Path, device: B::Device) -> Result<Self> {
        let (model, _) = load_best::<B>(run_dir, &device)?;
        let classes = ClassIndex::load(&run_dir.join(CLASS_INDEX_FILE))?;
        info!("Loaded classifier with {} classes from {:?}", classes.len(), run_dir);
        Self::new(model, classes, device)
    }

    pub fn classes(&self) -> &ClassIndex {
        &self.classes
    }

    pub fn predict_image(&self, path: &Path, top_k: usize) -> Result<PredictionResult> {
        self.predict_batch(&[path.to_path_buf()], top_k)?
            .pop()
            .with_context(|| format!("no prediction for {:?}", path))
    }

    /// Predict a list of images, `batch_size` at a time
    pub fn predict_images(&self, paths: &[PathBuf], top_k: usize, batch_size: usize) -> Result<Vec<PredictionResult>> {
        let mut results = Vec::with_capacity(paths.len());
        for chunk in paths.chunks(batch_size.max(1)) {
            results.extend(self.predict_batch(chunk, top_k)?);
        }
        Ok(results)
    }

    /// Predict every image below `dir`, in sorted path order
    pub fn predict_dir(&self, dir: &Path, top_k: usize, batch_size: usize) -> Result<Vec<PredictionResult>> {
        if !dir.is_dir() {
            return Err(TransferError::PathNotFound(dir.to_path_buf()));
        }
        let mut paths: Vec<PathBuf> = WalkDir::new(dir)
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_file() && is_image_path(e.path()))
            .map(|e| e.into_path())
            .collect();
        paths.sort();

        if paths.is_empty() {
            return Err(TransferError::Dataset(format!("No images found in {:?}", dir)));
        }
        self.predict_images(&paths, top_k, batch_size)
    }

    fn predict_batch(&self, paths: &[PathBuf], top_k: usize) -> Result<Vec<PredictionResult>> {
        let size = self.model.input_size() as u32;
        let items = paths
            .iter()
            .map(|path| {
                Ok(ImageItem {
                    image: to_chw(&decode_image(path, size)?),
                    label: 0,
                    path: path.clone(),
                })
            })
            .collect::<Result<Vec<_>>>()?;

        let start = Instant::now();
        let batch: ClassificationBatch<B> = self.batcher.batch(items, &self.device);
        self.model.check_input(batch.images.dims())?;
        let probabilities: Vec<f32> = self
            .model
            .forward_softmax(batch.images)
            .into_data()
            .iter::<f32>()
            .collect();
        tracing::debug!("Predicted {} images in {:?}", paths.len(), start.elapsed());

        Ok(paths
            .iter()
            .zip(probabilities.chunks(self.model.num_classes()))
            .map(|(path, probs)| PredictionResult::new(path.clone(), probs.to_vec(), &self.classes, top_k))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn classes() -> ClassIndex {
        ClassIndex::new(vec!["daisy".to_string(), "rose".to_string(), "tulip".to_string()])
    }

    #[test]
    fn test_prediction_result_ranks_classes() {
        let result = PredictionResult::new(PathBuf::from("x.png"), vec![0.2, 0.7, 0.1], &classes(), 2);
        assert_eq!(result.predicted_class, 1);
        assert_eq!(result.class_name, "rose");
        assert_eq!(result.top_k.len(), 2);
        assert_eq!(result.top_k[1].1, "daisy");
        assert!(result.display().contains("rose"));
    }

    #[test]
    fn test_top_k_capped_by_classes() {
        let result = PredictionResult::new(PathBuf::from("x.png"), vec![0.5, 0.3, 0.2], &classes(), 10);
        assert_eq!(result.top_k.len(), 3);
    }
}
