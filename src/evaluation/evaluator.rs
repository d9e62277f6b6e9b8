//! Read-only evaluation pass over a dataset

use burn::{data::dataloader::batcher::Batcher, tensor::backend::Backend};
use tracing::info;

use crate::dataset::{ClassIndex, ClassificationBatch, ClassificationBatcher, EpochLoader, ImageDataset};
use crate::evaluation::report::ClassificationReport;
use crate::model::TransferClassifier;
use crate::utils::error::Result;
use crate::utils::metrics::Metrics;

/// True and predicted labels in dataset order
#[derive(Debug, Clone, Default)]
pub struct Predictions {
    pub y_true: Vec<usize>,
    pub y_pred: Vec<usize>,
}

/// Run the model once over `dataset` in fixed order and collect argmax predictions.
///
/// Pass a model on a non-autodiff backend (or `model.valid()`) so dropout
/// and batch norm run in inference mode.
pub fn collect_predictions<B: Backend>(
    model: &TransferClassifier<B>,
    dataset: &ImageDataset,
    batch_size: usize,
    device: &B::Device,
) -> Result<Predictions> {
    let batcher = ClassificationBatcher::new(dataset.image_size() as usize);
    let mut predictions = Predictions {
        y_true: Vec::with_capacity(dataset.len()),
        y_pred: Vec::with_capacity(dataset.len()),
    };

    EpochLoader::sequential(dataset, batch_size).for_each_batch(|_, items| {
        predictions.y_true.extend(items.iter().map(|item| item.label));

        let batch: ClassificationBatch<B> = batcher.batch(items, device);
        model.check_input(batch.images.dims())?;
        let [n, _, _, _] = batch.images.dims();

        let pred = model.forward(batch.images).argmax(1).reshape([n]);
        predictions
            .y_pred
            .extend(pred.into_data().iter::<i64>().map(|p| p as usize));
        Ok(())
    })?;

    Ok(predictions)
}

/// Evaluate and build the classification report
pub fn evaluate<B: Backend>(
    model: &TransferClassifier<B>,
    dataset: &ImageDataset,
    classes: &ClassIndex,
    batch_size: usize,
    device: &B::Device,
) -> Result<ClassificationReport> {
    let predictions = collect_predictions(model, dataset, batch_size, device)?;
    let metrics = Metrics::from_predictions(&predictions.y_pred, &predictions.y_true, classes.len())?;
    info!(
        "Evaluated {} samples: accuracy {:.2}%",
        metrics.total_samples,
        metrics.accuracy * 100.0
    );
    Ok(ClassificationReport::new(metrics, classes))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::ImageSample;
    use crate::model::{BackboneConfig, ClassifierConfig};
    use burn_ndarray::NdArray;
    use image::{Rgb, RgbImage};
    use tempfile::TempDir;

    type TestBackend = NdArray<f32>;

    #[test]
    fn test_predictions_follow_dataset_order() {
        let tmp = TempDir::new().unwrap();
        let samples: Vec<ImageSample> = (0..5)
            .map(|i| {
                let path = tmp.path().join(format!("{}.png", i));
                RgbImage::from_pixel(12, 12, Rgb([(40 * i) as u8, 90, 200])).save(&path).unwrap();
                ImageSample { path, label: i % 3 }
            })
            .collect();
        let dataset = ImageDataset::new(samples, 32);

        let device = Default::default();
        let config = ClassifierConfig::new(3, BackboneConfig::tiny())
            .with_input_size(32)
            .with_dense_units(8);
        let model = TransferClassifier::<TestBackend>::new(&config, &device);

        let predictions = collect_predictions(&model, &dataset, 2, &device).unwrap();
        assert_eq!(predictions.y_true, vec![0, 1, 2, 0, 1]);
        assert_eq!(predictions.y_pred.len(), 5);
        assert!(predictions.y_pred.iter().all(|&p| p < 3));

        let classes = ClassIndex::new(vec!["a".to_string(), "b".to_string(), "c".to_string()]);
        let report = evaluate(&model, &dataset, &classes, 2, &device).unwrap();
        assert_eq!(report.metrics.total_samples, 5);
    }
}
