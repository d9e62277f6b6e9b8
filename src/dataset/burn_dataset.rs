//! Burn Dataset Integration
//!
//! Decoding, caching and batching of image samples.
//!
//! - `ImageDataset`: decodes and resizes images, optionally keeping the
//!   resized (pre-augmentation) pixels in memory
//! - `ClassificationBatcher`: Burn `Batcher` turning items into tensors
//! - `EpochLoader`: one pass over a subset in fixed or shuffled order, with
//!   the next batches prepared on a producer thread

use std::path::{Path, PathBuf};
use std::sync::mpsc;

use burn::data::dataloader::batcher::Batcher;
use burn::data::dataset::Dataset;
use burn::prelude::*;
use image::imageops::FilterType;
use image::{ImageReader, RgbImage};
use indicatif::{ProgressBar, ProgressStyle};
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use rayon::prelude::*;
use tracing::{debug, info};

use crate::dataset::augmentation::{item_rng, to_chw, Augmenter};
use crate::dataset::loader::ImageSample;
use crate::utils::error::{Result, TransferError};

/// A single item ready for batching
#[derive(Clone, Debug)]
pub struct ImageItem {
    /// Flattened CHW float array `[3 * H * W]` in [0, 1]
    pub image: Vec<f32>,
    /// Class label
    pub label: usize,
    /// Source path (for diagnostics)
    pub path: PathBuf,
}

/// Decode an image file and resize it to `size x size` with bilinear filtering
pub fn decode_image(path: &Path, size: u32) -> Result<RgbImage> {
    let reader = ImageReader::open(path)
        .and_then(|r| r.with_guessed_format())
        .map_err(|e| TransferError::ImageLoad(path.to_path_buf(), e.to_string()))?;
    let img = reader
        .decode()
        .map_err(|e| TransferError::ImageLoad(path.to_path_buf(), e.to_string()))?;

    Ok(img.resize_exact(size, size, FilterType::Triangle).to_rgb8())
}

/// Image subset with optional in-memory cache of resized pixels
#[derive(Debug, Clone)]
pub struct ImageDataset {
    samples: Vec<ImageSample>,
    image_size: u32,
    cache: Option<Vec<RgbImage>>,
}

impl ImageDataset {
    /// Lazily decoding dataset
    pub fn new(samples: Vec<ImageSample>, image_size: u32) -> Self {
        Self {
            samples,
            image_size,
            cache: None,
        }
    }

    /// Decode every image up front (in parallel) and keep the resized pixels.
    ///
    /// The first unreadable file aborts loading with its path.
    pub fn new_cached(samples: Vec<ImageSample>, image_size: u32, name: &str) -> Result<Self> {
        let total = samples.len();
        println!("  📦 Decoding {} {} images...", total, name);

        let pb = ProgressBar::new(total as u64);
        pb.set_style(
            ProgressStyle::with_template(
                "  {spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({per_sec})",
            )
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("#>-"),
        );

        let images = samples
            .par_iter()
            .map(|sample| {
                let img = decode_image(&sample.path, image_size);
                pb.inc(1);
                img
            })
            .collect::<Result<Vec<_>>>();
        pb.finish_and_clear();
        let images = images?;

        info!("Cached {} {} images at {}x{}", total, name, image_size, image_size);

        Ok(Self {
            samples,
            image_size,
            cache: Some(images),
        })
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn image_size(&self) -> u32 {
        self.image_size
    }

    pub fn samples(&self) -> &[ImageSample] {
        &self.samples
    }

    pub fn labels(&self) -> Vec<usize> {
        self.samples.iter().map(|s| s.label).collect()
    }

    /// Resized, un-augmented image at `index`
    pub fn image(&self, index: usize) -> Result<RgbImage> {
        let sample = self.samples.get(index).ok_or_else(|| {
            TransferError::InvalidInput(format!(
                "sample index {} out of range for {} samples",
                index,
                self.samples.len()
            ))
        })?;

        match &self.cache {
            Some(images) => Ok(images[index].clone()),
            None => decode_image(&sample.path, self.image_size),
        }
    }

    /// Build a batch item, augmenting with the given RNG if the augmenter is enabled
    pub fn item(&self, index: usize, augmenter: &Augmenter, rng: &mut ChaCha8Rng) -> Result<ImageItem> {
        let img = self.image(index)?;
        let img = augmenter.augment(&img, rng);
        let sample = &self.samples[index];

        Ok(ImageItem {
            image: to_chw(&img),
            label: sample.label,
            path: sample.path.clone(),
        })
    }
}

impl Dataset<ImageItem> for ImageDataset {
    fn get(&self, index: usize) -> Option<ImageItem> {
        let img = self.image(index).ok()?;
        let sample = &self.samples[index];
        Some(ImageItem {
            image: to_chw(&img),
            label: sample.label,
            path: sample.path.clone(),
        })
    }

    fn len(&self) -> usize {
        self.samples.len()
    }
}

/// A batch of images and integer targets
#[derive(Clone, Debug)]
pub struct ClassificationBatch<B: Backend> {
    /// Images `[batch, 3, height, width]` in [0, 1]
    pub images: Tensor<B, 4>,
    /// Labels `[batch]`
    pub targets: Tensor<B, 1, Int>,
}

/// Batcher for classification items of a fixed square size
#[derive(Clone, Debug)]
pub struct ClassificationBatcher {
    image_size: usize,
}

impl ClassificationBatcher {
    pub fn new(image_size: usize) -> Self {
        Self { image_size }
    }
}

impl<B: Backend> Batcher<B, ImageItem, ClassificationBatch<B>> for ClassificationBatcher {
    fn batch(&self, items: Vec<ImageItem>, device: &B::Device) -> ClassificationBatch<B> {
        let batch_size = items.len();
        let (height, width) = (self.image_size, self.image_size);

        let images_data: Vec<f32> = items.iter().flat_map(|item| item.image.iter().copied()).collect();
        let images = Tensor::<B, 4>::from_data(
            TensorData::new(images_data, [batch_size, 3, height, width]),
            device,
        );

        let targets_data: Vec<i64> = items.iter().map(|item| item.label as i64).collect();
        let targets = Tensor::<B, 1, Int>::from_data(TensorData::new(targets_data, [batch_size]), device);

        ClassificationBatch { images, targets }
    }
}

/// One pass over an `ImageDataset`
pub struct EpochLoader<'a> {
    dataset: &'a ImageDataset,
    batch_size: usize,
    order: Vec<usize>,
    augmenter: Augmenter,
    seed: u64,
    epoch: usize,
    prefetch: usize,
}

impl<'a> EpochLoader<'a> {
    /// Shuffled, augmented pass for training epoch `epoch`
    pub fn training(
        dataset: &'a ImageDataset,
        batch_size: usize,
        augmenter: Augmenter,
        seed: u64,
        epoch: usize,
    ) -> Self {
        let mut order: Vec<usize> = (0..dataset.len()).collect();
        let mut rng = ChaCha8Rng::seed_from_u64(seed.wrapping_add(epoch as u64));
        order.shuffle(&mut rng);

        Self {
            dataset,
            batch_size: batch_size.max(1),
            order,
            augmenter,
            seed,
            epoch,
            prefetch: 2,
        }
    }

    /// Fixed-order pass without augmentation
    pub fn sequential(dataset: &'a ImageDataset, batch_size: usize) -> Self {
        Self {
            dataset,
            batch_size: batch_size.max(1),
            order: (0..dataset.len()).collect(),
            augmenter: Augmenter::disabled(),
            seed: 0,
            epoch: 0,
            prefetch: 2,
        }
    }

    /// Number of batches prepared ahead of the consumer (0 = no producer thread)
    pub fn with_prefetch(mut self, prefetch: usize) -> Self {
        self.prefetch = prefetch;
        self
    }

    pub fn num_batches(&self) -> usize {
        self.order.len().div_ceil(self.batch_size)
    }

    /// Sample indices in visiting order
    pub fn order(&self) -> &[usize] {
        &self.order
    }

    fn prepare_batch(&self, batch_idx: usize) -> Result<Vec<ImageItem>> {
        let start = batch_idx * self.batch_size;
        let end = (start + self.batch_size).min(self.order.len());

        self.order[start..end]
            .par_iter()
            .map(|&index| {
                let mut rng = item_rng(self.seed, self.epoch, index);
                self.dataset.item(index, &self.augmenter, &mut rng)
            })
            .collect()
    }

    /// Feed every batch to `consume` in order.
    ///
    /// Stops at the first error from either preparation or `consume`.
    pub fn for_each_batch<F>(&self, mut consume: F) -> Result<()>
    where
        F: FnMut(usize, Vec<ImageItem>) -> Result<()>,
    {
        let num_batches = self.num_batches();

        if self.prefetch == 0 {
            for batch_idx in 0..num_batches {
                consume(batch_idx, self.prepare_batch(batch_idx)?)?;
            }
            return Ok(());
        }

        std::thread::scope(|scope| {
            let (tx, rx) = mpsc::sync_channel::<Result<Vec<ImageItem>>>(self.prefetch);

            scope.spawn(move || {
                for batch_idx in 0..num_batches {
                    let batch = self.prepare_batch(batch_idx);
                    let failed = batch.is_err();
                    // a closed channel means the consumer stopped early
                    if tx.send(batch).is_err() || failed {
                        break;
                    }
                }
            });

            for (batch_idx, batch) in rx.iter().enumerate() {
                consume(batch_idx, batch?)?;
            }
            debug!("Epoch loader finished {} batches", num_batches);
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::augmentation::AugmentationConfig;
    use burn_ndarray::NdArray;
    use image::Rgb;
    use tempfile::TempDir;

    type TestBackend = NdArray<f32>;

    fn write_images(dir: &Path, n: usize) -> Vec<ImageSample> {
        (0..n)
            .map(|i| {
                let path = dir.join(format!("{}.png", i));
                RgbImage::from_pixel(10, 6, Rgb([((i * 20) % 256) as u8, 0, 255]))
                    .save(&path)
                    .unwrap();
                ImageSample { path, label: i % 2 }
            })
            .collect()
    }

    #[test]
    fn test_decode_resizes_exactly() {
        let tmp = TempDir::new().unwrap();
        let samples = write_images(tmp.path(), 1);
        let img = decode_image(&samples[0].path, 8).unwrap();
        assert_eq!(img.dimensions(), (8, 8));
    }

    #[test]
    fn test_corrupt_file_reports_path() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("broken.jpg");
        std::fs::write(&path, b"definitely not a jpeg").unwrap();

        let err = decode_image(&path, 8).unwrap_err();
        match err {
            TransferError::ImageLoad(p, _) => assert_eq!(p, path),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_cached_dataset_fails_on_corrupt_image() {
        let tmp = TempDir::new().unwrap();
        let mut samples = write_images(tmp.path(), 3);
        let bad = tmp.path().join("bad.png");
        std::fs::write(&bad, b"garbage").unwrap();
        samples.push(ImageSample { path: bad, label: 0 });

        assert!(ImageDataset::new_cached(samples, 8, "test").is_err());
    }

    #[test]
    fn test_batcher_shapes() {
        let tmp = TempDir::new().unwrap();
        let dataset = ImageDataset::new(write_images(tmp.path(), 3), 8);
        let items: Vec<ImageItem> = (0..3).filter_map(|i| dataset.get(i)).collect();

        let device = Default::default();
        let batch: ClassificationBatch<TestBackend> =
            ClassificationBatcher::new(8).batch(items, &device);

        assert_eq!(batch.images.dims(), [3, 3, 8, 8]);
        assert_eq!(batch.targets.dims(), [3]);
    }

    #[test]
    fn test_training_order_depends_on_epoch_only() {
        let tmp = TempDir::new().unwrap();
        let dataset = ImageDataset::new(write_images(tmp.path(), 20), 4);

        let a = EpochLoader::training(&dataset, 4, Augmenter::disabled(), 42, 1);
        let b = EpochLoader::training(&dataset, 4, Augmenter::disabled(), 42, 1);
        let c = EpochLoader::training(&dataset, 4, Augmenter::disabled(), 42, 2);

        assert_eq!(a.order(), b.order());
        assert_ne!(a.order(), c.order());
        assert_eq!(a.num_batches(), 5);
    }

    #[test]
    fn test_prefetch_visits_every_sample_once() {
        let tmp = TempDir::new().unwrap();
        let dataset = ImageDataset::new_cached(write_images(tmp.path(), 7), 4, "test").unwrap();

        for prefetch in [0, 1, 3] {
            let loader = EpochLoader::sequential(&dataset, 3).with_prefetch(prefetch);
            let mut seen = Vec::new();
            loader
                .for_each_batch(|_, items| {
                    seen.extend(items.into_iter().map(|i| i.path));
                    Ok(())
                })
                .unwrap();
            assert_eq!(seen.len(), 7);
            assert_eq!(seen[0], dataset.samples()[0].path);
        }
    }

    #[test]
    fn test_sequential_items_are_never_augmented() {
        let tmp = TempDir::new().unwrap();
        let samples: Vec<ImageSample> = (0..5)
            .map(|i| {
                let path = tmp.path().join(format!("grad{}.png", i));
                RgbImage::from_fn(8, 8, |x, y| Rgb([(x * 30) as u8, (y * 30) as u8, (i * 40) as u8]))
                    .save(&path)
                    .unwrap();
                ImageSample { path, label: i % 2 }
            })
            .collect();
        let dataset = ImageDataset::new(samples, 8);

        let mut items = Vec::new();
        EpochLoader::sequential(&dataset, 2)
            .for_each_batch(|_, batch| {
                items.extend(batch);
                Ok(())
            })
            .unwrap();

        assert_eq!(items.len(), 5);
        for (i, item) in items.iter().enumerate() {
            assert_eq!(item.image, to_chw(&dataset.image(i).unwrap()));
        }

        // the same images do change under a training loader that always flips
        let flip = Augmenter::new(AugmentationConfig {
            enabled: true,
            horizontal_flip_prob: 1.0,
            ..AugmentationConfig::none()
        });
        let mut rng = item_rng(42, 0, 0);
        let flipped = dataset.item(0, &flip, &mut rng).unwrap();
        assert_ne!(flipped.image, to_chw(&dataset.image(0).unwrap()));
    }

    #[test]
    fn test_consumer_error_stops_loading() {
        let tmp = TempDir::new().unwrap();
        let dataset = ImageDataset::new(write_images(tmp.path(), 9), 4);
        let loader = EpochLoader::sequential(&dataset, 2).with_prefetch(1);

        let mut calls = 0;
        let result = loader.for_each_batch(|_, _| {
            calls += 1;
            Err(TransferError::Training("stop".to_string()))
        });

        assert!(result.is_err());
        assert_eq!(calls, 1);
    }
}
