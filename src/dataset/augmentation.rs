//! Data Augmentation Module
//!
//! Random training-time transforms applied to already resized images:
//! - horizontal flip
//! - rotation by a fraction of a full turn
//! - zoom in or out around the image centre
//! - per-channel contrast scaling
//!
//! Geometric transforms sample bilinearly and fill uncovered pixels by
//! reflecting the image across its border. Validation and inference images
//! are never augmented.

use std::f32::consts::PI;
use std::path::Path;

use image::{imageops, Rgb, RgbImage};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

use crate::utils::error::{Result, TransferError};

/// Configuration for data augmentation
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AugmentationConfig {
    /// Master switch
    pub enabled: bool,
    /// Probability of a horizontal flip
    pub horizontal_flip_prob: f32,
    /// Rotation range as a fraction of a full turn (0.1 = ±36°)
    pub rotation_factor: f32,
    /// Zoom range; the scale is drawn from [1 - f, 1 + f] and applied to both axes
    pub zoom_factor: f32,
    /// Contrast range; the factor is drawn from [1 - f, 1 + f]
    pub contrast_factor: f32,
}

impl Default for AugmentationConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            horizontal_flip_prob: 0.5,
            rotation_factor: 0.1,
            zoom_factor: 0.1,
            contrast_factor: 0.1,
        }
    }
}

impl AugmentationConfig {
    /// Disable all augmentations (for validation/inference)
    pub fn none() -> Self {
        Self {
            enabled: false,
            horizontal_flip_prob: 0.0,
            rotation_factor: 0.0,
            zoom_factor: 0.0,
            contrast_factor: 0.0,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.horizontal_flip_prob) {
            return Err(TransferError::Config(format!(
                "horizontal_flip_prob must be in [0, 1], got {}",
                self.horizontal_flip_prob
            )));
        }
        for (name, value) in [
            ("rotation_factor", self.rotation_factor),
            ("zoom_factor", self.zoom_factor),
            ("contrast_factor", self.contrast_factor),
        ] {
            if !(0.0..1.0).contains(&value) {
                return Err(TransferError::Config(format!(
                    "{} must be in [0, 1), got {}",
                    name, value
                )));
            }
        }
        Ok(())
    }
}

/// Image augmenter that applies random transformations
#[derive(Clone, Debug)]
pub struct Augmenter {
    config: AugmentationConfig,
}

impl Augmenter {
    pub fn new(config: AugmentationConfig) -> Self {
        Self { config }
    }

    /// Pass-through augmenter for validation and inference
    pub fn disabled() -> Self {
        Self::new(AugmentationConfig::none())
    }

    pub fn is_enabled(&self) -> bool {
        self.config.enabled
    }

    pub fn config(&self) -> &AugmentationConfig {
        &self.config
    }

    /// Apply the configured transforms in order: flip, rotation, zoom, contrast
    pub fn augment(&self, img: &RgbImage, rng: &mut ChaCha8Rng) -> RgbImage {
        if !self.config.enabled {
            return img.clone();
        }

        let mut result = if rng.gen::<f32>() < self.config.horizontal_flip_prob {
            imageops::flip_horizontal(img)
        } else {
            img.clone()
        };

        if self.config.rotation_factor > 0.0 {
            let turns = rng.gen_range(-self.config.rotation_factor..=self.config.rotation_factor);
            result = rotate(&result, turns * 2.0 * PI);
        }

        if self.config.zoom_factor > 0.0 {
            let scale = 1.0 + rng.gen_range(-self.config.zoom_factor..=self.config.zoom_factor);
            result = zoom(&result, scale);
        }

        if self.config.contrast_factor > 0.0 {
            let factor = 1.0 + rng.gen_range(-self.config.contrast_factor..=self.config.contrast_factor);
            result = adjust_contrast(&result, factor);
        }

        result
    }
}

/// Deterministic per-item RNG for a given seed, epoch and sample position
pub fn item_rng(seed: u64, epoch: usize, position: usize) -> ChaCha8Rng {
    let mixed = splitmix64(seed ^ splitmix64((epoch as u64) << 32 ^ position as u64));
    ChaCha8Rng::seed_from_u64(mixed)
}

fn splitmix64(mut z: u64) -> u64 {
    z = z.wrapping_add(0x9E37_79B9_7F4A_7C15);
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    z ^ (z >> 31)
}

/// Rotate around the image centre by `angle` radians (counter-clockwise)
fn rotate(img: &RgbImage, angle: f32) -> RgbImage {
    if angle.abs() < 1e-4 {
        return img.clone();
    }

    let (width, height) = img.dimensions();
    let cx = (width as f32 - 1.0) / 2.0;
    let cy = (height as f32 - 1.0) / 2.0;
    let (sin_a, cos_a) = angle.sin_cos();

    RgbImage::from_fn(width, height, |x, y| {
        let dx = x as f32 - cx;
        let dy = y as f32 - cy;
        let src_x = cx + dx * cos_a - dy * sin_a;
        let src_y = cy + dx * sin_a + dy * cos_a;
        bilinear_reflect(img, src_x, src_y)
    })
}

/// Scale around the centre; `scale > 1` zooms out, `scale < 1` zooms in
fn zoom(img: &RgbImage, scale: f32) -> RgbImage {
    if (scale - 1.0).abs() < 1e-4 {
        return img.clone();
    }

    let (width, height) = img.dimensions();
    let cx = (width as f32 - 1.0) / 2.0;
    let cy = (height as f32 - 1.0) / 2.0;

    RgbImage::from_fn(width, height, |x, y| {
        let src_x = cx + (x as f32 - cx) * scale;
        let src_y = cy + (y as f32 - cy) * scale;
        bilinear_reflect(img, src_x, src_y)
    })
}

/// Per-channel contrast: `(x - mean_c) * factor + mean_c`, clipped to [0, 255]
fn adjust_contrast(img: &RgbImage, factor: f32) -> RgbImage {
    let pixel_count = (img.width() * img.height()).max(1) as f64;
    let mut sums = [0.0f64; 3];
    for pixel in img.pixels() {
        for c in 0..3 {
            sums[c] += pixel[c] as f64;
        }
    }
    let means = sums.map(|s| (s / pixel_count) as f32);

    let mut output = img.clone();
    for pixel in output.pixels_mut() {
        for c in 0..3 {
            let v = (pixel[c] as f32 - means[c]) * factor + means[c];
            pixel[c] = v.round().clamp(0.0, 255.0) as u8;
        }
    }
    output
}

/// Mirror an integer coordinate into `[0, size)`, repeating the edge pixel
/// (`d c b a | a b c d | d c b a`).
fn reflect_index(i: i64, size: u32) -> u32 {
    let n = size as i64;
    let period = 2 * n;
    let c = i.rem_euclid(period);
    (if c >= n { period - 1 - c } else { c }) as u32
}

fn bilinear_reflect(img: &RgbImage, x: f32, y: f32) -> Rgb<u8> {
    let (width, height) = img.dimensions();

    let x0f = x.floor();
    let y0f = y.floor();
    let fx = x - x0f;
    let fy = y - y0f;
    let (x0, y0) = (x0f as i64, y0f as i64);

    let xa = reflect_index(x0, width);
    let xb = reflect_index(x0 + 1, width);
    let ya = reflect_index(y0, height);
    let yb = reflect_index(y0 + 1, height);

    let p00 = img.get_pixel(xa, ya);
    let p10 = img.get_pixel(xb, ya);
    let p01 = img.get_pixel(xa, yb);
    let p11 = img.get_pixel(xb, yb);

    let mut result = [0u8; 3];
    for c in 0..3 {
        let v = p00[c] as f32 * (1.0 - fx) * (1.0 - fy)
            + p10[c] as f32 * fx * (1.0 - fy)
            + p01[c] as f32 * (1.0 - fx) * fy
            + p11[c] as f32 * fx * fy;
        result[c] = v.round().clamp(0.0, 255.0) as u8;
    }
    Rgb(result)
}

/// Convert an RGB image to a flat CHW buffer scaled to [0, 1]
pub fn to_chw(img: &RgbImage) -> Vec<f32> {
    let (width, height) = img.dimensions();
    let plane = (width * height) as usize;
    let mut data = vec![0.0f32; 3 * plane];

    for (x, y, pixel) in img.enumerate_pixels() {
        let idx = (y * width + x) as usize;
        data[idx] = pixel[0] as f32 / 255.0;
        data[plane + idx] = pixel[1] as f32 / 255.0;
        data[2 * plane + idx] = pixel[2] as f32 / 255.0;
    }

    data
}

/// Save a grid of images (row-major, `cols` per row) as a PNG preview
pub fn save_preview_grid(images: &[RgbImage], cols: u32, path: &Path) -> Result<()> {
    let first = images
        .first()
        .ok_or_else(|| TransferError::InvalidInput("no images for preview grid".to_string()))?;
    let (w, h) = first.dimensions();
    let cols = cols.max(1);
    let rows = (images.len() as u32).div_ceil(cols);
    let gap = 4;

    let mut canvas = RgbImage::from_pixel(
        cols * w + (cols + 1) * gap,
        rows * h + (rows + 1) * gap,
        Rgb([255, 255, 255]),
    );
    for (i, img) in images.iter().enumerate() {
        let col = i as u32 % cols;
        let row = i as u32 / cols;
        imageops::replace(
            &mut canvas,
            img,
            (gap + col * (w + gap)) as i64,
            (gap + row * (h + gap)) as i64,
        );
    }

    canvas
        .save(path)
        .map_err(|e| TransferError::ImageLoad(path.to_path_buf(), e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gradient(size: u32) -> RgbImage {
        RgbImage::from_fn(size, size, |x, y| Rgb([(x * 8) as u8, (y * 8) as u8, 128]))
    }

    #[test]
    fn test_disabled_is_identity() {
        let img = gradient(16);
        let mut rng = ChaCha8Rng::seed_from_u64(0);
        assert_eq!(Augmenter::disabled().augment(&img, &mut rng), img);
    }

    #[test]
    fn test_augment_preserves_dimensions() {
        let img = gradient(32);
        let augmenter = Augmenter::new(AugmentationConfig::default());
        for seed in 0..5 {
            let mut rng = ChaCha8Rng::seed_from_u64(seed);
            assert_eq!(augmenter.augment(&img, &mut rng).dimensions(), (32, 32));
        }
    }

    #[test]
    fn test_item_rng_is_deterministic_and_varies_by_epoch() {
        let a: u64 = item_rng(42, 1, 7).gen();
        let b: u64 = item_rng(42, 1, 7).gen();
        let c: u64 = item_rng(42, 2, 7).gen();
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn test_reflect_index() {
        assert_eq!(reflect_index(-1, 4), 0);
        assert_eq!(reflect_index(-2, 4), 1);
        assert_eq!(reflect_index(4, 4), 3);
        assert_eq!(reflect_index(5, 4), 2);
        assert_eq!(reflect_index(2, 4), 2);
    }

    #[test]
    fn test_half_turn_rotation_reverses_pixels() {
        let img = gradient(8);
        let rotated = rotate(&img, PI);
        assert_eq!(rotated.get_pixel(0, 0), img.get_pixel(7, 7));
        assert_eq!(rotated.get_pixel(7, 0), img.get_pixel(0, 7));
    }

    #[test]
    fn test_contrast_keeps_channel_mean_and_clips() {
        let img = RgbImage::from_fn(2, 1, |x, _| if x == 0 { Rgb([0, 100, 250]) } else { Rgb([200, 100, 10]) });
        let out = adjust_contrast(&img, 2.0);
        // red: mean 100 -> 0 becomes -100 (clipped), 200 becomes 300 (clipped)
        assert_eq!(out.get_pixel(0, 0)[0], 0);
        assert_eq!(out.get_pixel(1, 0)[0], 255);
        // green is flat and stays put
        assert_eq!(out.get_pixel(0, 0)[1], 100);
    }

    #[test]
    fn test_zoom_identity_scale() {
        let img = gradient(8);
        assert_eq!(zoom(&img, 1.0), img);
    }

    #[test]
    fn test_to_chw_layout() {
        let img = RgbImage::from_fn(2, 1, |x, _| Rgb([if x == 0 { 255 } else { 0 }, 0, 51]));
        let data = to_chw(&img);
        assert_eq!(data.len(), 6);
        assert_eq!(data[0], 1.0);
        assert_eq!(data[1], 0.0);
        assert!((data[4] - 0.2).abs() < 1e-6);
    }

    #[test]
    fn test_validate_rejects_out_of_range() {
        let config = AugmentationConfig {
            rotation_factor: 1.5,
            ..Default::default()
        };
        assert!(config.validate().is_err());
        assert!(AugmentationConfig::default().validate().is_ok());
    }
}
