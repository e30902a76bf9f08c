//! Image Preprocessing Module
//!
//! Deterministic pixel transforms that make captured frames easier to read
//! for the OCR engine. Every transform takes an owned `GrayImage` and returns
//! the transformed bitmap, so stages can be chained without shared state.

use crate::input::EncodedImage;
use image::imageops::FilterType;
use image::{DynamicImage, GrayImage};
use log::{debug, info, warn};
use rayon::prelude::*;

/// Largest width or height handed to OCR. Bigger captures are downscaled.
pub const MAX_DIMENSION: u32 = 1500;

const DARK_MEAN: f64 = 100.0;
const BRIGHT_MEAN: f64 = 200.0;
const DARK_BRIGHTNESS_BOOST: f32 = 0.15;
const BRIGHT_BRIGHTNESS_CUT: f32 = -0.1;
const LOW_CONTRAST: f64 = 50.0;
const ADAPTIVE_CONTRAST: f64 = 40.0;
const ADAPTIVE_BLOCK_SIZE: u32 = 15;
const ADAPTIVE_OFFSET: f64 = 5.0;
const SHARPEN_AMOUNT: f32 = 0.5;

/// 3x3 convolution kernel, row major.
pub type Kernel = [[f32; 3]; 3];

/// Read-only brightness summary of a grayscale bitmap.
#[derive(Debug, Clone)]
pub struct HistogramStats {
    pub mean_brightness: f64,
    /// Standard deviation of brightness.
    pub contrast_level: f64,
    pub histogram: [u64; 256],
    pub total_pixels: u64,
}

impl HistogramStats {
    pub fn of(bitmap: &GrayImage) -> Self {
        let mut histogram = [0u64; 256];
        for &value in bitmap.as_raw() {
            histogram[value as usize] += 1;
        }
        let total_pixels = bitmap.as_raw().len() as u64;
        if total_pixels == 0 {
            return Self {
                mean_brightness: 0.0,
                contrast_level: 0.0,
                histogram,
                total_pixels,
            };
        }

        let total = total_pixels as f64;
        let sum: f64 = histogram
            .iter()
            .enumerate()
            .map(|(value, &count)| value as f64 * count as f64)
            .sum();
        let mean_brightness = sum / total;
        let variance: f64 = histogram
            .iter()
            .enumerate()
            .map(|(value, &count)| (value as f64 - mean_brightness).powi(2) * count as f64)
            .sum::<f64>()
            / total;

        Self {
            mean_brightness,
            contrast_level: variance.sqrt(),
            histogram,
            total_pixels,
        }
    }

    /// Fraction of pixels brighter than mid-gray (128).
    pub fn bright_ratio(&self) -> f64 {
        if self.total_pixels == 0 {
            return 0.0;
        }
        let bright: u64 = self.histogram[129..].iter().sum();
        bright as f64 / self.total_pixels as f64
    }
}

/// Runs the full enhancement chain on an encoded image and re-encodes the
/// result in the source container format.
///
/// Never fails: on any error the input is returned unchanged.
pub fn preprocess(image: &EncodedImage) -> EncodedImage {
    match try_preprocess(image) {
        Ok(processed) => processed,
        Err(e) => {
            warn!("Image preprocessing failed, using original image: {}", e);
            image.clone()
        }
    }
}

fn try_preprocess(image: &EncodedImage) -> Result<EncodedImage, image::ImageError> {
    let decoded = fit_within(image.decode()?, MAX_DIMENSION);
    let bitmap = enhance(to_grayscale(&decoded));
    let processed = EncodedImage::encode_gray(bitmap, image.format())?;
    debug!("Image preprocessing finished ({} bytes)", processed.data().len());
    Ok(processed)
}

/// Brightness/contrast correction, normalization, binarization and
/// sharpening of an already grayscale bitmap.
pub fn enhance(bitmap: GrayImage) -> GrayImage {
    let stats = HistogramStats::of(&bitmap);
    info!(
        "Preprocessing {}x{} image: mean brightness {:.1}, contrast {:.1}",
        bitmap.width(),
        bitmap.height(),
        stats.mean_brightness,
        stats.contrast_level
    );

    let bitmap = if stats.mean_brightness < DARK_MEAN {
        brightness(bitmap, DARK_BRIGHTNESS_BOOST)
    } else if stats.mean_brightness > BRIGHT_MEAN {
        brightness(bitmap, BRIGHT_BRIGHTNESS_CUT)
    } else {
        bitmap
    };

    let boost = if stats.contrast_level < LOW_CONTRAST { 0.3 } else { 0.2 };
    let bitmap = normalize(contrast(bitmap, boost));

    let bitmap = if stats.contrast_level < ADAPTIVE_CONTRAST {
        debug!("Low contrast, using adaptive threshold");
        adaptive_threshold(bitmap, ADAPTIVE_BLOCK_SIZE, ADAPTIVE_OFFSET)
    } else {
        let ratio = HistogramStats::of(&bitmap).bright_ratio();
        let level = threshold_for_bright_ratio(ratio);
        debug!("Bright pixel ratio {:.2}, global threshold {}", ratio, level);
        threshold(bitmap, level)
    };

    sharpen(bitmap, SHARPEN_AMOUNT)
}

/// Global threshold picked from the share of bright pixels.
pub fn threshold_for_bright_ratio(ratio: f64) -> u8 {
    if ratio > 0.75 {
        160
    } else if ratio < 0.25 {
        100
    } else {
        128
    }
}

/// Downscales so both sides fit in `max_side`, keeping the aspect ratio.
/// Smaller images are returned untouched.
pub fn fit_within(image: DynamicImage, max_side: u32) -> DynamicImage {
    if image.width() <= max_side && image.height() <= max_side {
        return image;
    }
    debug!(
        "Downscaling {}x{} image to fit {}x{}",
        image.width(),
        image.height(),
        max_side,
        max_side
    );
    image.resize(max_side, max_side, FilterType::Triangle)
}

pub fn to_grayscale(image: &DynamicImage) -> GrayImage {
    image.to_luma8()
}

/// Shifts brightness by `delta` in [-1, 1]. Positive values move pixels
/// toward white, negative values scale them toward black.
pub fn brightness(bitmap: GrayImage, delta: f32) -> GrayImage {
    let delta = delta.clamp(-1.0, 1.0);
    map_levels(bitmap, |value| {
        let value = value as f32;
        if delta < 0.0 {
            value * (1.0 + delta)
        } else {
            value + (255.0 - value) * delta
        }
    })
}

/// Scales distance from mid-gray by `(1 + amount) / (1 - amount)`.
pub fn contrast(bitmap: GrayImage, amount: f32) -> GrayImage {
    let amount = amount.clamp(-0.99, 0.99);
    let factor = (1.0 + amount) / (1.0 - amount);
    map_levels(bitmap, |value| (factor * (value as f32 - 127.0) + 127.0).floor())
}

/// Stretches intensities so the darkest pixel becomes 0 and the brightest 255.
pub fn normalize(bitmap: GrayImage) -> GrayImage {
    let (Some(&min), Some(&max)) = (bitmap.as_raw().iter().min(), bitmap.as_raw().iter().max())
    else {
        return bitmap;
    };
    if min == max {
        return bitmap;
    }
    let span = (max - min) as f32;
    map_levels(bitmap, |value| (value.saturating_sub(min)) as f32 * 255.0 / span)
}

pub fn invert(bitmap: GrayImage) -> GrayImage {
    map_levels(bitmap, |value| 255.0 - value as f32)
}

/// Pixels strictly above `level` become white, the rest black.
pub fn threshold(bitmap: GrayImage, level: u8) -> GrayImage {
    map_levels(bitmap, |value| if value > level { 255.0 } else { 0.0 })
}

/// Local-mean thresholding: a pixel is white when it is brighter than the
/// mean of its `block_size` neighbourhood minus `offset`.
pub fn adaptive_threshold(bitmap: GrayImage, block_size: u32, offset: f64) -> GrayImage {
    let (width, height) = bitmap.dimensions();
    if width == 0 || height == 0 {
        return bitmap;
    }
    let (w, h) = (width as usize, height as usize);
    let half = (block_size / 2) as usize;
    let integral = integral_image(&bitmap);
    let stride = w + 1;
    let src = bitmap.as_raw();

    let mut out = GrayImage::new(width, height);
    let buf: &mut [u8] = &mut out;
    buf.par_chunks_mut(w).enumerate().for_each(|(y, row)| {
        let y0 = y.saturating_sub(half);
        let y1 = (y + half + 1).min(h);
        for (x, pixel) in row.iter_mut().enumerate() {
            let x0 = x.saturating_sub(half);
            let x1 = (x + half + 1).min(w);
            let sum = integral[y1 * stride + x1] + integral[y0 * stride + x0]
                - integral[y0 * stride + x1]
                - integral[y1 * stride + x0];
            let count = ((y1 - y0) * (x1 - x0)) as f64;
            let local_threshold = sum as f64 / count - offset;
            *pixel = if src[y * w + x] as f64 > local_threshold { 255 } else { 0 };
        }
    });
    out
}

/// Unsharp-style sharpening with a cross-shaped kernel of strength `amount`.
pub fn sharpen(bitmap: GrayImage, amount: f32) -> GrayImage {
    let a = amount.max(0.0);
    convolve(&bitmap, &[[0.0, -a, 0.0], [-a, 1.0 + 4.0 * a, -a], [0.0, -a, 0.0]])
}

/// Applies a 3x3 kernel, replicating edge pixels and clamping to [0, 255].
pub fn convolve(bitmap: &GrayImage, kernel: &Kernel) -> GrayImage {
    let (width, height) = bitmap.dimensions();
    let mut out = GrayImage::new(width, height);
    if width == 0 || height == 0 {
        return out;
    }
    let (w, h) = (width as usize, height as usize);
    let src = bitmap.as_raw();

    let buf: &mut [u8] = &mut out;
    buf.par_chunks_mut(w).enumerate().for_each(|(y, row)| {
        for (x, pixel) in row.iter_mut().enumerate() {
            let mut acc = 0.0f32;
            for (ky, kernel_row) in kernel.iter().enumerate() {
                let sy = (y + ky).saturating_sub(1).min(h - 1);
                for (kx, weight) in kernel_row.iter().enumerate() {
                    let sx = (x + kx).saturating_sub(1).min(w - 1);
                    acc += weight * src[sy * w + sx] as f32;
                }
            }
            *pixel = acc.round().clamp(0.0, 255.0) as u8;
        }
    });
    out
}

/// Grows dark strokes: every pixel takes the darkest value below
/// `dark_below` found in its `(2 * radius + 1)` square neighbourhood, so thin
/// or broken glyphs thicken. Pixels with no dark neighbour are left as-is.
pub fn dilate_dark(bitmap: GrayImage, radius: u32, dark_below: u8) -> GrayImage {
    let (width, height) = bitmap.dimensions();
    if width == 0 || height == 0 {
        return bitmap;
    }
    let (w, h) = (width as usize, height as usize);
    let r = radius as usize;
    let src = bitmap.as_raw();

    let mut out = GrayImage::new(width, height);
    let buf: &mut [u8] = &mut out;
    buf.par_chunks_mut(w).enumerate().for_each(|(y, row)| {
        let (y0, y1) = (y.saturating_sub(r), (y + r).min(h - 1));
        for (x, pixel) in row.iter_mut().enumerate() {
            let (x0, x1) = (x.saturating_sub(r), (x + r).min(w - 1));
            let darkest = (y0..=y1)
                .flat_map(|ny| src[ny * w + x0..=ny * w + x1].iter().copied())
                .min()
                .unwrap_or(u8::MAX);
            let value = src[y * w + x];
            *pixel = if darkest < dark_below { darkest.min(value) } else { value };
        }
    });
    out
}

/// Applies a per-level mapping through a 256-entry lookup table.
fn map_levels(mut bitmap: GrayImage, f: impl Fn(u8) -> f32) -> GrayImage {
    let mut table = [0u8; 256];
    for (level, slot) in table.iter_mut().enumerate() {
        *slot = f(level as u8).round().clamp(0.0, 255.0) as u8;
    }
    for pixel in bitmap.pixels_mut() {
        pixel[0] = table[pixel[0] as usize];
    }
    bitmap
}

/// Summed-area table with a zero first row and column.
fn integral_image(bitmap: &GrayImage) -> Vec<u64> {
    let (w, h) = (bitmap.width() as usize, bitmap.height() as usize);
    let stride = w + 1;
    let src = bitmap.as_raw();
    let mut integral = vec![0u64; stride * (h + 1)];
    for y in 0..h {
        let mut row_sum = 0u64;
        for x in 0..w {
            row_sum += src[y * w + x] as u64;
            integral[(y + 1) * stride + x + 1] = integral[y * stride + x + 1] + row_sum;
        }
    }
    integral
}
