//! Variation Generator
//!
//! Builds a fixed set of alternate renderings of one capture so OCR has more
//! than one chance at reading it.

use crate::input::EncodedImage;
use crate::preprocess::{self, HistogramStats, Kernel};
use image::{GrayImage, ImageFormat};
use log::{info, warn};
use std::fmt;

const EDGE_ENHANCE: Kernel = [[-1.0, -1.0, -1.0], [-1.0, 9.0, -1.0], [-1.0, -1.0, -1.0]];

/// Which rendering a `Variation` holds, in generation order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VariationKind {
    Original,
    Preprocessed,
    Normalized,
    Inverted,
    HighContrast,
    Sharpened,
    EdgeEnhanced,
    Bitonal,
    Dilated,
}

impl fmt::Display for VariationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            VariationKind::Original => "original",
            VariationKind::Preprocessed => "preprocessed",
            VariationKind::Normalized => "normalized",
            VariationKind::Inverted => "inverted",
            VariationKind::HighContrast => "high-contrast",
            VariationKind::Sharpened => "sharpened",
            VariationKind::EdgeEnhanced => "edge-enhanced",
            VariationKind::Bitonal => "bitonal",
            VariationKind::Dilated => "dilated",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone)]
pub struct Variation {
    pub kind: VariationKind,
    pub image: EncodedImage,
}

/// Produces the original plus eight processed renderings.
///
/// Never fails: if the source cannot be decoded or a rendering cannot be
/// encoded, only the original is returned.
pub fn generate_variations(image: &EncodedImage) -> Vec<Variation> {
    match try_generate(image) {
        Ok(variations) => {
            info!("Created {} image variations for OCR", variations.len());
            variations
        }
        Err(e) => {
            warn!("Failed to create image variations, using original only: {}", e);
            vec![Variation {
                kind: VariationKind::Original,
                image: image.clone(),
            }]
        }
    }
}

fn try_generate(image: &EncodedImage) -> Result<Vec<Variation>, image::ImageError> {
    let gray = preprocess::to_grayscale(&image.decode()?);
    let stats = HistogramStats::of(&gray);

    let renderings = [
        (VariationKind::Normalized, normalized(gray.clone())),
        (VariationKind::Inverted, preprocess::invert(gray.clone())),
        (VariationKind::HighContrast, high_contrast(gray.clone(), &stats)),
        (VariationKind::Sharpened, sharpened(gray.clone())),
        (VariationKind::EdgeEnhanced, preprocess::convolve(&gray, &EDGE_ENHANCE)),
        (VariationKind::Bitonal, bitonal(gray.clone(), &stats)),
        (VariationKind::Dilated, dilated(gray)),
    ];

    let mut variations = Vec::with_capacity(renderings.len() + 2);
    variations.push(Variation {
        kind: VariationKind::Original,
        image: image.clone(),
    });
    variations.push(Variation {
        kind: VariationKind::Preprocessed,
        image: preprocess::preprocess(image),
    });
    for (kind, bitmap) in renderings {
        variations.push(Variation {
            kind,
            image: EncodedImage::encode_gray(bitmap, Some(ImageFormat::Png))?,
        });
    }
    Ok(variations)
}

fn normalized(gray: GrayImage) -> GrayImage {
    preprocess::normalize(gray)
}

fn high_contrast(gray: GrayImage, stats: &HistogramStats) -> GrayImage {
    let amount = if stats.contrast_level < 50.0 { 0.6 } else { 0.4 };
    let delta = if stats.mean_brightness < 120.0 { 0.15 } else { -0.05 };
    preprocess::brightness(preprocess::contrast(gray, amount), delta)
}

fn sharpened(gray: GrayImage) -> GrayImage {
    let gray = preprocess::contrast(preprocess::normalize(gray), 0.2);
    preprocess::sharpen(gray, 1.0)
}

/// Threshold chosen from the mean brightness of the source.
pub fn bitonal_level(stats: &HistogramStats) -> u8 {
    if stats.mean_brightness < 100.0 {
        100
    } else if stats.mean_brightness > 200.0 {
        180
    } else {
        128
    }
}

fn bitonal(gray: GrayImage, stats: &HistogramStats) -> GrayImage {
    preprocess::threshold(gray, bitonal_level(stats))
}

/// Thickens thin or broken dark glyphs.
fn dilated(gray: GrayImage) -> GrayImage {
    preprocess::dilate_dark(preprocess::brightness(gray, 0.1), 1, 100)
}
