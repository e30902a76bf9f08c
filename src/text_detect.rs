//! Text Presence Detector
//!
//! A cheap edge-density check used to skip OCR on blank or featureless frames.

use crate::input::EncodedImage;
use crate::preprocess;
use image::GrayImage;
use log::{debug, warn};
use rayon::prelude::*;

const EDGE_DIFFERENCE: i16 = 30;
const MIN_EDGE_RATIO: f64 = 0.01;

/// Returns true when the image has enough edges to plausibly contain text.
///
/// Undecodable images count as textful so that OCR still gets a chance.
pub fn has_significant_text(image: &EncodedImage) -> bool {
    match image.decode() {
        Ok(decoded) => {
            let ratio = edge_ratio(&preprocess::to_grayscale(&decoded));
            debug!("Detected edge ratio: {:.4}", ratio);
            ratio > MIN_EDGE_RATIO
        }
        Err(e) => {
            warn!("Text detection failed, assuming text is present: {}", e);
            true
        }
    }
}

/// Share of pixels whose right or bottom neighbour differs by more than
/// the edge threshold. Only interior pixels are tested; the denominator is
/// the full pixel count.
pub fn edge_ratio(bitmap: &GrayImage) -> f64 {
    let (width, height) = (bitmap.width() as usize, bitmap.height() as usize);
    let total = width * height;
    if width < 3 || height < 3 {
        return 0.0;
    }
    let src = bitmap.as_raw();
    let edges: usize = (1..height - 1)
        .into_par_iter()
        .map(|y| {
            (1..width - 1)
                .filter(|&x| {
                    let center = src[y * width + x] as i16;
                    let right = src[y * width + x + 1] as i16;
                    let bottom = src[(y + 1) * width + x] as i16;
                    (center - right).abs() > EDGE_DIFFERENCE
                        || (center - bottom).abs() > EDGE_DIFFERENCE
                })
                .count()
        })
        .sum();
    edges as f64 / total as f64
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{ImageFormat, Luma};

    fn encode(bitmap: GrayImage) -> EncodedImage {
        EncodedImage::encode_gray(bitmap, Some(ImageFormat::Png)).unwrap()
    }

    #[test]
    fn blank_page_has_no_text() {
        let blank = GrayImage::from_pixel(100, 100, Luma([255]));
        assert_eq!(edge_ratio(&blank), 0.0);
        assert!(!has_significant_text(&encode(blank)));
    }

    #[test]
    fn soft_gradient_has_no_text() {
        let gradient = GrayImage::from_fn(100, 100, |x, _| Luma([(x * 2) as u8]));
        assert!(!has_significant_text(&encode(gradient)));
    }

    #[test]
    fn striped_page_has_text() {
        let page = GrayImage::from_fn(100, 100, |x, y| {
            if (20..40).contains(&y) && x % 5 == 0 { Luma([0]) } else { Luma([255]) }
        });
        assert!(edge_ratio(&page) > 0.01);
        assert!(has_significant_text(&encode(page)));
    }

    #[test]
    fn undecodable_image_fails_open() {
        assert!(has_significant_text(&EncodedImage::from_bytes(b"garbage".to_vec())));
    }

    #[test]
    fn tiny_images_have_no_interior() {
        assert_eq!(edge_ratio(&GrayImage::from_pixel(2, 2, Luma([0]))), 0.0);
    }
}
