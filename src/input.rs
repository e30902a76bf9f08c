//! Image Input Module
//!
//! Converts caller payloads (raw bytes, base64 strings or data URLs) into an
//! `EncodedImage`, the unit every pipeline stage exchanges.

use crate::error::InputError;
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use image::{DynamicImage, GrayImage, ImageFormat, ImageOutputFormat};
use std::fs;
use std::io::Cursor;
use std::path::Path;

const DATA_URL_MARKER: &str = "data:image";
const JPEG_QUALITY: u8 = 90;

/// An image still in its container format, together with the sniffed format.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedImage {
    data: Vec<u8>,
    format: Option<ImageFormat>,
}

impl EncodedImage {
    pub fn from_bytes(data: Vec<u8>) -> Self {
        let format = image::guess_format(&data).ok();
        Self { data, format }
    }

    /// Decodes a base64 payload, with or without a `data:image/<fmt>;base64,`
    /// header.
    pub fn from_base64(payload: &str) -> Result<Self, InputError> {
        let (body, declared) = split_data_url(payload.trim());
        if body.is_empty() {
            return Err(InputError::Empty);
        }
        let compact: String = body.chars().filter(|c| !c.is_ascii_whitespace()).collect();
        let data = STANDARD.decode(compact.as_bytes())?;
        let format = image::guess_format(&data)
            .ok()
            .or_else(|| declared.and_then(ImageFormat::from_extension));
        Ok(Self { data, format })
    }

    /// Reads an image file. Files holding a base64 data URL are decoded as such.
    pub fn open(path: &Path) -> Result<Self, InputError> {
        let data = fs::read(path).map_err(|source| InputError::Io {
            path: path.display().to_string(),
            source,
        })?;
        if data.is_empty() {
            return Err(InputError::Empty);
        }
        if data.starts_with(DATA_URL_MARKER.as_bytes()) {
            return Self::from_base64(&String::from_utf8_lossy(&data));
        }
        Ok(Self::from_bytes(data))
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn format(&self) -> Option<ImageFormat> {
        self.format
    }

    pub fn decode(&self) -> Result<DynamicImage, image::ImageError> {
        match self.format {
            Some(format) => image::load_from_memory_with_format(&self.data, format),
            None => image::load_from_memory(&self.data),
        }
    }

    /// Encodes a grayscale bitmap into `format`, falling back to PNG for
    /// unknown or unsupported containers.
    pub fn encode_gray(
        bitmap: GrayImage,
        format: Option<ImageFormat>,
    ) -> Result<Self, image::ImageError> {
        let (output, format) = match format {
            Some(ImageFormat::Jpeg) => (ImageOutputFormat::Jpeg(JPEG_QUALITY), ImageFormat::Jpeg),
            Some(ImageFormat::Bmp) => (ImageOutputFormat::Bmp, ImageFormat::Bmp),
            _ => (ImageOutputFormat::Png, ImageFormat::Png),
        };
        let mut data = Vec::new();
        DynamicImage::ImageLuma8(bitmap).write_to(&mut Cursor::new(&mut data), output)?;
        Ok(Self {
            data,
            format: Some(format),
        })
    }
}

/// Splits a data URL into its payload and declared subtype (`png`, `jpeg`...).
/// Plain payloads come back untouched with no declared format.
pub fn split_data_url(payload: &str) -> (&str, Option<&str>) {
    if !payload.starts_with(DATA_URL_MARKER) {
        return (payload, None);
    }
    let Some((header, body)) = payload.split_once(',') else {
        return ("", None);
    };
    let declared = header
        .strip_prefix("data:image/")
        .and_then(|rest| rest.split(';').next())
        .filter(|subtype| !subtype.is_empty());
    (body, declared)
}
