//! Settings Module
//!
//! OCR options read from a JSON settings document.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

pub const DEFAULT_LANGUAGES: &str = "ind+eng";
pub const DEFAULT_MIN_CONFIDENCE: f32 = 0.3;

/// OCR options supplied by the settings collaborator.
///
/// Field names follow the settings document (`useAsBackup`, `minConfidence`,
/// ...); missing fields take their defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct OcrSettings {
    pub enabled: bool,
    /// Run OCR when the remote analyzer fails.
    pub use_as_backup: bool,
    /// Tesseract language set, e.g. `ind+eng`, `ind` or `eng`.
    pub languages: String,
    pub enhanced_processing: bool,
    pub create_variations: bool,
    /// Minimum best-candidate confidence, 0..=1.
    pub min_confidence: f32,
}

impl Default for OcrSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            use_as_backup: true,
            languages: DEFAULT_LANGUAGES.into(),
            enhanced_processing: true,
            create_variations: true,
            min_confidence: DEFAULT_MIN_CONFIDENCE,
        }
    }
}

impl OcrSettings {
    pub fn load(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read OCR settings from {}", path.display()))?;
        serde_json::from_str(&contents)
            .with_context(|| format!("Invalid OCR settings in {}", path.display()))
    }

    /// Language set to hand to the engine, never empty.
    pub fn languages(&self) -> &str {
        let trimmed = self.languages.trim();
        if trimmed.is_empty() { DEFAULT_LANGUAGES } else { trimmed }
    }
}
