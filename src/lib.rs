//! CyberLens - Core Library
//!
//! Orchestrates the scan pipeline for screen captures: image preprocessing,
//! OCR over a set of renderings, and keyword-based threat classification,
//! with results cached by image fingerprint.

use anyhow::{Context, Result};
use indicatif::{ProgressBar, ProgressStyle};
use log::{error, info, warn};
use serde::Serialize;
use std::fs;
use std::path::PathBuf;
use std::time::Instant;

pub mod cache;
pub mod classifier;
pub mod error;
pub mod input;
pub mod ocr;
pub mod preprocess;
pub mod remote;
pub mod result;
pub mod scanner;
pub mod settings;
pub mod text_detect;
pub mod variations;

use crate::classifier::{Lexicon, ThreatClassifier};
use crate::error::ScanError;
use crate::input::EncodedImage;
use crate::ocr::OcrBackend;
use crate::result::AnalysisResult;
use crate::scanner::Scanner;
use crate::settings::OcrSettings;

/// Application configuration structure.
#[derive(Debug)]
pub struct Config {
    pub inputs: Vec<PathBuf>,
    /// When set, a report is written to `<output_dir>/analysis/scan_report.json`.
    pub output_dir: Option<PathBuf>,
    pub settings: OcrSettings,
    /// Replaces the built-in keyword lexicon.
    pub lexicon: Option<PathBuf>,
}

/// Outcome of one input in a batch.
#[derive(Debug, Serialize)]
pub struct ReportEntry {
    pub input: PathBuf,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<AnalysisResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ScanReport {
    pub scanned: usize,
    pub failed: usize,
    pub lexicon_version: String,
    pub entries: Vec<ReportEntry>,
}

/// Scans every input with the Tesseract engine.
#[cfg(feature = "tesseract")]
pub fn run(config: Config) -> Result<ScanReport> {
    let backend = ocr::TesseractBackend::new().context("Failed to locate Tesseract language data")?;
    run_with_backend(config, backend)
}

#[cfg(not(feature = "tesseract"))]
pub fn run(_config: Config) -> Result<ScanReport> {
    anyhow::bail!("no OCR engine available: built without the `tesseract` feature")
}

/// Scans every input with the given OCR backend, printing one JSON result per
/// input. Fails only when no input could be analyzed.
pub fn run_with_backend<B: OcrBackend>(config: Config, backend: B) -> Result<ScanReport> {
    info!("Initializing scan with config: {:?}", config);
    let start_time = Instant::now();

    let lexicon = match &config.lexicon {
        Some(path) => Lexicon::load(path)
            .with_context(|| format!("Failed to load lexicon from {:?}", path))?,
        None => Lexicon::builtin(),
    };
    let lexicon_version = lexicon.version.clone();
    let scanner = Scanner::new(config.settings.clone(), backend)
        .with_classifier(ThreatClassifier::new(lexicon));

    let pb = ProgressBar::new(config.inputs.len() as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} Scanning images [{bar:40.cyan/blue}] {pos}/{len} [{elapsed_precise}]")
            .context("Invalid progress bar template")?
            .progress_chars("##-"),
    );

    let mut entries = Vec::with_capacity(config.inputs.len());
    for path in &config.inputs {
        let outcome = EncodedImage::open(path)
            .map_err(ScanError::from)
            .and_then(|image| scanner.scan(&image));
        let entry = match outcome {
            Ok(result) => {
                let json = serde_json::to_string_pretty(&result)?;
                pb.suspend(|| println!("{}", json));
                ReportEntry {
                    input: path.clone(),
                    result: Some(result),
                    error: None,
                }
            }
            Err(e) => {
                error!("Failed to scan {:?}: {}", path, e);
                ReportEntry {
                    input: path.clone(),
                    result: None,
                    error: Some(e.to_string()),
                }
            }
        };
        entries.push(entry);
        pb.inc(1);
    }
    pb.finish_with_message(format!("Scanned {} images", entries.len()));

    let failed = entries.iter().filter(|entry| entry.error.is_some()).count();
    let report = ScanReport {
        scanned: entries.len() - failed,
        failed,
        lexicon_version,
        entries,
    };

    if let Some(output_dir) = &config.output_dir {
        let stats_dir = output_dir.join("analysis");
        fs::create_dir_all(&stats_dir).context("Failed to create analysis directory")?;
        let report_path = stats_dir.join("scan_report.json");
        fs::write(&report_path, serde_json::to_string_pretty(&report)?)
            .with_context(|| format!("Failed to write report to {:?}", report_path))?;
        info!("Wrote scan report to {:?}", report_path);
    }

    info!(
        "Scan complete in {:.2?}. Scanned {}, failed {}.",
        start_time.elapsed(),
        report.scanned,
        report.failed
    );
    if report.failed > 0 && report.scanned == 0 {
        anyhow::bail!("None of the {} input(s) could be analyzed", report.failed);
    }
    if report.failed > 0 {
        warn!("{} input(s) could not be analyzed", report.failed);
    }
    Ok(report)
}
