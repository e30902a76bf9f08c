//! CyberLens - Main Application Entrypoint
//!
//! Parses command-line arguments, initializes logging, builds the OCR
//! settings and dispatches the scan.

use clap::Parser;
use cyberlens::run;
use cyberlens::settings::OcrSettings;
use log::{error, info};
use std::path::PathBuf;

#[cfg(feature = "dhat-heap")]
#[global_allocator]
static ALLOC: dhat::Alloc = dhat::Alloc;

/// Scans screen captures for phishing, malware and financial-fraud content.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Image files to scan (PNG, JPEG, BMP, or a text file holding a data URL)
    #[arg(short, long, required = true, num_args = 1..)]
    input: Vec<PathBuf>,

    /// Directory to write the scan report to
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// JSON file with OCR settings (enabled, useAsBackup, languages, ...)
    #[arg(long)]
    settings: Option<PathBuf>,

    /// JSON keyword lexicon replacing the built-in one
    #[arg(long)]
    lexicon: Option<PathBuf>,

    /// OCR languages (e.g. "ind+eng", "eng")
    #[arg(short, long)]
    lang: Option<String>,

    /// Run OCR on a single preprocessed image instead of all variations
    #[arg(long)]
    no_variations: bool,

    /// Skip preprocessing and variations entirely
    #[arg(long)]
    basic: bool,

    /// Minimum OCR confidence to accept a reading (0.0 to 1.0)
    #[arg(long)]
    min_confidence: Option<f32>,

    /// Logging verbosity level
    #[arg(long, value_enum, default_value_t = LogLevel::Info)]
    log_level: LogLevel,
}

#[derive(clap::ValueEnum, Clone, Debug)]
enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
}

fn main() {
    #[cfg(feature = "dhat-heap")]
    let _profiler = dhat::Profiler::new_heap();

    let args = Args::parse();

    // 1. Initialize Logger
    let log_level = match args.log_level {
        LogLevel::Error => "error",
        LogLevel::Warn => "warn",
        LogLevel::Info => "info",
        LogLevel::Debug => "debug",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(log_level)).init();

    info!("Starting CyberLens...");

    // 2. Validate inputs
    if let Some(missing) = args.input.iter().find(|path| !path.exists()) {
        error!("Input file does not exist: {:?}", missing);
        std::process::exit(1);
    }
    if let Some(min) = args.min_confidence {
        if !(0.0..=1.0).contains(&min) {
            error!("--min-confidence must be between 0.0 and 1.0, got {}", min);
            std::process::exit(1);
        }
    }

    // 3. Build settings, command-line flags take precedence over the file
    let mut settings = match &args.settings {
        Some(path) => match OcrSettings::load(path) {
            Ok(settings) => settings,
            Err(e) => {
                error!("{:#}", e);
                std::process::exit(1);
            }
        },
        None => OcrSettings::default(),
    };
    if let Some(lang) = args.lang {
        settings.languages = lang;
    }
    if args.no_variations {
        settings.create_variations = false;
    }
    if args.basic {
        settings.enhanced_processing = false;
        settings.create_variations = false;
    }
    if let Some(min) = args.min_confidence {
        settings.min_confidence = min;
    }

    let config = cyberlens::Config {
        inputs: args.input,
        output_dir: args.output,
        settings,
        lexicon: args.lexicon,
    };

    // 4. Run the main application logic
    if let Err(e) = run(config) {
        error!("Application failed: {:#}", e);
        std::process::exit(2);
    }

    info!("Scan completed successfully.");
}
