use cyberlens::classifier::ThreatClassifier;
use cyberlens::error::OcrError;
use cyberlens::input::EncodedImage;
use cyberlens::ocr::{EngineParams, INSUFFICIENT_CONFIDENCE, NO_TEXT_DETECTED, OcrBackend, OcrSession, Recognition};
use cyberlens::result::RiskLevel;
use cyberlens::scanner::Scanner;
use cyberlens::settings::OcrSettings;
use cyberlens::{Config, run_with_backend};
use image::{GrayImage, ImageFormat, Luma};
use std::cell::Cell;
use std::fs;
use std::rc::Rc;

/// Engine that "reads" the same text from every image it is shown.
struct PageBackend {
    text: &'static str,
    confidence: f32,
    starts: Rc<Cell<usize>>,
}

impl PageBackend {
    fn reading(text: &'static str) -> Self {
        Self {
            text,
            confidence: 88.0,
            starts: Rc::default(),
        }
    }
}

struct PageSession {
    text: &'static str,
    confidence: f32,
}

impl OcrBackend for PageBackend {
    type Session = PageSession;

    fn start(&self, _params: &EngineParams) -> Result<PageSession, OcrError> {
        self.starts.set(self.starts.get() + 1);
        Ok(PageSession {
            text: self.text,
            confidence: self.confidence,
        })
    }
}

impl OcrSession for PageSession {
    fn recognize(&mut self, image: &EncodedImage) -> Result<Recognition, OcrError> {
        image.decode()?;
        Ok(Recognition {
            text: self.text.to_string(),
            confidence: self.confidence,
        })
    }
}

/// A white page with a band of dark glyph-like strokes.
fn text_page() -> EncodedImage {
    let bitmap = GrayImage::from_fn(120, 80, |x, y| {
        if (30..50).contains(&y) && x % 5 < 2 { Luma([20]) } else { Luma([245]) }
    });
    EncodedImage::encode_gray(bitmap, Some(ImageFormat::Png)).unwrap()
}

fn blank_page() -> EncodedImage {
    EncodedImage::encode_gray(GrayImage::from_pixel(120, 80, Luma([255])), Some(ImageFormat::Png))
        .unwrap()
}

fn scan(text: &'static str) -> cyberlens::result::AnalysisResult {
    Scanner::new(OcrSettings::default(), PageBackend::reading(text))
        .scan(&text_page())
        .unwrap()
}

#[test]
fn blank_capture_is_safe_without_running_ocr() {
    let backend = PageBackend::reading("should never be read");
    let starts = Rc::clone(&backend.starts);
    let result = Scanner::new(OcrSettings::default(), backend)
        .scan(&blank_page())
        .unwrap();

    assert_eq!(result.risk_level, RiskLevel::Safe);
    assert_eq!(result.confidence_score, 0.95);
    assert_eq!(result.raw_analysis.as_deref(), Some(NO_TEXT_DETECTED));
    assert_eq!(starts.get(), 0);
}

#[test]
fn phishing_capture_is_high_risk() {
    let result = scan("Please verify your password at secure-login.example");
    assert_eq!(result.risk_level, RiskLevel::High);
    assert_eq!(result.confidence_score, 0.85);
    assert_eq!(result.threats[0].kind, "phishing");
}

#[test]
fn malware_prompt_is_medium_risk() {
    let result = scan("Download update.exe to activate");
    assert_eq!(result.risk_level, RiskLevel::Medium);
    assert_eq!(result.confidence_score, 0.70);
}

#[test]
fn bank_transfer_is_low_risk() {
    let result = scan("transfer to BCA account 123456");
    assert_eq!(result.risk_level, RiskLevel::Low);
    assert_eq!(result.confidence_score, 0.60);
    assert_eq!(
        result.details.as_ref().map(|details| details[1].as_str()),
        Some("transfer to BCA account 123456")
    );
}

#[test]
fn repeated_capture_returns_cached_result() {
    let backend = PageBackend::reading("Verify your account password now, click here");
    let starts = Rc::clone(&backend.starts);
    let scanner = Scanner::new(OcrSettings::default(), backend);
    let page = text_page();

    let first = scanner.scan(&page).unwrap();
    let second = scanner.scan(&page).unwrap();
    assert_eq!(first, second);
    assert_eq!(first.timestamp, second.timestamp);
    assert_eq!(starts.get(), 1);
}

#[test]
fn unreadable_text_yields_confidence_sentinel() {
    let backend = PageBackend {
        text: "password click here",
        confidence: 10.0,
        starts: Rc::default(),
    };
    let result = Scanner::new(OcrSettings::default(), backend)
        .scan(&text_page())
        .unwrap();
    assert_eq!(result.risk_level, RiskLevel::Safe);
    assert_eq!(result.raw_analysis.as_deref(), Some(INSUFFICIENT_CONFIDENCE));
}

#[test]
fn custom_classifier_is_used_by_the_scanner() {
    let lexicon = cyberlens::classifier::Lexicon::from_json(
        r#"{"version": "test", "phishing": ["seed phrase"], "malware": [], "financial": ["usdt"]}"#,
    )
    .unwrap();
    let result = Scanner::new(
        OcrSettings::default(),
        PageBackend::reading("Enter your seed phrase to claim USDT"),
    )
    .with_classifier(ThreatClassifier::new(lexicon))
    .scan(&text_page())
    .unwrap();
    assert_eq!(result.risk_level, RiskLevel::High);
}

#[test]
fn batch_run_writes_report() {
    let dir = tempfile::tempdir().unwrap();
    let good = dir.path().join("capture.png");
    let empty = dir.path().join("empty.png");
    fs::write(&good, text_page().data()).unwrap();
    fs::write(&empty, b"").unwrap();
    let output_dir = dir.path().join("out");

    let config = Config {
        inputs: vec![good, empty],
        output_dir: Some(output_dir.clone()),
        settings: OcrSettings::default(),
        lexicon: None,
    };
    let report = run_with_backend(config, PageBackend::reading("Download update.exe to activate"))
        .unwrap();
    assert_eq!(report.scanned, 1);
    assert_eq!(report.failed, 1);

    let written = fs::read_to_string(output_dir.join("analysis").join("scan_report.json")).unwrap();
    let json: serde_json::Value = serde_json::from_str(&written).unwrap();
    assert_eq!(json["entries"][0]["result"]["riskLevel"], "medium");
    assert_eq!(json["entries"][1]["error"], "image payload is empty");
    assert_eq!(json["lexicon_version"], "2024.1");
}

#[test]
fn batch_run_fails_when_nothing_could_be_scanned() {
    let dir = tempfile::tempdir().unwrap();
    let config = Config {
        inputs: vec![dir.path().join("missing.png")],
        output_dir: None,
        settings: OcrSettings::default(),
        lexicon: None,
    };
    assert!(run_with_backend(config, PageBackend::reading("hello")).is_err());
}
