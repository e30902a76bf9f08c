//! OCR Module
//!
//! Runs a text-recognition engine over one or more renderings of a capture,
//! keeps the most confident reading and cleans up common OCR confusions.
//! The engine sits behind `OcrBackend` so the orchestration can be driven by
//! tesseract-rs in production and by scripted engines in tests.

use crate::error::OcrError;
use crate::input::EncodedImage;
use crate::preprocess;
use crate::settings::OcrSettings;
use crate::text_detect;
use crate::variations::{self, Variation, VariationKind};
use log::{debug, error, info, warn};
use regex::Regex;
use std::sync::LazyLock;

/// Returned instead of OCR output when the frame has no text-like structure.
pub const NO_TEXT_DETECTED: &str = "No text detected in the image.";
/// Returned when the best reading is below the configured confidence.
pub const INSUFFICIENT_CONFIDENCE: &str = "Could not recognize text with sufficient confidence.";

/// Tesseract page segmentation mode 3: fully automatic layout analysis.
pub const PSM_AUTO: u32 = 3;

/// Characters the enhanced engine may emit.
pub const CHAR_WHITELIST: &str = concat!(
    "abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789",
    ".,;:!?@#$%^&*()-_+=[]{}|\\/<>'\"`~ ",
    "áàäâãåéèëêíìïîóòöôõúùüûçñÁÀÄÂÃÅÉÈËÊÍÌÏÎÓÒÖÔÕÚÙÜÛÇÑ",
);

/// How an engine session should be configured.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineParams {
    pub languages: String,
    pub page_seg_mode: Option<u32>,
    pub lstm_only: bool,
    pub char_whitelist: Option<String>,
}

impl EngineParams {
    /// Automatic layout, LSTM recognition and a restricted character set.
    pub fn enhanced(languages: &str) -> Self {
        Self {
            languages: languages.to_string(),
            page_seg_mode: Some(PSM_AUTO),
            lstm_only: true,
            char_whitelist: Some(CHAR_WHITELIST.to_string()),
        }
    }

    /// Engine defaults apart from the language set.
    pub fn basic(languages: &str) -> Self {
        Self {
            languages: languages.to_string(),
            page_seg_mode: None,
            lstm_only: false,
            char_whitelist: None,
        }
    }
}

/// Text read from one image. `confidence` is on the engine's 0..=100 scale.
#[derive(Debug, Clone, PartialEq)]
pub struct Recognition {
    pub text: String,
    pub confidence: f32,
}

/// A live engine instance. Dropping it releases the engine.
pub trait OcrSession {
    fn recognize(&mut self, image: &EncodedImage) -> Result<Recognition, OcrError>;
}

/// Creates engine sessions.
pub trait OcrBackend {
    type Session: OcrSession;

    fn start(&self, params: &EngineParams) -> Result<Self::Session, OcrError>;
}

/// One OCR run over one rendering.
#[derive(Debug, Clone)]
pub struct OcrCandidate {
    pub variation: usize,
    pub kind: VariationKind,
    pub text: String,
    pub confidence: f32,
}

impl OcrCandidate {
    /// Confidence normalized to 0..=1.
    pub fn score(&self) -> f32 {
        self.confidence / 100.0
    }
}

/// Extracts text from a capture.
///
/// Blank frames short-circuit to [`NO_TEXT_DETECTED`]. If the enhanced path
/// fails, one plain pass over the original is attempted; when that fails too
/// the enhanced path's error is returned.
pub fn extract_text<B: OcrBackend>(
    image: &EncodedImage,
    settings: &OcrSettings,
    backend: &B,
) -> Result<String, OcrError> {
    if !text_detect::has_significant_text(image) {
        info!("Image does not appear to contain significant text");
        return Ok(NO_TEXT_DETECTED.to_string());
    }

    match extract_enhanced(image, settings, backend) {
        Ok(text) => Ok(text),
        Err(e) => {
            warn!("Enhanced OCR failed: {}. Retrying with default engine settings.", e);
            match extract_basic(image, settings, backend) {
                Ok(text) => Ok(text),
                Err(fallback_error) => {
                    error!("Fallback OCR failed as well: {}", fallback_error);
                    Err(e)
                }
            }
        }
    }
}

/// The images OCR will be run on, chosen from the settings.
pub fn working_set(image: &EncodedImage, settings: &OcrSettings) -> Vec<Variation> {
    if settings.create_variations {
        variations::generate_variations(image)
    } else if settings.enhanced_processing {
        vec![Variation {
            kind: VariationKind::Preprocessed,
            image: preprocess::preprocess(image),
        }]
    } else {
        vec![Variation {
            kind: VariationKind::Original,
            image: image.clone(),
        }]
    }
}

fn extract_enhanced<B: OcrBackend>(
    image: &EncodedImage,
    settings: &OcrSettings,
    backend: &B,
) -> Result<String, OcrError> {
    let images = working_set(image, settings);
    let languages = settings.languages();
    info!(
        "Starting OCR on {} image(s) using languages '{}'...",
        images.len(),
        languages
    );

    let mut session = backend.start(&EngineParams::enhanced(languages))?;
    let mut candidates = Vec::with_capacity(images.len());
    for (index, variation) in images.iter().enumerate() {
        debug!("Recognizing variation {}/{} ({})", index + 1, images.len(), variation.kind);
        let recognition = session.recognize(&variation.image)?;
        debug!(
            "Variation {} ({}) finished with confidence {:.2}",
            index + 1,
            variation.kind,
            recognition.confidence
        );
        candidates.push(OcrCandidate {
            variation: index,
            kind: variation.kind,
            text: recognition.text,
            confidence: recognition.confidence,
        });
    }
    drop(session);

    let best = best_candidate(candidates).ok_or(OcrError::NoImages)?;
    if best.score() < settings.min_confidence {
        info!(
            "Best OCR confidence {:.2} is below the minimum {:.2}",
            best.score(),
            settings.min_confidence
        );
        return Ok(INSUFFICIENT_CONFIDENCE.to_string());
    }

    info!(
        "OCR finished with confidence {:.2} from the {} variation",
        best.confidence, best.kind
    );
    Ok(correct_text(&best.text))
}

fn extract_basic<B: OcrBackend>(
    image: &EncodedImage,
    settings: &OcrSettings,
    backend: &B,
) -> Result<String, OcrError> {
    let mut session = backend.start(&EngineParams::basic(settings.languages()))?;
    let recognition = session.recognize(image)?;
    info!("Fallback OCR finished with confidence {:.2}", recognition.confidence);
    Ok(recognition.text)
}

/// Sorts candidates by confidence, highest first, and returns the top one.
/// Ties keep generation order.
pub fn best_candidate(mut candidates: Vec<OcrCandidate>) -> Option<OcrCandidate> {
    candidates.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));
    for (rank, candidate) in candidates.iter().enumerate() {
        debug!(
            "#{}: {} variation, confidence {:.2}",
            rank + 1,
            candidate.kind,
            candidate.confidence
        );
    }
    candidates.into_iter().next()
}

static TRAILING_L_AFTER_DIGIT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\d)l\b").expect("valid regex"));
static STANDALONE_O: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b[Oo]\b").expect("valid regex"));
static STANDALONE_I: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b[Ii]\b").expect("valid regex"));
static INLINE_WHITESPACE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^\S\r\n]+").expect("valid regex"));
static BLANK_LINES: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\n{3,}").expect("valid regex"));

/// Fixes digit/letter confusions and tidies whitespace.
pub fn correct_text(text: &str) -> String {
    let text = TRAILING_L_AFTER_DIGIT.replace_all(text, "${1}1");
    let text = STANDALONE_O.replace_all(&text, "0");
    let text = STANDALONE_I.replace_all(&text, "1");
    let text = INLINE_WHITESPACE.replace_all(&text, " ");
    BLANK_LINES.replace_all(&text, "\n\n").into_owned()
}

#[cfg(feature = "tesseract")]
pub use self::tesseract_engine::TesseractBackend;

#[cfg(feature = "tesseract")]
mod tesseract_engine {
    use super::{EngineParams, OcrBackend, OcrSession, Recognition};
    use crate::error::OcrError;
    use crate::input::EncodedImage;
    use log::debug;
    use std::path::PathBuf;
    use tesseract_rs::TesseractAPI;

    /// Gets the location where `tesseract-rs` caches its language data, unless
    /// `TESSDATA_PREFIX` points elsewhere.
    fn default_tessdata_dir() -> Result<PathBuf, OcrError> {
        let unavailable = |message: &str| OcrError::Init {
            languages: String::new(),
            message: message.to_string(),
        };
        if let Ok(prefix) = std::env::var("TESSDATA_PREFIX") {
            return Ok(PathBuf::from(prefix));
        }
        let base_path = if cfg!(target_os = "macos") {
            let home = std::env::var("HOME").map_err(|_| unavailable("HOME env var not set"))?;
            PathBuf::from(home).join("Library").join("Application Support")
        } else if cfg!(target_os = "linux") {
            let home = std::env::var("HOME").map_err(|_| unavailable("HOME env var not set"))?;
            PathBuf::from(home).join(".tesseract-rs")
        } else if cfg!(target_os = "windows") {
            let appdata =
                std::env::var("APPDATA").map_err(|_| unavailable("APPDATA env var not set"))?;
            PathBuf::from(appdata)
        } else {
            return Err(unavailable("unsupported operating system"));
        };
        Ok(base_path.join("tesseract-rs").join("tessdata"))
    }

    /// Creates tesseract-rs engine instances.
    #[derive(Debug, Clone)]
    pub struct TesseractBackend {
        tessdata_dir: PathBuf,
    }

    impl TesseractBackend {
        pub fn new() -> Result<Self, OcrError> {
            Ok(Self::with_tessdata_dir(default_tessdata_dir()?))
        }

        pub fn with_tessdata_dir(tessdata_dir: PathBuf) -> Self {
            Self { tessdata_dir }
        }
    }

    impl OcrBackend for TesseractBackend {
        type Session = TesseractSession;

        fn start(&self, params: &EngineParams) -> Result<TesseractSession, OcrError> {
            let init_error = |message: String| OcrError::Init {
                languages: params.languages.clone(),
                message,
            };
            let api = TesseractAPI::new();
            if params.lstm_only {
                // Engine mode is an init-time variable; older builds may refuse it.
                if let Err(e) = api.set_variable("tessedit_ocr_engine_mode", "1") {
                    debug!("Could not request LSTM-only engine mode: {}", e);
                }
            }
            let tessdata_dir = self
                .tessdata_dir
                .to_str()
                .ok_or_else(|| init_error("tessdata path is not valid UTF-8".into()))?;
            api.init(tessdata_dir, &params.languages)
                .map_err(|e| init_error(e.to_string()))?;
            if let Some(mode) = params.page_seg_mode {
                api.set_variable("tessedit_pageseg_mode", &mode.to_string())
                    .map_err(|e| init_error(e.to_string()))?;
            }
            if let Some(whitelist) = &params.char_whitelist {
                api.set_variable("tessedit_char_whitelist", whitelist)
                    .map_err(|e| init_error(e.to_string()))?;
            }
            debug!("Tesseract engine ready for '{}'", params.languages);
            Ok(TesseractSession { api })
        }
    }

    pub struct TesseractSession {
        api: TesseractAPI,
    }

    impl OcrSession for TesseractSession {
        fn recognize(&mut self, image: &EncodedImage) -> Result<Recognition, OcrError> {
            let frame = image.decode()?.to_rgb8();
            let (width, height) = frame.dimensions();
            self.api
                .set_image(
                    frame.as_raw(),
                    width as i32,
                    height as i32,
                    3, // bytes per pixel for RGB
                    (width * 3) as i32, // bytes per line
                )
                .map_err(|e| OcrError::SetImage(e.to_string()))?;
            self.api
                .recognize()
                .map_err(|e| OcrError::Recognize(e.to_string()))?;
            let text = self
                .api
                .get_utf8_text()
                .map_err(|e| OcrError::Recognize(e.to_string()))?;
            let confidence = self
                .api
                .mean_text_conf()
                .map_err(|e| OcrError::Recognize(e.to_string()))?;
            Ok(Recognition {
                text,
                confidence: confidence as f32,
            })
        }
    }

    impl Drop for TesseractSession {
        fn drop(&mut self) {
            debug!("Tesseract engine released");
        }
    }
}
