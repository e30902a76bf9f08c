//! Error types shared across the scan pipeline.
//!
//! Only the OCR orchestrator and the scanner surface errors to callers. The
//! image stages are fail-open and never return these.

use thiserror::Error;

/// Failures while turning caller input into an encoded image.
#[derive(Debug, Error)]
pub enum InputError {
    #[error("image payload is empty")]
    Empty,
    #[error("invalid base64 image payload: {0}")]
    Base64(#[from] base64::DecodeError),
    #[error("failed to read image file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

/// Failures raised by an OCR backend or the orchestrator.
#[derive(Debug, Error)]
pub enum OcrError {
    #[error("failed to initialize OCR engine for languages '{languages}': {message}")]
    Init { languages: String, message: String },
    #[error("failed to decode image for OCR: {0}")]
    Decode(#[from] image::ImageError),
    #[error("OCR engine rejected image: {0}")]
    SetImage(String),
    #[error("text recognition failed: {0}")]
    Recognize(String),
    #[error("OCR working set is empty")]
    NoImages,
}

/// Failures while loading keyword lexicons.
#[derive(Debug, Error)]
pub enum LexiconError {
    #[error("failed to read lexicon file: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid lexicon document: {0}")]
    Json(#[from] serde_json::Error),
}

/// Failures reported by a remote vision-analysis service.
#[derive(Debug, Error)]
pub enum RemoteError {
    #[error("remote request failed: {0}")]
    Request(String),
    #[error("remote response was empty")]
    EmptyResponse,
}

/// Terminal failures of a full scan.
#[derive(Debug, Error)]
pub enum ScanError {
    #[error(transparent)]
    Input(#[from] InputError),
    #[error("OCR analysis failed: {0}")]
    Ocr(#[from] OcrError),
    #[error("remote analysis failed: {0}")]
    Remote(#[from] RemoteError),
    #[error("analysis failed - remote: {remote}. OCR: {ocr}")]
    AllBackendsFailed { remote: RemoteError, ocr: OcrError },
    #[error("no analysis backend available: OCR is disabled and no remote analyzer is configured")]
    NoBackend,
}
