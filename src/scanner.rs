//! Scan entry point: cache, remote analyzer, then OCR.

use crate::cache::{self, AnalysisCache, Clock, SystemClock};
use crate::classifier::ThreatClassifier;
use crate::error::{InputError, OcrError, RemoteError, ScanError};
use crate::input::EncodedImage;
use crate::ocr::{self, OcrBackend};
use crate::remote::{RemoteAnalyzer, ResponseParser, SectionParser};
use crate::result::AnalysisResult;
use crate::settings::OcrSettings;
use log::{info, warn};

/// Prepended to the summary of results produced by the OCR fallback.
pub const OCR_SUMMARY_PREFIX: &str = "[OCR Analysis] ";

pub struct Scanner<B: OcrBackend, C: Clock = SystemClock> {
    settings: OcrSettings,
    backend: B,
    classifier: ThreatClassifier,
    cache: AnalysisCache<C>,
    remote: Option<Box<dyn RemoteAnalyzer + Send + Sync>>,
    parser: Box<dyn ResponseParser + Send + Sync>,
}

impl<B: OcrBackend> Scanner<B, SystemClock> {
    pub fn new(settings: OcrSettings, backend: B) -> Self {
        Self::with_clock(settings, backend, SystemClock)
    }
}

impl<B: OcrBackend, C: Clock> Scanner<B, C> {
    pub fn with_clock(settings: OcrSettings, backend: B, clock: C) -> Self {
        Self {
            settings,
            backend,
            classifier: ThreatClassifier::default(),
            cache: AnalysisCache::with_clock(clock),
            remote: None,
            parser: Box::new(SectionParser),
        }
    }

    pub fn with_classifier(mut self, classifier: ThreatClassifier) -> Self {
        self.classifier = classifier;
        self
    }

    pub fn with_remote(mut self, remote: Box<dyn RemoteAnalyzer + Send + Sync>) -> Self {
        self.remote = Some(remote);
        self
    }

    pub fn with_parser(mut self, parser: Box<dyn ResponseParser + Send + Sync>) -> Self {
        self.parser = parser;
        self
    }

    pub fn settings(&self) -> &OcrSettings {
        &self.settings
    }

    pub fn cache(&self) -> &AnalysisCache<C> {
        &self.cache
    }

    /// Analyzes an encoded image, serving repeats from the cache.
    pub fn scan(&self, image: &EncodedImage) -> Result<AnalysisResult, ScanError> {
        if image.data().is_empty() {
            return Err(InputError::Empty.into());
        }
        let fingerprint = cache::fingerprint_bytes(image.data());
        self.cache.get_or_compute(&fingerprint, || self.analyze(image))
    }

    /// Analyzes a base64 payload or data URL. Cache hits skip decoding.
    pub fn scan_base64(&self, payload: &str) -> Result<AnalysisResult, ScanError> {
        let fingerprint = cache::fingerprint_text(payload);
        if fingerprint.is_empty() {
            return Err(InputError::Empty.into());
        }
        self.cache.get_or_compute(&fingerprint, || {
            let image = EncodedImage::from_base64(payload)?;
            self.analyze(&image)
        })
    }

    fn analyze(&self, image: &EncodedImage) -> Result<AnalysisResult, ScanError> {
        let Some(remote) = self.remote.as_deref() else {
            if !self.settings.enabled {
                return Err(ScanError::NoBackend);
            }
            info!("No remote analyzer configured, analyzing with OCR");
            return Ok(self.analyze_with_ocr(image)?);
        };

        let remote_error = match self.analyze_remote(remote, image) {
            Ok(result) => return Ok(result),
            Err(e) => e,
        };
        if !(self.settings.enabled && self.settings.use_as_backup) {
            return Err(remote_error.into());
        }

        warn!("Remote analysis failed: {}. Falling back to OCR.", remote_error);
        match self.analyze_with_ocr(image) {
            Ok(mut result) => {
                result.summary = format!("{}{}", OCR_SUMMARY_PREFIX, result.summary);
                Ok(result)
            }
            Err(ocr) => Err(ScanError::AllBackendsFailed {
                remote: remote_error,
                ocr,
            }),
        }
    }

    fn analyze_remote(
        &self,
        remote: &dyn RemoteAnalyzer,
        image: &EncodedImage,
    ) -> Result<AnalysisResult, RemoteError> {
        let response = remote.analyze(image)?;
        if response.trim().is_empty() {
            return Err(RemoteError::EmptyResponse);
        }
        Ok(self.parser.parse(&response, self.cache.clock().now()))
    }

    fn analyze_with_ocr(&self, image: &EncodedImage) -> Result<AnalysisResult, OcrError> {
        let text = ocr::extract_text(image, &self.settings, &self.backend)?;
        Ok(self.classifier.classify_at(&text, self.cache.clock().now()))
    }
}
