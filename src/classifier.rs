//! Threat Classifier
//!
//! Scores extracted text against keyword lexicons and maps the match counts
//! to a risk level through an ordered rule set:
//!
//! 1. two or more phishing keywords, or phishing together with financial
//!    keywords, is high risk;
//! 2. any malware keyword is medium risk;
//! 3. any single phishing or financial keyword is low risk;
//! 4. anything else is safe.

use crate::error::LexiconError;
use crate::result::{AnalysisResult, RiskLevel, Threat};
use chrono::{DateTime, Utc};
use log::{debug, info};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::sync::LazyLock;

const BUILTIN_LEXICON: &str = include_str!("../data/lexicon.json");

static BUILTIN: LazyLock<Lexicon> = LazyLock::new(|| {
    Lexicon::from_json(BUILTIN_LEXICON).expect("built-in lexicon is valid JSON")
});

const HIGH_CONFIDENCE: f32 = 0.85;
const MEDIUM_CONFIDENCE: f32 = 0.70;
const LOW_CONFIDENCE: f32 = 0.60;
const SAFE_CONFIDENCE: f32 = 0.95;

const EXTRACTED_TEXT_LABEL: &str = "Extracted text:";

/// Versioned keyword lists. Keywords are matched as lower-case substrings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Lexicon {
    pub version: String,
    pub phishing: Vec<String>,
    pub malware: Vec<String>,
    pub financial: Vec<String>,
}

impl Lexicon {
    /// The lexicon compiled into the binary.
    pub fn builtin() -> Self {
        BUILTIN.clone()
    }

    pub fn from_json(document: &str) -> Result<Self, LexiconError> {
        let mut lexicon: Lexicon = serde_json::from_str(document)?;
        for list in [&mut lexicon.phishing, &mut lexicon.malware, &mut lexicon.financial] {
            for keyword in list.iter_mut() {
                *keyword = keyword.trim().to_lowercase();
            }
            list.retain(|keyword| !keyword.is_empty());
        }
        Ok(lexicon)
    }

    pub fn load(path: &Path) -> Result<Self, LexiconError> {
        let lexicon = Self::from_json(&fs::read_to_string(path)?)?;
        info!("Loaded lexicon version {} from {:?}", lexicon.version, path);
        Ok(lexicon)
    }
}

impl Default for Lexicon {
    fn default() -> Self {
        Self::builtin()
    }
}

/// Keywords found in one text, per lexicon.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KeywordMatches {
    pub phishing: Vec<String>,
    pub malware: Vec<String>,
    pub financial: Vec<String>,
}

#[derive(Debug, Clone, Default)]
pub struct ThreatClassifier {
    lexicon: Lexicon,
}

impl ThreatClassifier {
    pub fn new(lexicon: Lexicon) -> Self {
        Self { lexicon }
    }

    pub fn lexicon(&self) -> &Lexicon {
        &self.lexicon
    }

    /// Finds which keywords of each lexicon occur in `text`.
    pub fn scan(&self, text: &str) -> KeywordMatches {
        let lower = text.to_lowercase();
        let matching = |keywords: &[String], category: &str| -> Vec<String> {
            keywords
                .iter()
                .filter(|keyword| lower.contains(keyword.as_str()))
                .inspect(|keyword| debug!("{} keyword found: {}", category, keyword))
                .cloned()
                .collect()
        };
        KeywordMatches {
            phishing: matching(&self.lexicon.phishing, "Phishing"),
            malware: matching(&self.lexicon.malware, "Malware"),
            financial: matching(&self.lexicon.financial, "Financial"),
        }
    }

    pub fn classify(&self, text: &str) -> AnalysisResult {
        self.classify_at(text, Utc::now())
    }

    /// Classifies `text`, stamping the result with `now`.
    pub fn classify_at(&self, text: &str, now: DateTime<Utc>) -> AnalysisResult {
        let matches = self.scan(text);
        let (phishing, malware, financial) = (
            matches.phishing.len(),
            matches.malware.len(),
            matches.financial.len(),
        );

        let (risk_level, confidence_score, threats, summary, recommendations) =
            if phishing >= 2 || (phishing >= 1 && financial >= 1) {
                (
                    RiskLevel::High,
                    HIGH_CONFIDENCE,
                    vec![Threat {
                        kind: "phishing".into(),
                        description: format!(
                            "Detected {} phishing and {} financial keywords: {}",
                            phishing,
                            financial,
                            joined(&[&matches.phishing, &matches.financial])
                        ),
                        confidence: HIGH_CONFIDENCE,
                    }],
                    "High phishing risk detected in the image.",
                    vec![
                        "Do not share personal or financial information",
                        "Verify the authenticity of the website or sender",
                        "Avoid clicking links shown in this image",
                        "For financial matters, contact the institution through a verified channel",
                    ],
                )
            } else if malware >= 1 {
                (
                    RiskLevel::Medium,
                    MEDIUM_CONFIDENCE,
                    vec![Threat {
                        kind: "security".into(),
                        description: format!(
                            "Detected {} malware-related keywords: {}",
                            malware,
                            joined(&[&matches.malware, &matches.phishing])
                        ),
                        confidence: MEDIUM_CONFIDENCE,
                    }],
                    "Medium risk of malware or unsafe software detected in the image.",
                    vec![
                        "Do not download or install anything this content asks for",
                        "Check the extension of any file before opening it",
                        "Keep an active, up-to-date antivirus",
                        "Verify the sender before downloading anything",
                    ],
                )
            } else if financial >= 1 || phishing >= 1 {
                (
                    RiskLevel::Low,
                    LOW_CONFIDENCE,
                    vec![Threat {
                        kind: "suspicious-content".into(),
                        description: format!(
                            "Detected {} suspicious keywords: {}",
                            phishing + financial,
                            joined(&[&matches.phishing, &matches.financial])
                        ),
                        confidence: LOW_CONFIDENCE,
                    }],
                    "Low risk: suspicious or financial content detected in the image.",
                    vec![
                        "Be careful with any information being requested",
                        "Verify the identity of the sender before responding",
                        "Do not share personal or financial information without verification",
                    ],
                )
            } else {
                (
                    RiskLevel::Safe,
                    SAFE_CONFIDENCE,
                    Vec::new(),
                    "No significant risk detected in the extracted text.",
                    vec![
                        "Stay careful with online content",
                        "Always verify the sender or source of information",
                    ],
                )
            };

        info!(
            "Classified text as {} (phishing {}, malware {}, financial {})",
            risk_level, phishing, malware, financial
        );

        AnalysisResult {
            risk_level,
            confidence_score,
            threats,
            summary: summary.to_string(),
            recommendations: recommendations.into_iter().map(String::from).collect(),
            details: Some(vec![EXTRACTED_TEXT_LABEL.to_string(), text.to_string()]),
            timestamp: now,
            raw_analysis: Some(text.to_string()),
        }
    }
}

fn joined(groups: &[&Vec<String>]) -> String {
    groups
        .iter()
        .flat_map(|group| group.iter().map(String::as_str))
        .collect::<Vec<_>>()
        .join(", ")
}
