//! Remote Analysis Boundary
//!
//! The vision API itself lives outside this crate. It is reached through
//! `RemoteAnalyzer`, which returns the model's free-form answer, and that
//! answer is turned into an `AnalysisResult` by a `ResponseParser`.

use crate::error::RemoteError;
use crate::input::EncodedImage;
use crate::result::{AnalysisResult, RiskLevel, Threat};
use chrono::{DateTime, Utc};
use regex::Regex;
use std::collections::HashMap;
use std::sync::LazyLock;

/// A remote vision-analysis service.
pub trait RemoteAnalyzer {
    /// Sends the capture for analysis and returns the raw model answer.
    fn analyze(&self, image: &EncodedImage) -> Result<String, RemoteError>;
}

/// Converts a free-form model answer into a structured result.
pub trait ResponseParser {
    fn parse(&self, response: &str, now: DateTime<Utc>) -> AnalysisResult;
}

const HIGH_RISK_KEYWORDS: &[&str] = &[
    "risiko tinggi", "high risk", "berbahaya", "dangerous", "phishing", "penipuan", "malware",
    "scam", "virus", "trojan", "ransomware", "pencurian data", "jangan", "data breach",
];
const MEDIUM_RISK_KEYWORDS: &[&str] = &[
    "risiko sedang", "medium risk", "mencurigakan", "suspicious", "waspada", "hati-hati",
    "verifikasi", "tidak aman", "unsafe", "peringatan", "warning",
];
const LOW_RISK_KEYWORDS: &[&str] = &[
    "risiko rendah", "low risk", "potensi", "potential", "kemungkinan", "mungkin",
];

static RISK_LABEL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(?:risiko|risk)(?:\s+level)?\s*:?\s*(tinggi|high|sedang|medium|rendah|low|aman|safe)\b")
        .expect("valid regex")
});
static SECTION_HEADING: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?im)^[\s>#*\-\d.)]*\**\s*(threats|ancaman|summary|ringkasan|recommendations|rekomendasi|risk|risiko)\s*\**\s*:")
        .expect("valid regex")
});
static LIST_MARKER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(?:[-*•]+|\d+[.)])\s*").expect("valid regex"));
static SENTENCE_END: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[.!?]+").expect("valid regex"));

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum Section {
    Threats,
    Summary,
    Recommendations,
    Risk,
}

/// Keyword- and heading-driven parser for answers shaped like
/// `RISK: high / THREATS: ... / SUMMARY: ... / RECOMMENDATIONS: ...`,
/// in English or Indonesian. Anything it cannot find falls back to
/// keyword heuristics and per-level defaults.
#[derive(Debug, Clone, Copy, Default)]
pub struct SectionParser;

impl ResponseParser for SectionParser {
    fn parse(&self, response: &str, now: DateTime<Utc>) -> AnalysisResult {
        let (risk_level, confidence_score) = assess_risk(response);
        let sections = split_sections(response);

        let summary = sections
            .get(&Section::Summary)
            .map(|body| list_items(body).join(" "))
            .filter(|summary| !summary.is_empty())
            .or_else(|| {
                response
                    .lines()
                    .map(str::trim)
                    .find(|line| !line.is_empty())
                    .map(str::to_string)
            })
            .unwrap_or_else(|| "Analysis complete.".to_string());

        let mut threats: Vec<Threat> = sections
            .get(&Section::Threats)
            .map(|body| list_items(body))
            .unwrap_or_default()
            .into_iter()
            .map(|description| Threat {
                kind: "security".into(),
                description,
                confidence: confidence_score,
            })
            .collect();
        if threats.is_empty() && risk_level != RiskLevel::Safe {
            threats = suspicious_sentences(response)
                .into_iter()
                .map(|description| Threat {
                    kind: "security".into(),
                    description,
                    confidence: confidence_score * 0.9,
                })
                .collect();
        }

        let mut recommendations = sections
            .get(&Section::Recommendations)
            .map(|body| list_items(body))
            .unwrap_or_default();
        if recommendations.is_empty() {
            recommendations = default_recommendations(risk_level);
        }

        AnalysisResult {
            risk_level,
            confidence_score,
            threats,
            summary,
            recommendations,
            details: None,
            timestamp: now,
            raw_analysis: Some(response.to_string()),
        }
    }
}

/// Explicit risk labels win; keyword groups decide otherwise.
fn assess_risk(response: &str) -> (RiskLevel, f32) {
    let mut explicit = [false; 4];
    for caps in RISK_LABEL.captures_iter(response) {
        let slot = match caps[1].to_lowercase().as_str() {
            "tinggi" | "high" => 0,
            "sedang" | "medium" => 1,
            "rendah" | "low" => 2,
            _ => 3,
        };
        explicit[slot] = true;
    }
    let [explicit_high, explicit_medium, explicit_low, explicit_safe] = explicit;

    let lower = response.to_lowercase();
    let mentions = |keywords: &[&str]| keywords.iter().any(|k| lower.contains(k));
    let has_high = mentions(HIGH_RISK_KEYWORDS);
    let has_medium = mentions(MEDIUM_RISK_KEYWORDS);
    let has_low = mentions(LOW_RISK_KEYWORDS);

    if explicit_high || (!explicit_medium && !explicit_low && !explicit_safe && has_high) {
        (RiskLevel::High, 0.9)
    } else if explicit_medium || (!explicit_low && !explicit_safe && has_medium) {
        (RiskLevel::Medium, 0.75)
    } else if explicit_low || (!explicit_safe && has_low) {
        (RiskLevel::Low, 0.6)
    } else {
        // Only an explicit safe label or an answer without risk keywords gets here.
        (RiskLevel::Safe, 0.85)
    }
}

/// Maps each heading to the text between it and the next heading.
/// The first occurrence of a heading wins.
fn split_sections(response: &str) -> HashMap<Section, &str> {
    let headings: Vec<(Section, usize, usize)> = SECTION_HEADING
        .captures_iter(response)
        .filter_map(|caps| {
            let whole = caps.get(0)?;
            let section = match caps[1].to_lowercase().as_str() {
                "threats" | "ancaman" => Section::Threats,
                "summary" | "ringkasan" => Section::Summary,
                "recommendations" | "rekomendasi" => Section::Recommendations,
                _ => Section::Risk,
            };
            Some((section, whole.start(), whole.end()))
        })
        .collect();

    let mut sections = HashMap::new();
    for (i, &(section, _, body_start)) in headings.iter().enumerate() {
        let body_end = headings.get(i + 1).map_or(response.len(), |next| next.1);
        sections.entry(section).or_insert(&response[body_start..body_end]);
    }
    sections
}

/// Splits a section body into bullet items, stripping list markers.
fn list_items(body: &str) -> Vec<String> {
    body.lines()
        .map(|line| LIST_MARKER.replace(line.trim(), "").trim().to_string())
        .filter(|line| !line.is_empty())
        .collect()
}

fn suspicious_sentences(response: &str) -> Vec<String> {
    SENTENCE_END
        .split(response)
        .map(str::trim)
        .filter(|sentence| {
            let lower = sentence.to_lowercase();
            HIGH_RISK_KEYWORDS
                .iter()
                .chain(MEDIUM_RISK_KEYWORDS)
                .any(|k| lower.contains(k))
        })
        .map(str::to_string)
        .collect()
}

fn default_recommendations(risk_level: RiskLevel) -> Vec<String> {
    let items: &[&str] = match risk_level {
        RiskLevel::High => &[
            "Close this page or application immediately",
            "Do not enter personal or financial information",
            "Report it to the authorities or your IT team",
            "Scan your device with an antivirus",
        ],
        RiskLevel::Medium => &[
            "Verify the source or sender before continuing",
            "Check the URL and security certificate",
            "Avoid entering personal information",
            "Use browser security features such as phishing protection",
        ],
        RiskLevel::Low => &[
            "Be careful with the information you share",
            "Verify the source of the information",
            "Weigh the risks before continuing",
        ],
        RiskLevel::Safe | RiskLevel::Unknown => &["Continue with normal precautions"],
    };
    items.iter().map(|item| item.to_string()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(response: &str) -> AnalysisResult {
        SectionParser.parse(response, Utc::now())
    }

    #[test]
    fn structured_indonesian_answer() {
        let answer = "1. RISIKO: tinggi\n\
                      2. THREATS:\n- Halaman login palsu\n- Meminta kode OTP\n\
                      3. SUMMARY: Halaman ini meniru situs bank.\n\
                      4. RECOMMENDATIONS:\n- Tutup halaman\n- Hubungi bank";
        let result = parse(answer);
        assert_eq!(result.risk_level, RiskLevel::High);
        assert_eq!(result.confidence_score, 0.9);
        assert_eq!(result.summary, "Halaman ini meniru situs bank.");
        let threats: Vec<&str> = result.threats.iter().map(|t| t.description.as_str()).collect();
        assert_eq!(threats, vec!["Halaman login palsu", "Meminta kode OTP"]);
        assert_eq!(result.recommendations, vec!["Tutup halaman", "Hubungi bank"]);
        assert_eq!(result.raw_analysis.as_deref(), Some(answer));
    }

    #[test]
    fn explicit_label_beats_keywords() {
        // Mentions "phishing" but is explicitly labelled safe.
        let result = parse("Risk: safe\nNo phishing indicators were found.");
        assert_eq!(result.risk_level, RiskLevel::Safe);
        assert!(result.threats.is_empty());
        assert_eq!(result.recommendations, vec!["Continue with normal precautions"]);

        assert_eq!(parse("Risk level: medium").risk_level, RiskLevel::Medium);
        assert_eq!(parse("RISIKO: rendah").risk_level, RiskLevel::Low);
    }

    #[test]
    fn explicit_safe_label_overrides_every_keyword_group() {
        let result = parse("Risiko: aman\nNo scam, nothing suspicious, no potential misuse.");
        assert_eq!(result.risk_level, RiskLevel::Safe);
        assert_eq!(result.confidence_score, 0.85);
        assert!(result.threats.is_empty());
    }

    #[test]
    fn keywords_decide_without_labels() {
        let result = parse("This looks like a scam. The rest is fine.");
        assert_eq!(result.risk_level, RiskLevel::High);
        assert_eq!(result.threats.len(), 1);
        assert_eq!(result.threats[0].description, "This looks like a scam");
        assert!((result.threats[0].confidence - 0.81).abs() < 1e-6);
        assert_eq!(result.summary, "This looks like a scam. The rest is fine.");
        assert_eq!(result.recommendations.len(), 4);

        assert_eq!(parse("Something suspicious here").risk_level, RiskLevel::Medium);
        assert_eq!(parse("There is potential for misuse").risk_level, RiskLevel::Low);
        assert_eq!(parse("A plain screenshot of a calendar").risk_level, RiskLevel::Safe);
    }

    #[test]
    fn empty_answer_still_yields_a_result() {
        let result = parse("");
        assert_eq!(result.risk_level, RiskLevel::Safe);
        assert_eq!(result.summary, "Analysis complete.");
        assert!(!result.recommendations.is_empty());
    }
}
