//! Analysis result types handed back to the calling shell.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    Safe,
    Low,
    Medium,
    High,
    Unknown,
}

impl fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RiskLevel::Safe => "safe",
            RiskLevel::Low => "low",
            RiskLevel::Medium => "medium",
            RiskLevel::High => "high",
            RiskLevel::Unknown => "unknown",
        };
        f.write_str(name)
    }
}

/// One detected threat. `kind` is serialized as `type`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Threat {
    #[serde(rename = "type")]
    pub kind: String,
    pub description: String,
    pub confidence: f32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisResult {
    pub risk_level: RiskLevel,
    pub confidence_score: f32,
    pub threats: Vec<Threat>,
    pub summary: String,
    pub recommendations: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<Vec<String>>,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw_analysis: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn serializes_with_shell_field_names() {
        let result = AnalysisResult {
            risk_level: RiskLevel::Medium,
            confidence_score: 0.7,
            threats: vec![Threat {
                kind: "security".into(),
                description: "Detected 1 malware keyword".into(),
                confidence: 0.7,
            }],
            summary: "summary".into(),
            recommendations: vec!["Do not install".into()],
            details: None,
            timestamp: Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap(),
            raw_analysis: Some("raw".into()),
        };
        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["riskLevel"], "medium");
        assert_eq!(json["threats"][0]["type"], "security");
        assert_eq!(json["rawAnalysis"], "raw");
        assert_eq!(json["timestamp"], "2024-05-01T12:00:00Z");
        assert!(json.get("details").is_none());

        let back: AnalysisResult = serde_json::from_value(json).unwrap();
        assert_eq!(back, result);
    }
}
