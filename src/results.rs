use crate::steps::StepId;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

/// Risk level reported by analyzers and aggregated into the report
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
}

impl RiskLevel {
    /// Parse the loosely formatted levels analyzers return ("High", "medium", ...)
    pub fn parse_loose(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "low" | "normal" => Some(RiskLevel::Low),
            "medium" | "moderate" | "mild" => Some(RiskLevel::Medium),
            "high" | "severe" | "very severe" => Some(RiskLevel::High),
            _ => None,
        }
    }
}

impl fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RiskLevel::Low => f.write_str("low"),
            RiskLevel::Medium => f.write_str("medium"),
            RiskLevel::High => f.write_str("high"),
        }
    }
}

/// Analyzer reply for an image step. Only the common fields are lifted out,
/// the full response stays in `raw`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageAnalysis {
    pub risk_level: Option<RiskLevel>,
    #[serde(default)]
    pub findings: Vec<Value>,
    #[serde(default)]
    pub recommendations: Vec<String>,
    pub raw: Value,
}

impl ImageAnalysis {
    pub fn from_response(raw: Value) -> Self {
        let risk_level = ["risk_level", "severity_level"]
            .iter()
            .filter_map(|key| lookup(&raw, key))
            .filter_map(Value::as_str)
            .find_map(RiskLevel::parse_loose);

        let findings = lookup(&raw, "findings")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();

        let recommendations = lookup(&raw, "recommendations")
            .and_then(Value::as_array)
            .map(|items| {
                items
                    .iter()
                    .filter_map(Value::as_str)
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();

        Self {
            risk_level,
            findings,
            recommendations,
            raw,
        }
    }
}

// Top level first, then one level down under "analysis"
fn lookup<'a>(raw: &'a Value, key: &str) -> Option<&'a Value> {
    raw.get(key)
        .or_else(|| raw.get("analysis").and_then(|a| a.get(key)))
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuestionnaireResult {
    pub answers: Map<String, Value>,
    pub assessment: Option<Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WearableResult {
    pub records: Vec<Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TranscriptResult {
    pub text: String,
    pub analysis: Option<Value>,
}

/// Result captured for a single step, one variant per step
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "step", content = "payload", rename_all = "snake_case")]
pub enum StepResult {
    Questionnaire(QuestionnaireResult),
    Wearable(WearableResult),
    Skin(ImageAnalysis),
    Body(ImageAnalysis),
    Metabolic(ImageAnalysis),
    Eye(ImageAnalysis),
    Transcript(TranscriptResult),
}

impl StepResult {
    /// Wrap an image analysis in the variant for `step`. Returns None for
    /// steps that do not take images.
    pub fn image(step: StepId, analysis: ImageAnalysis) -> Option<Self> {
        match step {
            StepId::Skin => Some(StepResult::Skin(analysis)),
            StepId::Body => Some(StepResult::Body(analysis)),
            StepId::Metabolic => Some(StepResult::Metabolic(analysis)),
            StepId::Eye => Some(StepResult::Eye(analysis)),
            _ => None,
        }
    }

    pub fn step(&self) -> StepId {
        match self {
            StepResult::Questionnaire(_) => StepId::Questionnaire,
            StepResult::Wearable(_) => StepId::Wearable,
            StepResult::Skin(_) => StepId::Skin,
            StepResult::Body(_) => StepId::Body,
            StepResult::Metabolic(_) => StepId::Metabolic,
            StepResult::Eye(_) => StepId::Eye,
            StepResult::Transcript(_) => StepId::Transcript,
        }
    }

    pub fn risk_level(&self) -> Option<RiskLevel> {
        match self {
            StepResult::Skin(a) | StepResult::Body(a) | StepResult::Metabolic(a) | StepResult::Eye(a) => {
                a.risk_level
            }
            StepResult::Questionnaire(q) => q
                .assessment
                .as_ref()
                .and_then(|v| v.get("risk_level"))
                .and_then(Value::as_str)
                .and_then(RiskLevel::parse_loose),
            _ => None,
        }
    }

    /// Payload without the step tag, as stored in the report document
    pub fn payload(&self) -> Value {
        let value = match self {
            StepResult::Questionnaire(q) => serde_json::to_value(q),
            StepResult::Wearable(w) => serde_json::to_value(w),
            StepResult::Skin(a) | StepResult::Body(a) | StepResult::Metabolic(a) | StepResult::Eye(a) => {
                serde_json::to_value(a)
            }
            StepResult::Transcript(t) => serde_json::to_value(t),
        };
        value.unwrap_or(Value::Null)
    }
}
