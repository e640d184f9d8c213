use crate::error::{Result, SubmissionError};
use crate::results::RiskLevel;
use crate::session::SessionState;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

/// Document persisted for a finished session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportDocument {
    pub user_id: String,
    pub session_id: Uuid,
    pub timestamp: DateTime<Utc>,
    /// Highest level any step reported, `low` when none did
    pub risk_level: RiskLevel,
    /// Step payloads keyed by step name
    pub results: Map<String, Value>,
}

impl ReportDocument {
    /// Build the report for a complete session
    pub fn from_state(state: &SessionState, user_id: &str) -> Result<Self> {
        let missing = state.missing_steps();
        if !missing.is_empty() {
            return Err(SubmissionError::IncompleteSession { missing }.into());
        }

        let mut results = Map::new();
        let mut risk_level = RiskLevel::Low;
        for (step, result) in state.results() {
            if let Some(result) = result {
                if let Some(level) = result.risk_level() {
                    risk_level = risk_level.max(level);
                }
                results.insert(step.as_str().to_string(), result.payload());
            }
        }

        Ok(Self {
            user_id: user_id.to_string(),
            session_id: state.session_id(),
            timestamp: Utc::now(),
            risk_level,
            results,
        })
    }
}
