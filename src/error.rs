use crate::steps::StepId;
use std::fmt;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ScreeningError {
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Deserialization error: {0}")]
    Deserialization(#[from] toml::de::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Registry error: {0}")]
    Registry(#[from] RegistryError),

    #[error("Capture error: {0}")]
    Capture(#[from] CaptureError),

    #[error("Submission error: {0}")]
    Submission(#[from] SubmissionError),

    #[error("Event bus error: {0}")]
    EventBus(#[from] EventBusError),

    #[error("Invalid submission status transition from {from} to {to}")]
    InvalidTransition { from: String, to: String },

    #[error("Session is {status}, result for {step} not accepted")]
    SessionLocked { step: StepId, status: String },

    #[error("Not authenticated, sign in at {redirect}")]
    Unauthenticated { redirect: String },

    #[error("System error: {message}")]
    System { message: String },

    #[error("Component error in {component}: {message}")]
    Component { component: String, message: String },
}

/// Step registry wiring errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RegistryError {
    #[error("Unknown step: {step}")]
    UnknownStep { step: String },

    #[error("Step index {index} out of range (registry has {len} steps)")]
    IndexOutOfRange { index: usize, len: usize },
}

/// Capture adapter errors
#[derive(Error, Debug)]
pub enum CaptureError {
    #[error("Device unavailable for {step}: {reason}")]
    DeviceUnavailable { step: StepId, reason: String },

    #[error("Device '{device}' is busy with another capture")]
    DeviceBusy { device: String },

    #[error("Capture for {step} timed out after {after:?}")]
    Timeout { step: StepId, after: Duration },

    #[error("Invalid payload for {step}: {reason}")]
    InvalidPayload { step: StepId, reason: String },

    #[error("Capture for {step} was cancelled")]
    Cancelled { step: StepId },

    #[error("Analyzer rejected {step} (status {status}): {message}")]
    AnalysisFailed {
        step: StepId,
        status: u16,
        message: String,
    },
}

/// Event bus errors
#[derive(Error, Debug)]
pub enum EventBusError {
    #[error("Failed to publish event: {details}")]
    PublishFailed { details: String },

    #[error("Event channel closed")]
    ChannelClosed,
}

/// Submission gateway errors
#[derive(Error, Debug)]
pub enum SubmissionError {
    #[error("Session is incomplete, missing: {}", join_steps(.missing))]
    IncompleteSession { missing: Vec<StepId> },

    #[error("A submission is already in progress")]
    InProgress,

    #[error("Submission failed: {cause}")]
    Failed { cause: SubmissionCause },
}

/// Why a submission attempt did not produce a report id
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmissionCause {
    Timeout,
    Transport(String),
    Rejected { status: u16, body: String },
}

impl fmt::Display for SubmissionCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SubmissionCause::Timeout => write!(f, "timed out"),
            SubmissionCause::Transport(details) => write!(f, "transport error: {}", details),
            SubmissionCause::Rejected { status, body } => {
                write!(f, "rejected with status {}: {}", status, body)
            }
        }
    }
}

fn join_steps(steps: &[StepId]) -> String {
    steps
        .iter()
        .map(|s| s.as_str())
        .collect::<Vec<_>>()
        .join(", ")
}

impl ScreeningError {
    pub fn system<S: Into<String>>(message: S) -> Self {
        Self::System {
            message: message.into(),
        }
    }

    pub fn component<S: Into<String>>(component: S, message: S) -> Self {
        Self::Component {
            component: component.into(),
            message: message.into(),
        }
    }

    /// Whether the user can recover by retrying the capture or the submission.
    /// Registry errors mean the flow was wired wrong and are not retryable.
    pub fn is_recoverable(&self) -> bool {
        match self {
            ScreeningError::Registry(_) => false,
            ScreeningError::Config(_) => false,
            ScreeningError::InvalidTransition { .. } => false,
            ScreeningError::SessionLocked { .. } => false,
            ScreeningError::Capture(_) => true,
            ScreeningError::Submission(_) => true,
            ScreeningError::Unauthenticated { .. } => true,
            _ => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, ScreeningError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_registry_errors_are_not_recoverable() {
        let err: ScreeningError = RegistryError::UnknownStep {
            step: "breathing".to_string(),
        }
        .into();
        assert!(!err.is_recoverable());
    }

    #[test]
    fn test_capture_and_submission_errors_are_recoverable() {
        let busy: ScreeningError = CaptureError::DeviceBusy {
            device: "camera0".to_string(),
        }
        .into();
        let failed: ScreeningError = SubmissionError::Failed {
            cause: SubmissionCause::Timeout,
        }
        .into();
        assert!(busy.is_recoverable());
        assert!(failed.is_recoverable());
    }

    #[test]
    fn test_incomplete_session_lists_missing_steps() {
        let err = SubmissionError::IncompleteSession {
            missing: vec![StepId::Eye, StepId::Transcript],
        };
        assert_eq!(
            err.to_string(),
            "Session is incomplete, missing: eye, transcript"
        );
    }
}
