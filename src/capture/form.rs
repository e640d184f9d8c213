use super::CaptureAdapter;
use crate::analyzer::{QuestionnairePredictor, TranscriptAnalyzer};
use crate::error::{CaptureError, Result};
use crate::results::{QuestionnaireResult, StepResult, TranscriptResult, WearableResult};
use crate::steps::StepId;
use async_trait::async_trait;
use serde_json::{Map, Value};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Questionnaire fields that must be answered before the step counts
pub const REQUIRED_ANSWERS: [&str; 6] = [
    "Age",
    "Gender",
    "Height",
    "Weight",
    "Blood Glucose",
    "HbA1c",
];

/// Raw user input for a non-image step
#[derive(Debug, Clone)]
pub enum FormInput {
    Answers(Map<String, Value>),
    Records(Value),
    Text(String),
}

#[async_trait]
pub trait FormSource: Send + Sync {
    async fn read_form(&self, step: StepId) -> Result<FormInput>;
}

/// Fixed inputs kept in memory
#[derive(Debug, Default)]
pub struct StaticFormSource {
    inputs: Vec<(StepId, FormInput)>,
}

impl StaticFormSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_input(mut self, step: StepId, input: FormInput) -> Self {
        self.inputs.retain(|(s, _)| *s != step);
        self.inputs.push((step, input));
        self
    }
}

#[async_trait]
impl FormSource for StaticFormSource {
    async fn read_form(&self, step: StepId) -> Result<FormInput> {
        self.inputs
            .iter()
            .find(|(s, _)| *s == step)
            .map(|(_, input)| input.clone())
            .ok_or_else(|| {
                CaptureError::DeviceUnavailable {
                    step,
                    reason: "no input provided".to_string(),
                }
                .into()
            })
    }
}

/// Capture for the questionnaire, wearable and transcript steps
pub struct FormCapture {
    source: Arc<dyn FormSource>,
    predictor: Option<Arc<QuestionnairePredictor>>,
    transcript_analyzer: Option<Arc<TranscriptAnalyzer>>,
}

impl FormCapture {
    pub fn new(source: Arc<dyn FormSource>) -> Self {
        Self {
            source,
            predictor: None,
            transcript_analyzer: None,
        }
    }

    pub fn with_predictor(mut self, predictor: Arc<QuestionnairePredictor>) -> Self {
        self.predictor = Some(predictor);
        self
    }

    pub fn with_transcript_analyzer(mut self, analyzer: Arc<TranscriptAnalyzer>) -> Self {
        self.transcript_analyzer = Some(analyzer);
        self
    }

    async fn attempt(&self, step: StepId) -> Result<StepResult> {
        let input = self.source.read_form(step).await?;

        match (step, input) {
            (StepId::Questionnaire, FormInput::Answers(answers)) => {
                check_answers(&answers)?;
                let assessment = match &self.predictor {
                    Some(predictor) => Some(predictor.predict(&answers).await?),
                    None => None,
                };
                Ok(StepResult::Questionnaire(QuestionnaireResult {
                    answers,
                    assessment,
                }))
            }
            (StepId::Wearable, FormInput::Records(Value::Array(records))) => {
                debug!("Read {} wearable records", records.len());
                Ok(StepResult::Wearable(WearableResult { records }))
            }
            (StepId::Transcript, FormInput::Text(text)) => {
                if text.trim().is_empty() {
                    return Err(invalid(step, "transcript is blank"));
                }
                let analysis = match &self.transcript_analyzer {
                    Some(analyzer) => {
                        analyzer.health().await?;
                        Some(analyzer.analyze(&text).await?)
                    }
                    None => None,
                };
                Ok(StepResult::Transcript(TranscriptResult { text, analysis }))
            }
            (StepId::Wearable, FormInput::Records(_)) => {
                Err(invalid(step, "wearable records must be a list"))
            }
            (step, input) => Err(invalid(
                step,
                &format!("unexpected {} input for this step", kind(&input)),
            )),
        }
    }
}

#[async_trait]
impl CaptureAdapter for FormCapture {
    fn handles(&self, step: StepId) -> bool {
        matches!(
            step,
            StepId::Questionnaire | StepId::Wearable | StepId::Transcript
        )
    }

    async fn capture(&self, step: StepId, cancel: &CancellationToken) -> Result<StepResult> {
        if !self.handles(step) {
            return Err(CaptureError::DeviceUnavailable {
                step,
                reason: "not a form step".to_string(),
            }
            .into());
        }

        let outcome = tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(CaptureError::Cancelled { step }.into()),
            result = self.attempt(step) => result,
        };

        if outcome.is_ok() {
            info!("Recorded form input for {}", step);
        }
        outcome
    }
}

fn check_answers(answers: &Map<String, Value>) -> Result<()> {
    let missing: Vec<&str> = REQUIRED_ANSWERS
        .iter()
        .copied()
        .filter(|field| match answers.get(*field) {
            None | Some(Value::Null) => true,
            Some(Value::String(s)) => s.trim().is_empty(),
            Some(_) => false,
        })
        .collect();

    if missing.is_empty() {
        Ok(())
    } else {
        Err(invalid(
            StepId::Questionnaire,
            &format!("missing answers: {}", missing.join(", ")),
        ))
    }
}

fn invalid(step: StepId, reason: &str) -> crate::error::ScreeningError {
    CaptureError::InvalidPayload {
        step,
        reason: reason.to_string(),
    }
    .into()
}

fn kind(input: &FormInput) -> &'static str {
    match input {
        FormInput::Answers(_) => "answers",
        FormInput::Records(_) => "records",
        FormInput::Text(_) => "text",
    }
}
