use crate::error::{CaptureError, Result, ScreeningError};
use crate::steps::StepId;
use reqwest::Client;
use serde_json::{Map, Value};
use std::time::Duration;
use tracing::{debug, warn};

/// Risk predictor the questionnaire answers are posted to
pub struct QuestionnairePredictor {
    client: Client,
    url: String,
    timeout: Duration,
}

impl QuestionnairePredictor {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ScreeningError::component("predictor".to_string(), e.to_string()))?;

        Ok(Self {
            client,
            url: url.into(),
            timeout,
        })
    }

    pub async fn predict(&self, answers: &Map<String, Value>) -> Result<Value> {
        let step = StepId::Questionnaire;
        debug!("Posting {} answers to {}", answers.len(), self.url);

        let response = self
            .client
            .post(&self.url)
            .json(answers)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    CaptureError::Timeout {
                        step,
                        after: self.timeout,
                    }
                } else {
                    CaptureError::DeviceUnavailable {
                        step,
                        reason: format!("predictor unreachable: {}", e),
                    }
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            warn!("Predictor answered {}: {}", status, message);
            return Err(CaptureError::AnalysisFailed {
                step,
                status: status.as_u16(),
                message,
            }
            .into());
        }

        response.json::<Value>().await.map_err(|e| {
            CaptureError::AnalysisFailed {
                step,
                status: status.as_u16(),
                message: format!("response is not JSON: {}", e),
            }
            .into()
        })
    }
}
