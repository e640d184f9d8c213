use super::http::rejection;
use crate::config::TranscriptConfig;
use crate::error::{CaptureError, Result, ScreeningError};
use crate::steps::StepId;
use reqwest::{multipart, Client};
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, info, warn};

const STEP: StepId = StepId::Transcript;

/// Document analyzer the medical transcript is uploaded to as a text file
pub struct TranscriptAnalyzer {
    client: Client,
    url: String,
    health_url: Option<String>,
    timeout: Duration,
}

impl TranscriptAnalyzer {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ScreeningError::component("transcript".to_string(), e.to_string()))?;

        Ok(Self {
            client,
            url: url.into(),
            health_url: None,
            timeout,
        })
    }

    /// Analyzer described by `[transcript]`, None when no url is set
    pub fn from_config(config: &TranscriptConfig, timeout: Duration) -> Result<Option<Self>> {
        let Some(url) = config.analyzer_url.as_deref() else {
            return Ok(None);
        };

        let mut analyzer = Self::new(url, timeout)?;
        if let Some(health_url) = &config.health_url {
            analyzer = analyzer.with_health_url(health_url.clone());
        }
        Ok(Some(analyzer))
    }

    pub fn with_health_url(mut self, url: impl Into<String>) -> Self {
        self.health_url = Some(url.into());
        self
    }

    pub fn has_health_probe(&self) -> bool {
        self.health_url.is_some()
    }

    fn transport_error(&self, err: reqwest::Error) -> ScreeningError {
        if err.is_timeout() {
            CaptureError::Timeout {
                step: STEP,
                after: self.timeout,
            }
            .into()
        } else {
            CaptureError::DeviceUnavailable {
                step: STEP,
                reason: format!("transcript analyzer unreachable: {}", err),
            }
            .into()
        }
    }

    /// Without a probe the analyzer is assumed available
    pub async fn health(&self) -> Result<()> {
        let Some(url) = self.health_url.as_deref() else {
            return Ok(());
        };

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| self.transport_error(e))?;

        if response.status().is_success() {
            Ok(())
        } else {
            info!("Transcript analyzer reports {}", response.status());
            Err(CaptureError::DeviceUnavailable {
                step: STEP,
                reason: format!("health check returned {}", response.status()),
            }
            .into())
        }
    }

    pub async fn analyze(&self, text: &str) -> Result<Value> {
        let part = multipart::Part::text(text.to_string())
            .file_name("transcript.txt")
            .mime_str("text/plain")
            .map_err(|e| CaptureError::InvalidPayload {
                step: STEP,
                reason: e.to_string(),
            })?;
        let form = multipart::Form::new().part("file", part);

        debug!("Uploading {} byte transcript to {}", text.len(), self.url);

        let response = self
            .client
            .post(&self.url)
            .multipart(form)
            .send()
            .await
            .map_err(|e| self.transport_error(e))?;

        let status = response.status();
        let body = response.text().await.map_err(|e| self.transport_error(e))?;

        if !status.is_success() {
            warn!("Transcript analyzer answered {}: {}", status, body);
            return Err(rejection(STEP, status, body).into());
        }

        serde_json::from_str(&body).map_err(|e| {
            CaptureError::AnalysisFailed {
                step: STEP,
                status: status.as_u16(),
                message: format!("response is not JSON: {}", e),
            }
            .into()
        })
    }
}
