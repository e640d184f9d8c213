use super::ImageAnalyzer;
use crate::camera::Frame;
use crate::config::{AnalyzerEndpoint, AnalyzersConfig};
use crate::error::{CaptureError, Result, ScreeningError};
use crate::steps::StepId;
use async_trait::async_trait;
use reqwest::{multipart, Client, StatusCode};
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Analyzer services reached over HTTP, one endpoint per image step
pub struct HttpAnalyzer {
    client: Client,
    endpoints: Vec<(StepId, AnalyzerEndpoint)>,
    request_timeout: Duration,
}

impl HttpAnalyzer {
    pub fn new(config: &AnalyzersConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.request_timeout())
            .build()
            .map_err(|e| ScreeningError::component("analyzer".to_string(), e.to_string()))?;

        Ok(Self::with_client(client, config))
    }

    /// Share an existing client (and its connection pool)
    pub fn with_client(client: Client, config: &AnalyzersConfig) -> Self {
        let endpoints = StepId::ALL
            .iter()
            .filter_map(|step| config.endpoint(*step).map(|e| (*step, e.clone())))
            .collect();

        Self {
            client,
            endpoints,
            request_timeout: config.request_timeout(),
        }
    }

    fn endpoint(&self, step: StepId) -> Result<&AnalyzerEndpoint> {
        self.endpoints
            .iter()
            .find(|(s, _)| *s == step)
            .map(|(_, e)| e)
            .ok_or_else(|| {
                CaptureError::DeviceUnavailable {
                    step,
                    reason: "no analyzer configured".to_string(),
                }
                .into()
            })
    }

    pub fn has_health_probe(&self, step: StepId) -> bool {
        self.endpoint(step)
            .map(|e| e.health_url.is_some())
            .unwrap_or(false)
    }

    fn transport_error(&self, step: StepId, err: reqwest::Error) -> ScreeningError {
        if err.is_timeout() {
            CaptureError::Timeout {
                step,
                after: self.request_timeout,
            }
            .into()
        } else {
            CaptureError::DeviceUnavailable {
                step,
                reason: format!("analyzer unreachable: {}", err),
            }
            .into()
        }
    }
}

#[async_trait]
impl ImageAnalyzer for HttpAnalyzer {
    async fn analyze(&self, step: StepId, frame: &Frame) -> Result<Value> {
        let endpoint = self.endpoint(step)?;

        let part = multipart::Part::bytes(frame.data.to_vec())
            .file_name(frame.file_name.clone())
            .mime_str(&frame.mime_type)
            .map_err(|e| CaptureError::InvalidPayload {
                step,
                reason: format!("bad mime type '{}': {}", frame.mime_type, e),
            })?;
        let form = multipart::Form::new().part(endpoint.field.clone(), part);

        debug!(
            "Uploading {} bytes for {} to {}",
            frame.len(),
            step,
            endpoint.url
        );

        let response = self
            .client
            .post(&endpoint.url)
            .multipart(form)
            .send()
            .await
            .map_err(|e| self.transport_error(step, e))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| self.transport_error(step, e))?;

        if !status.is_success() {
            warn!("Analyzer for {} answered {}: {}", step, status, body);
            return Err(rejection(step, status, body).into());
        }

        serde_json::from_str(&body).map_err(|e| {
            CaptureError::AnalysisFailed {
                step,
                status: status.as_u16(),
                message: format!("response is not JSON: {}", e),
            }
            .into()
        })
    }

    async fn health(&self, step: StepId) -> Result<()> {
        let endpoint = self.endpoint(step)?;
        let Some(url) = endpoint.health_url.as_deref() else {
            return Ok(());
        };

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| self.transport_error(step, e))?;

        if response.status().is_success() {
            debug!("Analyzer for {} is healthy", step);
            Ok(())
        } else {
            info!("Analyzer for {} reports {}", step, response.status());
            Err(CaptureError::DeviceUnavailable {
                step,
                reason: format!("health check returned {}", response.status()),
            }
            .into())
        }
    }
}

/// Client errors mean the upload itself was refused
pub(super) fn rejection(step: StepId, status: StatusCode, body: String) -> CaptureError {
    match status {
        StatusCode::BAD_REQUEST
        | StatusCode::PAYLOAD_TOO_LARGE
        | StatusCode::UNSUPPORTED_MEDIA_TYPE
        | StatusCode::UNPROCESSABLE_ENTITY => CaptureError::InvalidPayload {
            step,
            reason: format!("analyzer refused the upload ({}): {}", status, body),
        },
        _ => CaptureError::AnalysisFailed {
            step,
            status: status.as_u16(),
            message: body,
        },
    }
}
