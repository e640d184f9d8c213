use super::report::ReportDocument;
use crate::config::ReportConfig;
use crate::error::{Result, ScreeningError, SubmissionCause, SubmissionError};
use crate::session::ReportId;
use async_trait::async_trait;
use reqwest::{Client, Response};
use serde_json::Value;
use tracing::{debug, warn};

/// Durable storage for finished reports
#[async_trait]
pub trait ReportSink: Send + Sync {
    /// Persist the report and return the id the store assigned
    async fn store(&self, report: &ReportDocument) -> Result<ReportId>;

    async fn fetch(&self, id: &ReportId) -> Result<Value>;

    async fn list_for_user(&self, user_id: &str) -> Result<Vec<Value>>;
}

/// Report storage API over HTTP
pub struct HttpReportSink {
    client: Client,
    base_url: String,
}

impl HttpReportSink {
    pub fn new(config: &ReportConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.request_timeout())
            .build()
            .map_err(|e| ScreeningError::component("report".to_string(), e.to_string()))?;

        Ok(Self::with_client(client, &config.base_url))
    }

    pub fn with_client(client: Client, base_url: &str) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    fn reports_url(&self) -> String {
        format!("{}/api/reports", self.base_url)
    }
}

#[async_trait]
impl ReportSink for HttpReportSink {
    async fn store(&self, report: &ReportDocument) -> Result<ReportId> {
        debug!("Storing report for session {}", report.session_id);

        let response = self
            .client
            .post(self.reports_url())
            .json(report)
            .send()
            .await
            .map_err(transport)?;

        let body = json_body(response).await?;
        extract_report_id(&body).ok_or_else(|| {
            failed(SubmissionCause::Transport(
                "response carried no report id".to_string(),
            ))
        })
    }

    async fn fetch(&self, id: &ReportId) -> Result<Value> {
        let response = self
            .client
            .get(format!("{}/{}", self.reports_url(), id))
            .send()
            .await
            .map_err(transport)?;

        json_body(response).await
    }

    async fn list_for_user(&self, user_id: &str) -> Result<Vec<Value>> {
        let response = self
            .client
            .get(self.reports_url())
            .query(&[("userId", user_id)])
            .send()
            .await
            .map_err(transport)?;

        match json_body(response).await? {
            Value::Array(reports) => Ok(reports),
            Value::Object(mut body) => match body.remove("reports") {
                Some(Value::Array(reports)) => Ok(reports),
                _ => Ok(Vec::new()),
            },
            _ => Ok(Vec::new()),
        }
    }
}

/// The storage API has answered with `id`, `report_id` and `_id` over time
fn extract_report_id(body: &Value) -> Option<ReportId> {
    ["id", "report_id", "_id"]
        .iter()
        .filter_map(|key| body.get(*key))
        .find_map(|value| match value {
            Value::String(s) if !s.is_empty() => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        })
        .map(ReportId)
}

async fn json_body(response: Response) -> Result<Value> {
    let status = response.status();
    let body = response.text().await.map_err(transport)?;

    if !status.is_success() {
        warn!("Report API answered {}: {}", status, body);
        return Err(failed(SubmissionCause::Rejected {
            status: status.as_u16(),
            body,
        }));
    }

    serde_json::from_str(&body)
        .map_err(|e| failed(SubmissionCause::Transport(format!("invalid JSON reply: {}", e))))
}

fn transport(err: reqwest::Error) -> ScreeningError {
    if err.is_timeout() {
        failed(SubmissionCause::Timeout)
    } else {
        failed(SubmissionCause::Transport(err.to_string()))
    }
}

fn failed(cause: SubmissionCause) -> ScreeningError {
    SubmissionError::Failed { cause }.into()
}
