mod http;
mod predictor;
mod transcript;

use crate::camera::Frame;
use crate::error::Result;
use crate::steps::StepId;
use async_trait::async_trait;
use serde_json::Value;

pub use http::HttpAnalyzer;
pub use predictor::QuestionnairePredictor;
pub use transcript::TranscriptAnalyzer;

/// Remote service that turns a captured image into a JSON assessment
#[async_trait]
pub trait ImageAnalyzer: Send + Sync {
    /// Upload one frame and return the raw JSON reply
    async fn analyze(&self, step: StepId, frame: &Frame) -> Result<Value>;

    /// Probe availability before a capture starts. Services without a probe
    /// are assumed available.
    async fn health(&self, step: StepId) -> Result<()>;
}
