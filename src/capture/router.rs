use super::CaptureAdapter;
use crate::error::{CaptureError, Result};
use crate::results::StepResult;
use crate::steps::StepId;
use async_trait::async_trait;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Dispatches each step to the first adapter that handles it
#[derive(Default, Clone)]
pub struct CaptureRouter {
    adapters: Vec<Arc<dyn CaptureAdapter>>,
}

impl CaptureRouter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_adapter(mut self, adapter: Arc<dyn CaptureAdapter>) -> Self {
        self.adapters.push(adapter);
        self
    }

    pub fn adapter_for(&self, step: StepId) -> Option<&Arc<dyn CaptureAdapter>> {
        self.adapters.iter().find(|a| a.handles(step))
    }
}

#[async_trait]
impl CaptureAdapter for CaptureRouter {
    fn handles(&self, step: StepId) -> bool {
        self.adapter_for(step).is_some()
    }

    async fn capture(&self, step: StepId, cancel: &CancellationToken) -> Result<StepResult> {
        let adapter = self
            .adapter_for(step)
            .ok_or_else(|| CaptureError::DeviceUnavailable {
                step,
                reason: "no capture adapter for this step".to_string(),
            })?;

        debug!("Routing capture for {}", step);
        adapter.capture(step, cancel).await
    }
}
