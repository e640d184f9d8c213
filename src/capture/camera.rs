use super::CaptureAdapter;
use crate::analyzer::ImageAnalyzer;
use crate::camera::{validate_frame, DeviceSlot, FrameLimits, FrameSource};
use crate::config::CameraConfig;
use crate::error::{CaptureError, Result};
use crate::results::{ImageAnalysis, StepResult};
use crate::steps::StepId;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

const DEFAULT_CAPTURE_TIMEOUT: Duration = Duration::from_secs(30);

/// Capture for image steps: grab a frame, check it, have it analyzed
pub struct CameraCapture {
    slot: DeviceSlot,
    frames: Arc<dyn FrameSource>,
    analyzer: Arc<dyn ImageAnalyzer>,
    limits: FrameLimits,
    timeout: Duration,
}

impl CameraCapture {
    pub fn new(
        slot: DeviceSlot,
        frames: Arc<dyn FrameSource>,
        analyzer: Arc<dyn ImageAnalyzer>,
    ) -> Self {
        Self {
            slot,
            frames,
            analyzer,
            limits: FrameLimits::default(),
            timeout: DEFAULT_CAPTURE_TIMEOUT,
        }
    }

    pub fn from_config(
        config: &CameraConfig,
        frames: Arc<dyn FrameSource>,
        analyzer: Arc<dyn ImageAnalyzer>,
    ) -> Self {
        Self::new(DeviceSlot::new(config.device.clone()), frames, analyzer)
            .with_limits(FrameLimits::from_config(config))
            .with_timeout(config.capture_timeout())
    }

    pub fn with_limits(mut self, limits: FrameLimits) -> Self {
        self.limits = limits;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn slot(&self) -> &DeviceSlot {
        &self.slot
    }

    pub fn is_device_held(&self) -> bool {
        self.slot.is_held()
    }

    async fn attempt(&self, step: StepId) -> Result<StepResult> {
        self.analyzer.health(step).await?;

        let frame = self.frames.grab_frame(step).await?;
        validate_frame(step, &frame, &self.limits)?;
        debug!("Frame for {} accepted ({} bytes)", step, frame.len());

        let reply = self.analyzer.analyze(step, &frame).await?;
        let analysis = ImageAnalysis::from_response(reply);

        StepResult::image(step, analysis).ok_or_else(|| {
            CaptureError::InvalidPayload {
                step,
                reason: "not an image step".to_string(),
            }
            .into()
        })
    }
}

#[async_trait]
impl CaptureAdapter for CameraCapture {
    fn handles(&self, step: StepId) -> bool {
        step.is_image_step()
    }

    async fn capture(&self, step: StepId, cancel: &CancellationToken) -> Result<StepResult> {
        if cancel.is_cancelled() {
            return Err(CaptureError::Cancelled { step }.into());
        }

        // Held until this function returns, on every path
        let lease = self.slot.try_acquire()?;
        info!("Capturing {} on '{}'", step, lease.device());

        let outcome = tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(CaptureError::Cancelled { step }.into()),
            attempt = tokio::time::timeout(self.timeout, self.attempt(step)) => match attempt {
                Ok(result) => result,
                Err(_) => Err(CaptureError::Timeout {
                    step,
                    after: self.timeout,
                }
                .into()),
            },
        };

        match &outcome {
            Ok(result) => info!(
                "Captured {} (risk: {})",
                step,
                result
                    .risk_level()
                    .map(|r| r.to_string())
                    .unwrap_or_else(|| "n/a".to_string())
            ),
            Err(e) => warn!("Capture for {} failed: {}", step, e),
        }

        drop(lease);
        outcome
    }
}
