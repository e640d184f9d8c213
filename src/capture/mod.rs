mod camera;
mod form;
mod router;
#[cfg(test)]
mod tests;

use crate::error::Result;
use crate::results::StepResult;
use crate::steps::StepId;
use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

pub use camera::CameraCapture;
pub use form::{FormCapture, FormInput, FormSource, StaticFormSource, REQUIRED_ANSWERS};
pub use router::CaptureRouter;

/// Produces the result for one step.
///
/// A capture either returns a result or an error, never a partial result.
/// Once `cancel` fires the capture stops with `CaptureError::Cancelled` and
/// releases whatever device it held.
#[async_trait]
pub trait CaptureAdapter: Send + Sync {
    fn handles(&self, step: StepId) -> bool;

    async fn capture(&self, step: StepId, cancel: &CancellationToken) -> Result<StepResult>;
}
