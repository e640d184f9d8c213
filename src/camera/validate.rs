use super::source::Frame;
use crate::config::CameraConfig;
use crate::error::{CaptureError, Result};
use crate::steps::StepId;

/// Acceptance limits for captured frames
#[derive(Debug, Clone, Copy)]
pub struct FrameLimits {
    pub check_image: bool,
    pub min_dimension: u32,
    pub max_dimension: u32,
}

impl FrameLimits {
    pub fn from_config(config: &CameraConfig) -> Self {
        Self {
            check_image: config.validate_images,
            min_dimension: config.min_dimension,
            max_dimension: config.max_dimension,
        }
    }
}

impl Default for FrameLimits {
    fn default() -> Self {
        Self {
            check_image: true,
            min_dimension: 50,
            max_dimension: 4000,
        }
    }
}

/// Reject frames the analyzers would refuse anyway
pub fn validate_frame(step: StepId, frame: &Frame, limits: &FrameLimits) -> Result<()> {
    if frame.is_empty() {
        return Err(CaptureError::InvalidPayload {
            step,
            reason: "captured image is empty".to_string(),
        }
        .into());
    }

    if limits.check_image {
        check_dimensions(step, frame, limits)?;
    }

    Ok(())
}

#[cfg(feature = "image_validation")]
fn check_dimensions(step: StepId, frame: &Frame, limits: &FrameLimits) -> Result<()> {
    let invalid = |reason: String| CaptureError::InvalidPayload { step, reason };

    let reader = image::io::Reader::new(std::io::Cursor::new(frame.data.as_ref()))
        .with_guessed_format()
        .map_err(|e| invalid(format!("unreadable image: {}", e)))?;

    if reader.format().is_none() {
        return Err(invalid("unrecognised image format".to_string()).into());
    }

    let (width, height) = reader
        .into_dimensions()
        .map_err(|e| invalid(format!("cannot decode image header: {}", e)))?;

    let range = limits.min_dimension..=limits.max_dimension;
    if !range.contains(&width) || !range.contains(&height) {
        return Err(invalid(format!(
            "image is {}x{}, sides must be within {}..={} px",
            width, height, limits.min_dimension, limits.max_dimension
        ))
        .into());
    }

    Ok(())
}

#[cfg(not(feature = "image_validation"))]
fn check_dimensions(_step: StepId, _frame: &Frame, _limits: &FrameLimits) -> Result<()> {
    Ok(())
}
