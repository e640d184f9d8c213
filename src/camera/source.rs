use crate::error::{CaptureError, Result};
use crate::steps::StepId;
use async_trait::async_trait;
use bytes::Bytes;
use std::path::PathBuf;
use std::time::SystemTime;
use tracing::debug;

/// One still image handed to an analyzer
#[derive(Debug, Clone)]
pub struct Frame {
    pub data: Bytes,
    pub file_name: String,
    pub mime_type: String,
    pub captured_at: SystemTime,
}

impl Frame {
    pub fn new(data: impl Into<Bytes>, file_name: impl Into<String>) -> Self {
        let file_name = file_name.into();
        let mime_type = mime_for(&file_name).to_string();
        Self {
            data: data.into(),
            file_name,
            mime_type,
            captured_at: SystemTime::now(),
        }
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

fn mime_for(file_name: &str) -> &'static str {
    let lower = file_name.to_ascii_lowercase();
    if lower.ends_with(".png") {
        "image/png"
    } else if lower.ends_with(".webp") {
        "image/webp"
    } else {
        "image/jpeg"
    }
}

/// Source of still frames for image steps: a camera stream, a picked file
#[async_trait]
pub trait FrameSource: Send + Sync {
    async fn grab_frame(&self, step: StepId) -> Result<Frame>;
}

/// Reads the frame for a step from an image file on disk
pub struct FileFrameSource {
    paths: Vec<(StepId, PathBuf)>,
}

impl FileFrameSource {
    pub fn new() -> Self {
        Self { paths: Vec::new() }
    }

    pub fn with_file(mut self, step: StepId, path: impl Into<PathBuf>) -> Self {
        self.paths.push((step, path.into()));
        self
    }
}

impl Default for FileFrameSource {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl FrameSource for FileFrameSource {
    async fn grab_frame(&self, step: StepId) -> Result<Frame> {
        let path = self
            .paths
            .iter()
            .find(|(s, _)| *s == step)
            .map(|(_, p)| p)
            .ok_or_else(|| CaptureError::DeviceUnavailable {
                step,
                reason: "no image file selected".to_string(),
            })?;

        let data = tokio::fs::read(path)
            .await
            .map_err(|e| CaptureError::DeviceUnavailable {
                step,
                reason: format!("cannot read {}: {}", path.display(), e),
            })?;

        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| format!("{}.jpg", step));

        debug!("Read {} bytes for {} from {}", data.len(), step, path.display());
        Ok(Frame::new(data, file_name))
    }
}

/// Hands out fixed in-memory frames
pub struct StaticFrameSource {
    frames: Vec<(StepId, Frame)>,
}

impl StaticFrameSource {
    pub fn new() -> Self {
        Self { frames: Vec::new() }
    }

    pub fn with_frame(mut self, step: StepId, frame: Frame) -> Self {
        self.frames.push((step, frame));
        self
    }
}

impl Default for StaticFrameSource {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl FrameSource for StaticFrameSource {
    async fn grab_frame(&self, step: StepId) -> Result<Frame> {
        self.frames
            .iter()
            .find(|(s, _)| *s == step)
            .map(|(_, frame)| frame.clone())
            .ok_or_else(|| {
                CaptureError::DeviceUnavailable {
                    step,
                    reason: "no frame available".to_string(),
                }
                .into()
            })
    }
}
