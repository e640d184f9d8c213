mod slot;
mod source;
mod validate;

pub use slot::{DeviceLease, DeviceSlot};
pub use source::{FileFrameSource, Frame, FrameSource, StaticFrameSource};
pub use validate::{validate_frame, FrameLimits};
