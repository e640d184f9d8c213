use crate::error::{CaptureError, Result};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, trace};

/// Exclusive ownership of one capture device.
///
/// At most one `DeviceLease` exists per slot. A second acquisition while the
/// lease is alive fails with `DeviceBusy` instead of waiting.
#[derive(Debug, Clone)]
pub struct DeviceSlot {
    name: Arc<str>,
    held: Arc<AtomicBool>,
}

impl DeviceSlot {
    pub fn new(name: impl Into<String>) -> Self {
        let name: String = name.into();
        Self {
            name: Arc::from(name),
            held: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Whether a capture currently owns the device
    pub fn is_held(&self) -> bool {
        self.held.load(Ordering::Acquire)
    }

    pub fn try_acquire(&self) -> Result<DeviceLease> {
        if self
            .held
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            debug!("Device '{}' is already held", self.name);
            return Err(CaptureError::DeviceBusy {
                device: self.name.to_string(),
            }
            .into());
        }

        trace!("Device '{}' acquired", self.name);
        Ok(DeviceLease {
            slot: self.clone(),
        })
    }
}

/// Held device. Dropping the lease releases the device, whatever path the
/// capture took out.
#[derive(Debug)]
pub struct DeviceLease {
    slot: DeviceSlot,
}

impl DeviceLease {
    pub fn device(&self) -> &str {
        self.slot.name()
    }
}

impl Drop for DeviceLease {
    fn drop(&mut self) {
        self.slot.held.store(false, Ordering::Release);
        trace!("Device '{}' released", self.slot.name);
    }
}
