use crate::mount::ops::loop_detach;

/// Detaches the loop device on drop unless disarmed; keeps every failure
/// path in image creation from leaking a /dev/loopN slot.
pub struct LoopGuard {
    device: Option<String>,
}

impl LoopGuard {
    pub fn new(device: String) -> Self {
        Self {
            device: Some(device),
        }
    }

    pub fn device(&self) -> &str {
        self.device.as_deref().unwrap_or("")
    }

    /// Detach now and report the outcome instead of swallowing it in drop.
    pub fn detach(mut self) -> crate::error::Result<()> {
        match self.device.take() {
            Some(device) => loop_detach(&device),
            None => Ok(()),
        }
    }
}

impl Drop for LoopGuard {
    fn drop(&mut self) {
        if let Some(device) = self.device.take() {
            let _ = loop_detach(&device);
        }
    }
}
