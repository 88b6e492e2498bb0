use crate::{RawFrame, Result};

/// An acquired camera. Dropping it must release the hardware.
pub trait CameraSource: Send {
    /// Read a single frame. Blocks until the device delivers one.
    fn read(&mut self) -> Result<RawFrame>;

    /// Release the device early. The default relies on `Drop`.
    fn release(&mut self) {}
}

/// Opens camera sources for a backend.
pub trait CameraDriver: Send + Sync {
    /// Short backend name used in logs.
    fn name(&self) -> &'static str;

    /// Open a camera source by device index or path string.
    ///
    /// Fails with [`crate::Error::DeviceUnavailable`] when the device cannot be acquired.
    fn open(&self, spec: &str) -> Result<Box<dyn CameraSource>>;
}
