//! Exclusive ownership of the single capture device.

use crate::{CameraDriver, CameraSource, CaptureError, RawFrame, Result};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use time::OffsetDateTime;
use tracing::{debug, error, info, warn};

/// A live claim on the capture hardware. Dropping it releases the device.
pub struct DeviceHandle {
    device: String,
    source: Box<dyn CameraSource>,
    opened_at: OffsetDateTime,
    frames_read: u64,
}

impl DeviceHandle {
    pub fn device(&self) -> &str {
        &self.device
    }

    pub fn opened_at(&self) -> OffsetDateTime {
        self.opened_at
    }

    pub fn frames_read(&self) -> u64 {
        self.frames_read
    }
}

impl Drop for DeviceHandle {
    fn drop(&mut self) {
        self.source.release();
        let open_for = OffsetDateTime::now_utc() - self.opened_at;
        info!(
            device = %self.device,
            frames = self.frames_read,
            "Camera released after {:.1}s",
            open_for.as_seconds_f64()
        );
    }
}

/// Sole gateway to the capture device.
///
/// Every state change and every read goes through one mutex, so concurrent
/// requests can never observe a torn or doubly-acquired handle. `is_open`
/// reads an atomic mirror of the state and never waits on the lock.
pub struct CameraManager {
    device: String,
    driver: Arc<dyn CameraDriver>,
    handle: Mutex<Option<DeviceHandle>>,
    open: AtomicBool,
    acquisitions: AtomicU64,
}

impl CameraManager {
    pub fn new(device: impl Into<String>, driver: Arc<dyn CameraDriver>) -> Self {
        Self {
            device: device.into(),
            driver,
            handle: Mutex::new(None),
            open: AtomicBool::new(false),
            acquisitions: AtomicU64::new(0),
        }
    }

    pub fn device(&self) -> &str {
        &self.device
    }

    pub fn backend(&self) -> &'static str {
        self.driver.name()
    }

    fn lock(&self) -> MutexGuard<'_, Option<DeviceHandle>> {
        // A panic mid-read leaves the Option itself consistent.
        self.handle.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Acquire the device. No-op if it is already open.
    pub fn open(&self) -> Result<()> {
        let mut slot = self.lock();
        if slot.is_some() {
            debug!(device = %self.device, "Camera already open");
            return Ok(());
        }
        debug!(device = %self.device, backend = self.driver.name(), "Initializing camera...");
        let source = self.driver.open(&self.device).map_err(|e| {
            error!(device = %self.device, operation = "open", "Could not start camera: {e}");
            e
        })?;
        *slot = Some(DeviceHandle {
            device: self.device.clone(),
            source,
            opened_at: OffsetDateTime::now_utc(),
            frames_read: 0,
        });
        self.acquisitions.fetch_add(1, Ordering::SeqCst);
        self.open.store(true, Ordering::SeqCst);
        info!(device = %self.device, backend = self.driver.name(), "Camera initialized");
        Ok(())
    }

    /// Release the device. No-op if it is already closed.
    pub fn close(&self) {
        let mut slot = self.lock();
        self.open.store(false, Ordering::SeqCst);
        match slot.take() {
            Some(handle) => {
                debug!(device = %self.device, "Releasing camera...");
                drop(handle);
            }
            None => debug!(device = %self.device, "Camera already closed"),
        }
    }

    pub fn is_open(&self) -> bool {
        self.open.load(Ordering::SeqCst)
    }

    /// Successful device acquisitions since this manager was created.
    pub fn acquisitions(&self) -> u64 {
        self.acquisitions.load(Ordering::SeqCst)
    }

    /// Read one frame from the open device.
    ///
    /// Holds the device lock for the whole blocking read; a concurrent
    /// `close` waits for the read to finish.
    pub fn read_frame(&self) -> Result<RawFrame> {
        let mut slot = self.lock();
        let Some(handle) = slot.as_mut() else {
            return Err(CaptureError::NotOpened.into());
        };
        match handle.source.read() {
            Ok(frame) => {
                handle.frames_read += 1;
                Ok(frame)
            }
            Err(e) => {
                warn!(device = %self.device, operation = "read_frame", "Failed to read frame: {e}");
                Err(match e {
                    err @ crate::Error::Capture(_) => err,
                    other => CaptureError::ReadFailed(other.to_string()).into(),
                })
            }
        }
    }

    /// Guard that closes the device when dropped, whatever else still holds the manager.
    pub fn release_guard(self: &Arc<Self>) -> ReleaseGuard {
        ReleaseGuard {
            manager: Arc::clone(self),
        }
    }
}

impl Drop for CameraManager {
    fn drop(&mut self) {
        self.close();
    }
}

/// Scoped device release tied to the owner's lifetime (typically `main`).
#[must_use = "the camera is released when the guard is dropped"]
pub struct ReleaseGuard {
    manager: Arc<CameraManager>,
}

impl Drop for ReleaseGuard {
    fn drop(&mut self) {
        if self.manager.is_open() {
            info!(device = %self.manager.device(), "Shutting down, closing camera");
        }
        self.manager.close();
    }
}
