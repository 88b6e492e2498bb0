use thiserror::Error;

pub type Result<T, E = Error> = core::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("camera {device} unavailable: {reason}")]
    DeviceUnavailable { device: String, reason: String },
    #[error(transparent)]
    Capture(#[from] CaptureError),
    #[error("encode failed: {0}")]
    Encode(String),
    #[error("I/O error: {0}")]
    Io(String),
    #[error("invalid configuration: {0}")]
    Config(String),
}

/// Failures of a single frame read.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CaptureError {
    #[error("camera not opened")]
    NotOpened,
    #[error("read failed: {0}")]
    ReadFailed(String),
}

impl Error {
    pub fn is_device_unavailable(&self) -> bool {
        matches!(self, Error::DeviceUnavailable { .. })
    }

    pub fn is_capture(&self) -> bool {
        matches!(self, Error::Capture(_))
    }
}
