//! webcam-capture: shared camera lifecycle, JPEG encoding and MJPEG streams
//!
//! One [`CameraManager`] owns the single capture device and serializes every
//! open, close and read against it. [`FrameStream`] pulls frames through a
//! [`FrameEncoder`] for a live feed. The default build enables a `mock`
//! backend so binaries run on hosts without a camera; `opencv` adds real
//! devices.

mod types;
pub use types::{EncodedFrame, PixelFormat, RawFrame};

mod error;
pub use error::{CaptureError, Error, Result};

mod traits;
pub use traits::{CameraDriver, CameraSource};

mod manager;
pub use manager::{CameraManager, DeviceHandle, ReleaseGuard};

mod encoder;
pub use encoder::{FrameEncoder, JpegFrameEncoder, DEFAULT_JPEG_QUALITY};

mod flag;
pub use flag::StreamingFlag;

pub mod stream;
pub use stream::{FrameStream, StopReason, StreamState};

mod config;
pub use config::CameraConfig;

#[cfg(feature = "mock")]
mod mock;
#[cfg(feature = "mock")]
pub use mock::{MockCamera, MockDriver};

#[cfg(feature = "opencv")]
mod opencv_backend;
#[cfg(feature = "opencv")]
pub use opencv_backend::{OpenCvCamera, OpenCvDriver};
