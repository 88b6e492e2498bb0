use crate::encoder::DEFAULT_JPEG_QUALITY;
use crate::{Error, JpegFrameEncoder, Result};
use serde::{Deserialize, Serialize};

/// Camera settings shared by every frame consumer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CameraConfig {
    /// Device index (e.g. "0") or a path/URL understood by the backend.
    pub device: String,
    pub jpeg_quality: u8,
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            device: "0".to_string(),
            jpeg_quality: DEFAULT_JPEG_QUALITY,
        }
    }
}

impl CameraConfig {
    pub fn validate(&self) -> Result<()> {
        if self.device.trim().is_empty() {
            return Err(Error::Config("camera device must not be empty".into()));
        }
        JpegFrameEncoder::new(self.jpeg_quality).map(|_| ())
    }

    pub fn encoder(&self) -> Result<JpegFrameEncoder> {
        JpegFrameEncoder::new(self.jpeg_quality)
    }
}
