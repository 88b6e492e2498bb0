use crate::{EncodedFrame, Error, PixelFormat, RawFrame, Result};
use bytes::Bytes;
use image::codecs::jpeg::JpegEncoder;
use image::{GrayImage, RgbImage};

pub const DEFAULT_JPEG_QUALITY: u8 = 80;

/// Compresses raw frames for transport or storage.
pub trait FrameEncoder: Send + Sync {
    /// MIME type of the produced bytes.
    fn content_type(&self) -> &'static str;

    fn encode(&self, frame: &RawFrame) -> Result<EncodedFrame>;
}

/// Baseline JPEG at a fixed quality.
#[derive(Clone, Copy, Debug)]
pub struct JpegFrameEncoder {
    quality: u8,
}

impl JpegFrameEncoder {
    pub fn new(quality: u8) -> Result<Self> {
        if !(1..=100).contains(&quality) {
            return Err(Error::Config(format!(
                "JPEG quality must be within 1..=100, got {quality}"
            )));
        }
        Ok(Self { quality })
    }

    pub fn quality(&self) -> u8 {
        self.quality
    }
}

impl Default for JpegFrameEncoder {
    fn default() -> Self {
        Self {
            quality: DEFAULT_JPEG_QUALITY,
        }
    }
}

fn encode_error(e: impl ToString) -> Error {
    Error::Encode(e.to_string())
}

impl FrameEncoder for JpegFrameEncoder {
    fn content_type(&self) -> &'static str {
        "image/jpeg"
    }

    fn encode(&self, frame: &RawFrame) -> Result<EncodedFrame> {
        let (width, height) = (frame.width, frame.height);
        if width == 0 || height == 0 {
            return Err(Error::Encode(format!("invalid frame size {width}x{height}")));
        }
        if frame.data.len() != frame.expected_len() {
            return Err(Error::Encode(format!(
                "buffer holds {} bytes, {width}x{height} {:?} needs {}",
                frame.data.len(),
                frame.pixel_format,
                frame.expected_len()
            )));
        }

        let mut jpeg = Vec::new();
        let mut encoder = JpegEncoder::new_with_quality(&mut jpeg, self.quality);
        match frame.pixel_format {
            PixelFormat::Gray8 => {
                let img = GrayImage::from_raw(width, height, frame.data.clone())
                    .ok_or_else(|| encode_error("gray buffer does not match geometry"))?;
                encoder.encode_image(&img).map_err(encode_error)?;
            }
            PixelFormat::Rgb8 => {
                let img = RgbImage::from_raw(width, height, frame.data.clone())
                    .ok_or_else(|| encode_error("rgb buffer does not match geometry"))?;
                encoder.encode_image(&img).map_err(encode_error)?;
            }
            PixelFormat::Bgr8 => {
                let mut rgb = frame.data.clone();
                for px in rgb.chunks_exact_mut(3) {
                    px.swap(0, 2);
                }
                let img = RgbImage::from_raw(width, height, rgb)
                    .ok_or_else(|| encode_error("bgr buffer does not match geometry"))?;
                encoder.encode_image(&img).map_err(encode_error)?;
            }
        }

        Ok(EncodedFrame {
            data: Bytes::from(jpeg),
            width,
            height,
        })
    }
}
