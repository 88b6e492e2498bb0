use crate::{CameraDriver, CameraSource, CaptureError, Error, PixelFormat, RawFrame, Result};
use opencv::prelude::*;
use opencv::{core, imgproc, videoio};
use time::OffsetDateTime;
use tracing::debug;

/// V4L2/AVFoundation/MSMF capture through OpenCV's `VideoCapture`.
#[derive(Clone, Copy, Debug, Default)]
pub struct OpenCvDriver;

impl CameraDriver for OpenCvDriver {
    fn name(&self) -> &'static str {
        "opencv"
    }

    fn open(&self, spec: &str) -> Result<Box<dyn CameraSource>> {
        let unavailable = |reason: String| Error::DeviceUnavailable {
            device: spec.to_string(),
            reason,
        };
        // Parse spec as index if numeric, else try to open as path
        let cap = if let Ok(idx) = spec.parse::<i32>() {
            videoio::VideoCapture::new(idx, videoio::CAP_ANY)
                .map_err(|e| unavailable(e.to_string()))?
        } else {
            videoio::VideoCapture::from_file(spec, videoio::CAP_ANY)
                .map_err(|e| unavailable(e.to_string()))?
        };
        let opened =
            videoio::VideoCapture::is_opened(&cap).map_err(|e| unavailable(e.to_string()))?;
        if !opened {
            return Err(unavailable("device did not open".into()));
        }
        Ok(Box::new(OpenCvCamera { cap }))
    }
}

pub struct OpenCvCamera {
    cap: videoio::VideoCapture,
}

fn read_failed(e: impl ToString) -> Error {
    CaptureError::ReadFailed(e.to_string()).into()
}

impl CameraSource for OpenCvCamera {
    fn read(&mut self) -> Result<RawFrame> {
        let mut mat = core::Mat::default();
        let ok = self.cap.read(&mut mat).map_err(read_failed)?;
        if !ok || mat.empty() {
            return Err(read_failed("empty frame"));
        }

        let width = mat.cols() as u32;
        let height = mat.rows() as u32;

        let mut rgb = core::Mat::default();
        imgproc::cvt_color(&mat, &mut rgb, imgproc::COLOR_BGR2RGB, 0).map_err(read_failed)?;

        let data = rgb.data_bytes().map_err(read_failed)?.to_vec();
        Ok(RawFrame {
            width,
            height,
            pixel_format: PixelFormat::Rgb8,
            data,
            ts: Some(OffsetDateTime::now_utc()),
        })
    }

    fn release(&mut self) {
        if let Err(e) = self.cap.release() {
            debug!("VideoCapture release reported: {e}");
        }
    }
}
