//! Multipart JPEG (MJPEG) frame sequence.
//!
//! Browsers render `multipart/x-mixed-replace` bodies natively: each part
//! replaces the previous image, so `<img src="/video_feed">` is a live view.

use crate::{CameraManager, CaptureError, EncodedFrame, Error, FrameEncoder, StreamingFlag};
use bytes::Bytes;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, error, info};

/// Boundary token separating parts of the multipart body.
pub const BOUNDARY: &str = "frame";

/// `Content-Type` header value for a stream built from [`multipart_chunk`].
pub fn stream_content_type() -> String {
    format!("multipart/x-mixed-replace; boundary={BOUNDARY}")
}

/// Frame one encoded image as a multipart part.
pub fn multipart_chunk(content_type: &str, frame: &EncodedFrame) -> Bytes {
    let head = format!("--{BOUNDARY}\r\nContent-Type: {content_type}\r\n\r\n");
    let mut out = Vec::with_capacity(head.len() + frame.data.len() + 2);
    out.extend_from_slice(head.as_bytes());
    out.extend_from_slice(&frame.data);
    out.extend_from_slice(b"\r\n");
    Bytes::from(out)
}

/// Why a stream reached its terminal state.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StopReason {
    FlagCleared,
    DeviceClosed,
    CaptureFailed(String),
    EncodeFailed(String),
}

impl fmt::Display for StopReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StopReason::FlagCleared => write!(f, "streaming flag cleared"),
            StopReason::DeviceClosed => write!(f, "camera closed"),
            StopReason::CaptureFailed(e) => write!(f, "capture failed: {e}"),
            StopReason::EncodeFailed(e) => write!(f, "encode failed: {e}"),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StreamState {
    Running,
    Stopped(StopReason),
}

/// Pull-based chunk generator for one client's feed.
///
/// Every `next()` performs one blocking read/encode cycle. The first failure
/// or stop condition moves it to [`StreamState::Stopped`] for good; it never
/// closes the camera itself.
pub struct FrameStream {
    camera: Arc<CameraManager>,
    encoder: Arc<dyn FrameEncoder>,
    flag: StreamingFlag,
    state: StreamState,
    chunks: u64,
}

impl FrameStream {
    pub fn new(
        camera: Arc<CameraManager>,
        encoder: Arc<dyn FrameEncoder>,
        flag: StreamingFlag,
    ) -> Self {
        Self {
            camera,
            encoder,
            flag,
            state: StreamState::Running,
            chunks: 0,
        }
    }

    pub fn state(&self) -> &StreamState {
        &self.state
    }

    /// Chunks emitted so far.
    pub fn chunks(&self) -> u64 {
        self.chunks
    }

    fn stop(&mut self, reason: StopReason) {
        match &reason {
            StopReason::FlagCleared | StopReason::DeviceClosed => {
                debug!(chunks = self.chunks, "Stream ended: {reason}")
            }
            StopReason::CaptureFailed(_) | StopReason::EncodeFailed(_) => {
                error!(chunks = self.chunks, operation = "stream", "Stream ended: {reason}")
            }
        }
        self.state = StreamState::Stopped(reason);
    }

    fn pull(&mut self) -> Result<Bytes, StopReason> {
        if !self.flag.get() {
            return Err(StopReason::FlagCleared);
        }
        if !self.camera.is_open() {
            return Err(StopReason::DeviceClosed);
        }
        let raw = self
            .camera
            .read_frame()
            .map_err(read_stop_reason)?;
        let encoded = self
            .encoder
            .encode(&raw)
            .map_err(|e| StopReason::EncodeFailed(e.to_string()))?;
        Ok(multipart_chunk(self.encoder.content_type(), &encoded))
    }
}

/// A close can land between the `is_open` check and the read; that is the
/// device closing, not a capture failure.
fn read_stop_reason(err: Error) -> StopReason {
    match err {
        Error::Capture(CaptureError::NotOpened) => StopReason::DeviceClosed,
        other => StopReason::CaptureFailed(other.to_string()),
    }
}

impl Iterator for FrameStream {
    type Item = Bytes;

    fn next(&mut self) -> Option<Bytes> {
        if self.state != StreamState::Running {
            return None;
        }
        match self.pull() {
            Ok(chunk) => {
                self.chunks += 1;
                if self.chunks == 1 {
                    info!(device = %self.camera.device(), "Streaming first frame");
                }
                Some(chunk)
            }
            Err(reason) => {
                self.stop(reason);
                None
            }
        }
    }
}
