use prometheus::{Encoder, IntCounter, IntGauge, Registry, TextEncoder};
use webcam_capture::CameraManager;

#[derive(Clone)]
pub struct StreamMetrics {
    pub chunks_streamed: IntCounter,
    pub streams_started: IntCounter,
    pub captures: IntCounter,
    pub capture_failures: IntCounter,
    pub device_open: IntGauge,
    pub device_acquisitions: IntGauge,
}

#[derive(Clone)]
pub struct MetricsHub {
    pub registry: Registry,
    pub stream: StreamMetrics,
}

fn counter(name: &str, help: &str) -> Result<IntCounter, String> {
    IntCounter::new(name, help).map_err(|e| format!("metrics init error: {e}"))
}

fn gauge(name: &str, help: &str) -> Result<IntGauge, String> {
    IntGauge::new(name, help).map_err(|e| format!("metrics init error: {e}"))
}

impl MetricsHub {
    pub fn new() -> Result<Self, String> {
        let registry = Registry::new();
        let stream = StreamMetrics {
            chunks_streamed: counter(
                "webcam_chunks_streamed_total",
                "MJPEG parts sent to feed clients",
            )?,
            streams_started: counter("webcam_streams_started_total", "Feed responses started")?,
            captures: counter("webcam_captures_total", "Frames captured to storage")?,
            capture_failures: counter(
                "webcam_capture_failures_total",
                "Capture requests that failed",
            )?,
            device_open: gauge("webcam_device_open", "1 while the camera is held open")?,
            device_acquisitions: gauge(
                "webcam_device_acquisitions",
                "Successful camera acquisitions since start",
            )?,
        };
        let _ = registry.register(Box::new(stream.chunks_streamed.clone()));
        let _ = registry.register(Box::new(stream.streams_started.clone()));
        let _ = registry.register(Box::new(stream.captures.clone()));
        let _ = registry.register(Box::new(stream.capture_failures.clone()));
        let _ = registry.register(Box::new(stream.device_open.clone()));
        let _ = registry.register(Box::new(stream.device_acquisitions.clone()));
        Ok(Self { registry, stream })
    }

    /// Refresh device gauges from the manager.
    pub fn observe(&self, camera: &CameraManager) {
        self.stream.device_open.set(i64::from(camera.is_open()));
        self.stream
            .device_acquisitions
            .set(i64::try_from(camera.acquisitions()).unwrap_or(i64::MAX));
    }

    pub fn encode_text(&self) -> String {
        let mut buf = Vec::new();
        let encoder = TextEncoder::new();
        if let Err(e) = encoder.encode(&self.registry.gather(), &mut buf) {
            return format!("error encoding metrics: {e}");
        }
        String::from_utf8(buf).unwrap_or_default()
    }
}
