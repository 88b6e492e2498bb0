use crate::{CameraDriver, CameraSource, CaptureError, Error, PixelFormat, RawFrame, Result};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use time::OffsetDateTime;

const WIDTH: u32 = 320;
const HEIGHT: u32 = 240;

#[derive(Default)]
struct MockState {
    opens: AtomicUsize,
    reads: AtomicUsize,
    fail_open: AtomicBool,
    fail_reads: AtomicBool,
}

/// In-process camera backend producing a moving gray ramp.
///
/// Clones share state, so a test can keep one clone to flip failure modes and
/// inspect counters while the manager owns another.
#[derive(Clone)]
pub struct MockDriver {
    state: Arc<MockState>,
    frame_interval: Duration,
}

impl MockDriver {
    pub fn new() -> Self {
        Self {
            state: Arc::default(),
            frame_interval: Duration::from_millis(33),
        }
    }

    /// Simulated device latency per read.
    pub fn with_frame_interval(mut self, interval: Duration) -> Self {
        self.frame_interval = interval;
        self
    }

    pub fn set_fail_open(&self, fail: bool) {
        self.state.fail_open.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_reads(&self, fail: bool) {
        self.state.fail_reads.store(fail, Ordering::SeqCst);
    }

    /// Successful device acquisitions.
    pub fn opens(&self) -> usize {
        self.state.opens.load(Ordering::SeqCst)
    }

    /// Reads that reached the simulated hardware.
    pub fn reads(&self) -> usize {
        self.state.reads.load(Ordering::SeqCst)
    }
}

impl Default for MockDriver {
    fn default() -> Self {
        Self::new()
    }
}

impl CameraDriver for MockDriver {
    fn name(&self) -> &'static str {
        "mock"
    }

    fn open(&self, spec: &str) -> Result<Box<dyn CameraSource>> {
        if self.state.fail_open.load(Ordering::SeqCst) {
            return Err(Error::DeviceUnavailable {
                device: spec.to_string(),
                reason: "mock device refused to open".into(),
            });
        }
        self.state.opens.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(MockCamera {
            counter: 0,
            state: Arc::clone(&self.state),
            frame_interval: self.frame_interval,
        }))
    }
}

pub struct MockCamera {
    counter: u64,
    state: Arc<MockState>,
    frame_interval: Duration,
}

impl CameraSource for MockCamera {
    fn read(&mut self) -> Result<RawFrame> {
        self.state.reads.fetch_add(1, Ordering::SeqCst);
        if !self.frame_interval.is_zero() {
            std::thread::sleep(self.frame_interval);
        }
        if self.state.fail_reads.load(Ordering::SeqCst) {
            return Err(CaptureError::ReadFailed("mock sensor returned no data".into()).into());
        }
        self.counter += 1;
        // Gray ramp that scrolls one pixel per frame
        let shift = self.counter as u32;
        let mut data = vec![0u8; (WIDTH * HEIGHT) as usize];
        for y in 0..HEIGHT {
            for x in 0..WIDTH {
                let idx = (y * WIDTH + x) as usize;
                data[idx] = ((x + y + shift) % 256) as u8;
            }
        }
        Ok(RawFrame {
            width: WIDTH,
            height: HEIGHT,
            pixel_format: PixelFormat::Gray8,
            data,
            ts: Some(OffsetDateTime::now_utc()),
        })
    }
}
