use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use thiserror::Error;

use crate::capture::domain::camera_device::CameraDevice;
use crate::capture::domain::camera_settings::CameraSettings;
use crate::capture::frame_slot::FrameSlot;
use crate::capture::infrastructure::ffmpeg_camera::FfmpegCamera;
use crate::shared::frame::Frame;

/// Pause after a failed device read before retrying.
const READ_RETRY_PAUSE: Duration = Duration::from_millis(10);

/// Consecutive read failures before the capture loop logs at warn level.
const FAILURE_WARN_THRESHOLD: u32 = 50;

#[derive(Error, Debug)]
pub enum CaptureError {
    #[error("camera device {device} unavailable: {source}")]
    DeviceUnavailable {
        device: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
    #[error("capture thread already started")]
    AlreadyStarted,
    #[error("failed to spawn capture thread: {0}")]
    ThreadSpawn(#[source] std::io::Error),
}

/// Owns a camera and keeps the newest frame available to readers.
///
/// Layout: `device → capture thread → FrameSlot → read()`
///
/// The capture thread is the only code that touches the device once
/// started. `read` never blocks on the device.
pub struct FrameSource {
    device: Option<Box<dyn CameraDevice>>,
    slot: Arc<FrameSlot>,
    stopped: Arc<AtomicBool>,
    worker: Option<JoinHandle<Box<dyn CameraDevice>>>,
}

impl FrameSource {
    /// Opens `/dev/video{device_index}` with the requested capture settings.
    pub fn open(device_index: u32, settings: &CameraSettings) -> Result<Self, CaptureError> {
        let camera = FfmpegCamera::open(device_index, settings)?;
        Ok(Self::with_device(Box::new(camera)))
    }

    pub fn with_device(device: Box<dyn CameraDevice>) -> Self {
        Self {
            device: Some(device),
            slot: Arc::new(FrameSlot::new()),
            stopped: Arc::new(AtomicBool::new(false)),
            worker: None,
        }
    }

    /// Launches the background capture thread.
    pub fn start(&mut self) -> Result<&mut Self, CaptureError> {
        if self.worker.is_some() {
            return Err(CaptureError::AlreadyStarted);
        }
        let Some(device) = self.device.take() else {
            // Stopped sources have released their device and cannot restart.
            return Err(CaptureError::AlreadyStarted);
        };

        let slot = self.slot.clone();
        let stopped = self.stopped.clone();
        let handle = thread::Builder::new()
            .name("frame-capture".to_string())
            .spawn(move || capture_loop(device, &slot, &stopped))
            .map_err(CaptureError::ThreadSpawn)?;

        self.worker = Some(handle);
        Ok(self)
    }

    /// The most recently captured frame, or `None` before the first one.
    pub fn read(&self) -> Option<Arc<Frame>> {
        self.slot.latest()
    }

    /// Stops the capture thread, waits for it, and releases the device.
    ///
    /// Extra calls are no-ops.
    pub fn stop(&mut self) {
        self.stopped.store(true, Ordering::Release);

        if let Some(handle) = self.worker.take() {
            match handle.join() {
                Ok(mut device) => device.release(),
                Err(_) => log::error!("Frame capture thread panicked"),
            }
            log::debug!("Frame capture stopped after {} frames", self.slot.published());
        }
        if let Some(mut device) = self.device.take() {
            device.release();
        }
    }
}

impl Drop for FrameSource {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Reads frames until `stopped` is raised. The flag is checked once per
/// device read, so shutdown latency is bounded by one capture cycle.
fn capture_loop(
    mut device: Box<dyn CameraDevice>,
    slot: &FrameSlot,
    stopped: &AtomicBool,
) -> Box<dyn CameraDevice> {
    let mut consecutive_failures: u32 = 0;

    while !stopped.load(Ordering::Acquire) {
        match device.read_frame() {
            Ok(frame) => {
                if consecutive_failures >= FAILURE_WARN_THRESHOLD {
                    log::info!("Camera recovered after {consecutive_failures} failed reads");
                }
                consecutive_failures = 0;
                slot.publish(frame);
            }
            Err(e) => {
                consecutive_failures += 1;
                if consecutive_failures == FAILURE_WARN_THRESHOLD {
                    log::warn!("Camera read failing repeatedly: {e}");
                } else {
                    log::debug!("Camera read failed: {e}");
                }
                thread::sleep(READ_RETRY_PAUSE);
            }
        }
    }

    device
}
