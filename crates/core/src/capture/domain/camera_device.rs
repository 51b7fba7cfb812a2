use crate::shared::frame::Frame;

/// A camera opened for capture.
///
/// `read_frame` blocks until the driver delivers the next frame. A failed
/// read is transient from the caller's point of view: the capture loop
/// retries it.
pub trait CameraDevice: Send {
    fn read_frame(&mut self) -> Result<Frame, Box<dyn std::error::Error>>;

    /// Releases the device. Further reads fail.
    fn release(&mut self);
}
