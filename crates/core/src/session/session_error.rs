use thiserror::Error;

use crate::capture::frame_source::CaptureError;
use crate::detection::infrastructure::model_resolver::DetectorResourceError;
use crate::shared::cancellation::SignalError;

/// Why a session could not start or ended abnormally.
#[derive(Error, Debug)]
pub enum SessionError {
    #[error(transparent)]
    Detector(#[from] DetectorResourceError),
    #[error(transparent)]
    Capture(#[from] CaptureError),
    #[error(transparent)]
    Signal(#[from] SignalError),
    #[error("display failed: {0}")]
    Display(String),
    #[error("failed to start audio process: {0}")]
    Fork(#[source] std::io::Error),
}
