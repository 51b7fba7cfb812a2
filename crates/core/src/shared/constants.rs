pub const DETECTOR_MODEL_NAME: &str = "blazeface.onnx";

/// System-wide model locations, searched in order before the user cache.
pub const DETECTOR_SEARCH_PATHS: &[&str] = &[
    "/usr/share/facecam/models/blazeface.onnx",
    "/usr/local/share/facecam/models/blazeface.onnx",
    "/opt/facecam/models/blazeface.onnx",
];

pub const DEFAULT_CAMERA_INDEX: u32 = 0;
pub const DEFAULT_CAPTURE_WIDTH: u32 = 640;
pub const DEFAULT_CAPTURE_HEIGHT: u32 = 480;
pub const DEFAULT_CAPTURE_FPS: u32 = 30;

/// Camera auto-exposure settling time before the first read.
pub const DEFAULT_WARMUP_MS: u64 = 2000;

/// The displayed FPS is recomputed once per this many frames.
pub const FPS_UPDATE_INTERVAL: u64 = 30;

pub const DEFAULT_RECORDER_PROGRAM: &str = "arecord";
pub const DEFAULT_RECORDER_DEVICE: &str = "softvol";
pub const DEFAULT_AUDIO_FORMAT: &str = "S16_LE";
pub const DEFAULT_AUDIO_SAMPLE_RATE: u32 = 48000;
pub const DEFAULT_AUDIO_CHANNELS: u32 = 2;
pub const DEFAULT_VU_METER: &str = "stereo";
pub const DEFAULT_AUDIO_OUTPUT: &str = "output.wav";

/// Upper bound on how long any loop blocks before re-checking cancellation.
pub const POLL_INTERVAL_MS: u64 = 100;

pub const WINDOW_TITLE: &str = "Face Detection";
