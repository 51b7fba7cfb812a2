use serde::{Deserialize, Serialize};

use crate::shared::constants::{
    DEFAULT_CAMERA_INDEX, DEFAULT_CAPTURE_FPS, DEFAULT_CAPTURE_HEIGHT, DEFAULT_CAPTURE_WIDTH,
};

/// Requested capture configuration. Drivers may negotiate something else;
/// the delivered frames carry their actual dimensions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CameraSettings {
    pub device_index: u32,
    pub width: u32,
    pub height: u32,
    pub framerate: u32,
    /// Try a hardware decoder for compressed camera streams first.
    pub prefer_hardware_decoder: bool,
}

impl Default for CameraSettings {
    fn default() -> Self {
        Self {
            device_index: DEFAULT_CAMERA_INDEX,
            width: DEFAULT_CAPTURE_WIDTH,
            height: DEFAULT_CAPTURE_HEIGHT,
            framerate: DEFAULT_CAPTURE_FPS,
            prefer_hardware_decoder: true,
        }
    }
}

impl CameraSettings {
    pub fn video_size(&self) -> String {
        format!("{}x{}", self.width, self.height)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_vga() {
        let settings = CameraSettings::default();
        assert_eq!(settings.video_size(), "640x480");
        assert_eq!(settings.device_index, 0);
    }

    #[test]
    fn test_partial_json_keeps_defaults() {
        let settings: CameraSettings = serde_json::from_str(r#"{"width": 1280}"#).unwrap();
        assert_eq!(settings.width, 1280);
        assert_eq!(settings.height, 480);
        assert!(settings.prefer_hardware_decoder);
    }
}
