use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::audio::domain::restart_policy::RestartPolicy;
use crate::audio::infrastructure::arecord::RecorderSettings;
use crate::capture::domain::camera_settings::CameraSettings;
use crate::detection::domain::detection_params::DetectionParams;
use crate::detection::infrastructure::model_resolver::default_search_paths;
use crate::shared::constants::DEFAULT_WARMUP_MS;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid config {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// Everything a session needs, loadable from a JSON file.
///
/// Every field is optional in the file; missing fields keep their defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    pub camera: CameraSettings,
    pub detection: DetectionParams,
    pub recorder: RecorderSettings,
    pub restart: RestartPolicy,
    /// Detector model locations, tried in order.
    pub model_search_paths: Vec<PathBuf>,
    /// Camera settling time before the first frame is read.
    pub warmup_ms: u64,
    pub audio_enabled: bool,
    /// Run the board's max-performance tools before starting.
    pub performance_mode: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            camera: CameraSettings::default(),
            detection: DetectionParams::default(),
            recorder: RecorderSettings::default(),
            restart: RestartPolicy::default(),
            model_search_paths: default_search_paths(),
            warmup_ms: DEFAULT_WARMUP_MS,
            audio_enabled: true,
            performance_mode: false,
        }
    }
}

impl SessionConfig {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path).map_err(|e| ConfigError::Read {
            path: path.to_path_buf(),
            source: e,
        })?;
        Self::from_json(&text).map_err(|e| ConfigError::Parse {
            path: path.to_path_buf(),
            source: e,
        })
    }

    pub fn from_json(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }

    /// Puts `path` at the front of the model search list.
    pub fn prepend_model_path(&mut self, path: PathBuf) {
        self.model_search_paths.retain(|p| p != &path);
        self.model_search_paths.insert(0, path);
    }

    pub fn warmup(&self) -> Duration {
        Duration::from_millis(self.warmup_ms)
    }
}
