use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::audio::domain::recorder_command::RecorderCommand;
use crate::shared::constants::{
    DEFAULT_AUDIO_CHANNELS, DEFAULT_AUDIO_FORMAT, DEFAULT_AUDIO_OUTPUT, DEFAULT_AUDIO_SAMPLE_RATE,
    DEFAULT_RECORDER_DEVICE, DEFAULT_RECORDER_PROGRAM, DEFAULT_VU_METER,
};

/// ALSA `arecord` invocation.
///
/// `arecord` prints its VU meter on stderr, redrawn with carriage returns,
/// and writes the WAV file to `output`, overwriting it on every launch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RecorderSettings {
    pub program: String,
    pub device: String,
    pub format: String,
    pub sample_rate: u32,
    pub channels: u32,
    /// `-V` meter type: `mono` or `stereo`.
    pub vu_meter: String,
    pub output: PathBuf,
}

impl Default for RecorderSettings {
    fn default() -> Self {
        Self {
            program: DEFAULT_RECORDER_PROGRAM.to_string(),
            device: DEFAULT_RECORDER_DEVICE.to_string(),
            format: DEFAULT_AUDIO_FORMAT.to_string(),
            sample_rate: DEFAULT_AUDIO_SAMPLE_RATE,
            channels: DEFAULT_AUDIO_CHANNELS,
            vu_meter: DEFAULT_VU_METER.to_string(),
            output: PathBuf::from(DEFAULT_AUDIO_OUTPUT),
        }
    }
}

impl RecorderSettings {
    pub fn command(&self) -> RecorderCommand {
        RecorderCommand::new(
            self.program.clone(),
            [
                "-D".to_string(),
                self.device.clone(),
                "-f".to_string(),
                self.format.clone(),
                "-r".to_string(),
                self.sample_rate.to_string(),
                "-c".to_string(),
                self.channels.to_string(),
                "-V".to_string(),
                self.vu_meter.clone(),
                self.output.to_string_lossy().into_owned(),
            ],
        )
    }
}
