use serde::{Deserialize, Serialize};

/// Tuning knobs for the face detector.
///
/// Named after the classic multi-scale cascade parameters. Backends map them
/// onto their own thresholds (see [`DetectionParams::confidence_floor`] and
/// [`DetectionParams::overlap_threshold`]).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectionParams {
    /// Step between detection scales. Larger steps tolerate more overlap
    /// between neighbouring candidates.
    pub scale_factor: f64,
    /// How many agreeing candidates a detection needs. Higher is stricter.
    pub min_neighbors: u32,
    /// Smallest accepted face, `(width, height)` in pixels.
    pub min_size: (u32, u32),
}

impl Default for DetectionParams {
    fn default() -> Self {
        Self {
            scale_factor: 1.1,
            min_neighbors: 5,
            min_size: (30, 30),
        }
    }
}

impl DetectionParams {
    /// Minimum detector score, `0.5 + 0.05 * (min_neighbors - 5)` in [0.3, 0.9].
    pub fn confidence_floor(&self) -> f32 {
        let offset = self.min_neighbors as f32 - 5.0;
        (0.5 + 0.05 * offset).clamp(0.3, 0.9)
    }

    /// IoU above which the weaker of two candidates is suppressed,
    /// `3 * (scale_factor - 1)` in [0.1, 0.6].
    pub fn overlap_threshold(&self) -> f64 {
        ((self.scale_factor - 1.0) * 3.0).clamp(0.1, 0.6)
    }
}
