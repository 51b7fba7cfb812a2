use image::GrayImage;

use crate::shared::region::Region;

/// Domain interface for face detection.
///
/// Takes the grayscale conversion of a frame and returns face boxes in that
/// image's pixel coordinates. `&mut self` because backends keep inference
/// state between calls.
pub trait FaceDetector: Send {
    fn detect(&mut self, image: &GrayImage) -> Result<Vec<Region>, Box<dyn std::error::Error>>;
}
