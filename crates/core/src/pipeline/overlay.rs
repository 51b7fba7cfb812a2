use image::Rgb;
use imageproc::drawing::draw_hollow_rect_mut;
use imageproc::rect::Rect;

use crate::shared::frame::Frame;
use crate::shared::region::Region;

pub const BOX_COLOR: Rgb<u8> = Rgb([0, 255, 0]);
pub const BOX_THICKNESS: i32 = 2;

/// Text drawn over the frame: the current rate and the face count.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Overlay {
    pub fps: f64,
    pub faces: usize,
}

impl Overlay {
    pub fn fps_label(&self) -> String {
        format!("FPS: {:.1}", self.fps)
    }

    pub fn faces_label(&self) -> String {
        format!("Faces: {}", self.faces)
    }
}

/// Draws a hollow box of [`BOX_THICKNESS`] pixels around each region.
///
/// Returns the number of boxes drawn; regions outside the frame are skipped.
pub fn draw_face_boxes(frame: &mut Frame, regions: &[Region]) -> usize {
    let (w, h) = (frame.width(), frame.height());
    let Some(mut canvas) = frame.rgb_canvas() else {
        return 0;
    };

    let mut drawn = 0;
    for region in regions {
        let Some(r) = region.clamp_to(w, h) else {
            continue;
        };
        // Inset rings grow the outline inward.
        for inset in 0..BOX_THICKNESS {
            let rw = r.width - 2 * inset;
            let rh = r.height - 2 * inset;
            if rw <= 0 || rh <= 0 {
                break;
            }
            let rect = Rect::at(r.x + inset, r.y + inset).of_size(rw as u32, rh as u32);
            draw_hollow_rect_mut(&mut canvas, rect, BOX_COLOR);
        }
        drawn += 1;
    }
    drawn
}
