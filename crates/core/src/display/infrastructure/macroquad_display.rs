use macroquad::prelude::*;

use crate::display::domain::frame_display::{DisplayEvent, FrameDisplay};
use crate::pipeline::overlay::Overlay;
use crate::shared::frame::Frame;

const LABEL_FONT_SIZE: f32 = 30.0;
const LABEL_X: f32 = 10.0;
const FPS_LABEL_Y: f32 = 30.0;
const FACES_LABEL_Y: f32 = 60.0;

/// Shows frames in the macroquad window.
///
/// Must be driven from inside the macroquad event loop (the future passed
/// to `macroquad::Window::from_config`). The texture is recreated only when
/// the frame size changes; otherwise its pixels are updated in place.
pub struct MacroquadDisplay {
    texture: Option<Texture2D>,
    closed: bool,
}

impl MacroquadDisplay {
    pub fn new() -> Self {
        // Window close is reported as DisplayEvent::Quit so shutdown stays ordered.
        prevent_quit();
        Self {
            texture: None,
            closed: false,
        }
    }

    fn upload(&mut self, frame: &Frame) {
        let width = frame.width() as u16;
        let height = frame.height() as u16;
        let rgba = frame.to_rgba();

        match &self.texture {
            Some(tex) if tex.width() == width as f32 && tex.height() == height as f32 => {
                tex.update(&Image {
                    bytes: rgba,
                    width,
                    height,
                });
            }
            _ => {
                let texture = Texture2D::from_rgba8(width, height, &rgba);
                texture.set_filter(FilterMode::Linear);
                self.texture = Some(texture);
            }
        }
    }

    fn poll_event(&self) -> DisplayEvent {
        if is_key_pressed(KeyCode::Q) || is_quit_requested() {
            DisplayEvent::Quit
        } else {
            DisplayEvent::Continue
        }
    }
}

impl Default for MacroquadDisplay {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameDisplay for MacroquadDisplay {
    async fn present(
        &mut self,
        frame: &Frame,
        overlay: &Overlay,
    ) -> Result<DisplayEvent, Box<dyn std::error::Error>> {
        if self.closed {
            return Err("display already closed".into());
        }
        if frame.width() > u16::MAX as u32 || frame.height() > u16::MAX as u32 {
            return Err(format!("frame too large: {}x{}", frame.width(), frame.height()).into());
        }

        self.upload(frame);

        clear_background(BLACK);
        if let Some(texture) = &self.texture {
            draw_texture_ex(
                texture,
                0.0,
                0.0,
                WHITE,
                DrawTextureParams {
                    dest_size: Some(vec2(screen_width(), screen_height())),
                    ..Default::default()
                },
            );
        }
        draw_text(&overlay.fps_label(), LABEL_X, FPS_LABEL_Y, LABEL_FONT_SIZE, RED);
        draw_text(&overlay.faces_label(), LABEL_X, FACES_LABEL_Y, LABEL_FONT_SIZE, RED);

        let event = self.poll_event();
        next_frame().await;
        Ok(event)
    }

    async fn idle(&mut self) -> Result<DisplayEvent, Box<dyn std::error::Error>> {
        if self.closed {
            return Err("display already closed".into());
        }
        clear_background(BLACK);
        if let Some(texture) = &self.texture {
            draw_texture(texture, 0.0, 0.0, WHITE);
        }
        let event = self.poll_event();
        next_frame().await;
        Ok(event)
    }

    fn close(&mut self) {
        if !self.closed {
            self.texture = None;
            self.closed = true;
            log::debug!("Display closed");
        }
    }
}
