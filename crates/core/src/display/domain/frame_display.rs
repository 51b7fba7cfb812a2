use crate::pipeline::overlay::Overlay;
use crate::shared::frame::Frame;

/// What the user asked for while a frame was on screen.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisplayEvent {
    Continue,
    /// Quit key pressed or window closed.
    Quit,
}

/// Window the annotated frames are shown in.
///
/// Presenting yields to the windowing event loop, hence `async`.
/// `close` must be safe to call more than once.
#[allow(async_fn_in_trait)]
pub trait FrameDisplay {
    async fn present(
        &mut self,
        frame: &Frame,
        overlay: &Overlay,
    ) -> Result<DisplayEvent, Box<dyn std::error::Error>>;

    /// Keeps the window responsive while there is no frame to show.
    async fn idle(&mut self) -> Result<DisplayEvent, Box<dyn std::error::Error>>;

    fn close(&mut self);
}
