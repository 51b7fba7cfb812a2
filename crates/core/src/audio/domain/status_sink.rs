/// Destination of the recorder's live status line.
pub trait StatusSink {
    /// Replaces the currently shown status with `line`.
    fn render(&mut self, line: &str);

    /// Ends the status display when monitoring stops.
    fn finish(&mut self);
}
