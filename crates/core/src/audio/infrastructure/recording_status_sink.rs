use std::sync::{Arc, Mutex};

use crate::audio::domain::status_sink::StatusSink;

/// Keeps every rendered status line in memory.
///
/// Clones share the same buffer, so a caller can hand one clone to the
/// supervisor and inspect the other.
#[derive(Clone, Default)]
pub struct RecordingStatusSink {
    lines: Arc<Mutex<Vec<String>>>,
    finished: Arc<Mutex<bool>>,
}

impl RecordingStatusSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lines(&self) -> Vec<String> {
        self.lines.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub fn is_finished(&self) -> bool {
        *self.finished.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl StatusSink for RecordingStatusSink {
    fn render(&mut self, line: &str) {
        self.lines
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(line.to_string());
    }

    fn finish(&mut self) {
        *self.finished.lock().unwrap_or_else(|e| e.into_inner()) = true;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clones_share_lines() {
        let sink = RecordingStatusSink::new();
        let mut writer = sink.clone();
        writer.render("a");
        writer.render("b");
        writer.finish();
        assert_eq!(sink.lines(), vec!["a", "b"]);
        assert!(sink.is_finished());
    }
}
