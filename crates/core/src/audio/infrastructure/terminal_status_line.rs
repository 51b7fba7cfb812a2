use std::io::{self, Write};

use crate::audio::domain::status_sink::StatusSink;

/// Redraws a single status line on stderr in place.
///
/// Each render returns the cursor to column 0 and clears the rest of the
/// line, so the terminal never scrolls.
pub struct TerminalStatusLine<W: Write = io::Stderr> {
    out: W,
    dirty: bool,
}

impl TerminalStatusLine {
    pub fn stderr() -> Self {
        Self::new(io::stderr())
    }
}

impl<W: Write> TerminalStatusLine<W> {
    pub fn new(out: W) -> Self {
        Self { out, dirty: false }
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}

impl<W: Write> StatusSink for TerminalStatusLine<W> {
    fn render(&mut self, line: &str) {
        // Terminal write failures are not worth stopping the recorder for.
        let _ = write!(self.out, "\r{line}\x1b[K");
        let _ = self.out.flush();
        self.dirty = true;
    }

    fn finish(&mut self) {
        if self.dirty {
            let _ = writeln!(self.out);
            let _ = self.out.flush();
            self.dirty = false;
        }
    }
}
