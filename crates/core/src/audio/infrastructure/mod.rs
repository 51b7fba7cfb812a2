pub mod arecord;
pub mod recording_status_sink;
pub mod terminal_status_line;
