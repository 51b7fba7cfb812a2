use std::fmt;

/// Program and argument list for the audio recorder.
///
/// The same command is reused verbatim for every relaunch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecorderCommand {
    pub program: String,
    pub args: Vec<String>,
}

impl RecorderCommand {
    pub fn new(program: impl Into<String>, args: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            program: program.into(),
            args: args.into_iter().map(Into::into).collect(),
        }
    }
}

impl fmt::Display for RecorderCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.program)?;
        for arg in &self.args {
            write!(f, " {arg}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_joins_program_and_args() {
        let cmd = RecorderCommand::new("arecord", ["-D", "softvol", "out.wav"]);
        assert_eq!(cmd.to_string(), "arecord -D softvol out.wav");
    }

    #[test]
    fn test_display_without_args() {
        let cmd = RecorderCommand::new("sleep", Vec::<String>::new());
        assert_eq!(cmd.to_string(), "sleep");
    }
}
