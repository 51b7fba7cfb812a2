use std::fmt;
use std::process::{Command, Stdio};

/// One external tuning tool invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TuningStep {
    pub program: &'static str,
    pub args: &'static [&'static str],
}

impl fmt::Display for TuningStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.program)?;
        for arg in self.args {
            write!(f, " {arg}")?;
        }
        Ok(())
    }
}

/// Outcome of one tuning step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TuningOutcome {
    Applied,
    Failed(String),
}

/// What [`apply`] did, step by step, in run order.
#[derive(Debug, Default)]
pub struct TuningReport {
    pub steps: Vec<(String, TuningOutcome)>,
}

impl TuningReport {
    pub fn all_applied(&self) -> bool {
        self.steps
            .iter()
            .all(|(_, outcome)| *outcome == TuningOutcome::Applied)
    }
}

/// Max-performance power model, then clocks pinned to max.
pub const DEFAULT_STEPS: &[TuningStep] = &[
    TuningStep {
        program: "nvpmodel",
        args: &["-m", "0"],
    },
    TuningStep {
        program: "jetson_clocks",
        args: &[],
    },
];

/// Runs each step in order. Failures are logged and never abort the session.
pub fn apply(steps: &[TuningStep]) -> TuningReport {
    let mut report = TuningReport::default();
    for step in steps {
        let outcome = run_step(step);
        match &outcome {
            TuningOutcome::Applied => log::info!("Applied `{step}`"),
            TuningOutcome::Failed(reason) => log::warn!("Skipping `{step}`: {reason}"),
        }
        report.steps.push((step.to_string(), outcome));
    }
    report
}

fn run_step(step: &TuningStep) -> TuningOutcome {
    let output = Command::new(step.program)
        .args(step.args)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::piped())
        .output();

    match output {
        Ok(out) if out.status.success() => TuningOutcome::Applied,
        Ok(out) => {
            let stderr = String::from_utf8_lossy(&out.stderr);
            let stderr = stderr.trim();
            if stderr.is_empty() {
                TuningOutcome::Failed(format!("exited with {}", out.status))
            } else {
                TuningOutcome::Failed(format!("exited with {}: {stderr}", out.status))
            }
        }
        Err(e) => TuningOutcome::Failed(e.to_string()),
    }
}
