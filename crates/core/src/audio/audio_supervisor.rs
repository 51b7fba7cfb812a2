use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crossbeam_channel::RecvTimeoutError;

use crate::audio::domain::recorder_command::RecorderCommand;
use crate::audio::domain::restart_policy::{Backoff, RestartPolicy};
use crate::audio::domain::status_sink::StatusSink;
use crate::audio::recorder_handle::{RecorderHandle, TERMINATE_GRACE};
use crate::shared::cancellation::CancellationSignal;
use crate::shared::constants::POLL_INTERVAL_MS;

/// Counters reported when supervision ends.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SupervisorReport {
    pub launches: u32,
    pub restarts: u32,
    pub failed_launches: u32,
}

/// Keeps one recorder running until the signal is set.
///
/// Each poll waits at most `poll_interval` for a progress line, renders it,
/// then checks liveness. A recorder that exited while the signal is unset
/// is relaunched with the same command under the [`RestartPolicy`].
pub struct AudioSupervisor<S: StatusSink> {
    command: RecorderCommand,
    policy: RestartPolicy,
    poll_interval: Duration,
    sink: S,
    current_pid: Arc<AtomicU32>,
}

impl<S: StatusSink> AudioSupervisor<S> {
    pub fn new(command: RecorderCommand, policy: RestartPolicy, sink: S) -> Self {
        Self {
            command,
            policy,
            poll_interval: Duration::from_millis(POLL_INTERVAL_MS),
            sink,
            current_pid: Arc::new(AtomicU32::new(0)),
        }
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    /// Pid of the running recorder, or 0 when none is running.
    pub fn current_pid(&self) -> Arc<AtomicU32> {
        self.current_pid.clone()
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    /// Supervises until `signal` is set, then stops the recorder and returns.
    pub fn run(&mut self, signal: &CancellationSignal) -> SupervisorReport {
        let mut report = SupervisorReport::default();
        let mut backoff = Backoff::new(self.policy.clone());
        let mut current: Option<RecorderHandle> = None;

        log::info!("Starting audio recording: {}", self.command);

        while !signal.is_set() {
            let Some(handle) = current.as_mut() else {
                match RecorderHandle::spawn(&self.command) {
                    Ok(handle) => {
                        log::debug!("Recorder started with pid {}", handle.pid());
                        self.current_pid.store(handle.pid(), Ordering::SeqCst);
                        report.launches += 1;
                        current = Some(handle);
                    }
                    Err(e) => {
                        report.failed_launches += 1;
                        let delay = backoff.after_failure();
                        log::warn!(
                            "Failed to start {}: {e}; retrying in {delay:?}",
                            self.command.program
                        );
                        signal.wait_timeout(delay);
                    }
                }
                continue;
            };

            match handle.recv_timeout(self.poll_interval) {
                Ok(line) => self.sink.render(&line),
                // Silence or a closed stream says nothing about liveness.
                Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => {
                    signal.wait_timeout(self.poll_interval);
                }
            }

            if handle.is_alive() || signal.is_set() {
                continue;
            }

            let uptime = handle.uptime();
            let status = handle
                .exit_status()
                .map(|s| s.to_string())
                .unwrap_or_else(|| "unknown status".to_string());
            self.current_pid.store(0, Ordering::SeqCst);
            current = None;

            let delay = backoff.after_exit(uptime);
            log::warn!("Recorder exited ({status}) after {uptime:.1?}, restarting");
            report.restarts += 1;
            if !delay.is_zero() {
                log::debug!("Waiting {delay:?} before relaunch");
                signal.wait_timeout(delay);
            }
        }

        if let Some(mut handle) = current.take() {
            handle.terminate(TERMINATE_GRACE);
        }
        self.current_pid.store(0, Ordering::SeqCst);
        self.sink.finish();

        log::info!(
            "Audio recording stopped ({} launches, {} restarts)",
            report.launches,
            report.restarts
        );
        report
    }
}
