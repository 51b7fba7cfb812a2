use std::io::{self, Read};
use std::os::unix::process::CommandExt;
use std::process::{Child, ChildStderr, Command, ExitStatus, Stdio};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, TrySendError};

use crate::audio::domain::recorder_command::RecorderCommand;

/// Progress lines buffered between the stderr reader and the monitor.
const LINE_CHANNEL_CAPACITY: usize = 64;

/// How long a recorder gets to exit after SIGTERM before SIGKILL.
pub const TERMINATE_GRACE: Duration = Duration::from_millis(500);

/// The currently running recorder subprocess.
///
/// Owns the child, its pid, and the receiving end of its progress stream.
/// A restart replaces the whole handle. Dropping the handle terminates and
/// reaps the child.
pub struct RecorderHandle {
    child: Child,
    pid: u32,
    lines: Receiver<String>,
    reader: Option<JoinHandle<()>>,
    started: Instant,
    exit_status: Option<ExitStatus>,
}

impl RecorderHandle {
    /// Launches `command` in its own process group with stderr piped.
    pub fn spawn(command: &RecorderCommand) -> io::Result<Self> {
        let mut cmd = Command::new(&command.program);
        cmd.args(&command.args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            // Terminal Ctrl+C goes to the supervisor, which stops us in order.
            .process_group(0);

        die_with_parent(&mut cmd);

        let mut child = cmd.spawn()?;
        let pid = child.id();
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| io::Error::other("recorder stderr not captured"))?;

        let (tx, rx) = crossbeam_channel::bounded(LINE_CHANNEL_CAPACITY);
        let reader = thread::Builder::new()
            .name(format!("recorder-stderr-{pid}"))
            .spawn(move || forward_progress(stderr, tx));
        let reader = match reader {
            Ok(handle) => handle,
            Err(e) => {
                let _ = child.kill();
                let _ = child.wait();
                return Err(e);
            }
        };

        Ok(Self {
            child,
            pid,
            lines: rx,
            reader: Some(reader),
            started: Instant::now(),
            exit_status: None,
        })
    }

    pub fn pid(&self) -> u32 {
        self.pid
    }

    pub fn uptime(&self) -> Duration {
        self.started.elapsed()
    }

    /// Non-blocking liveness check. Reaps the child once it has exited.
    pub fn is_alive(&mut self) -> bool {
        if self.exit_status.is_some() {
            return false;
        }
        match self.child.try_wait() {
            Ok(Some(status)) => {
                self.exit_status = Some(status);
                false
            }
            Ok(None) => true,
            Err(e) => {
                log::debug!("try_wait on recorder {} failed: {e}", self.pid);
                false
            }
        }
    }

    pub fn exit_status(&self) -> Option<ExitStatus> {
        self.exit_status
    }

    /// Waits up to `timeout` for the next progress line.
    pub fn recv_timeout(&self, timeout: Duration) -> Result<String, RecvTimeoutError> {
        self.lines.recv_timeout(timeout)
    }

    /// SIGTERM to the recorder's process group, then SIGKILL after `grace`.
    /// The child is always reaped before this returns.
    pub fn terminate(&mut self, grace: Duration) {
        if self.is_alive() {
            self.signal_group(libc::SIGTERM);
            if !self.wait_for_exit(grace) {
                log::warn!("Recorder {} ignored SIGTERM, killing", self.pid);
                self.signal_group(libc::SIGKILL);
                match self.child.wait() {
                    Ok(status) => self.exit_status = Some(status),
                    Err(e) => log::debug!("wait after SIGKILL failed: {e}"),
                }
            }
        }
        self.join_reader();
    }

    fn signal_group(&self, signal: libc::c_int) {
        // The child leads its own process group, so -pid addresses the group.
        let pgid = -(self.pid as libc::pid_t);
        // SAFETY: plain kill(2) on a process group we created.
        if unsafe { libc::kill(pgid, signal) } != 0 {
            log::debug!(
                "signal {signal} to recorder group {} failed: {}",
                self.pid,
                io::Error::last_os_error()
            );
        }
    }

    fn wait_for_exit(&mut self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        while Instant::now() < deadline {
            if !self.is_alive() {
                return true;
            }
            thread::sleep(Duration::from_millis(10));
        }
        !self.is_alive()
    }

    /// The reader ends at EOF on stderr, which follows the group's exit.
    fn join_reader(&mut self) {
        let Some(reader) = self.reader.take() else {
            return;
        };
        if !wait_finished(&reader, Duration::from_millis(200)) {
            // Leftover group members still hold the pipe.
            self.signal_group(libc::SIGKILL);
            if !wait_finished(&reader, Duration::from_millis(200)) {
                log::debug!("Recorder {} stderr still open, detaching reader", self.pid);
                return;
            }
        }
        let _ = reader.join();
    }
}

fn wait_finished(reader: &JoinHandle<()>, timeout: Duration) -> bool {
    let deadline = Instant::now() + timeout;
    while !reader.is_finished() && Instant::now() < deadline {
        thread::sleep(Duration::from_millis(5));
    }
    reader.is_finished()
}

impl Drop for RecorderHandle {
    fn drop(&mut self) {
        self.terminate(TERMINATE_GRACE);
    }
}

/// Delivers SIGTERM to the recorder when the spawning thread exits.
#[cfg(target_os = "linux")]
fn die_with_parent(cmd: &mut Command) {
    // SAFETY: prctl is async-signal-safe and touches no parent state.
    unsafe {
        cmd.pre_exec(|| {
            if libc::prctl(libc::PR_SET_PDEATHSIG, libc::SIGTERM as libc::c_ulong) != 0 {
                return Err(io::Error::last_os_error());
            }
            Ok(())
        });
    }
}

#[cfg(not(target_os = "linux"))]
fn die_with_parent(_cmd: &mut Command) {}

/// Reads stderr until EOF, forwarding each progress fragment.
///
/// Never blocks on the channel: when the monitor falls behind, new lines are
/// dropped.
fn forward_progress(mut stderr: ChildStderr, tx: Sender<String>) {
    let mut pending = Vec::new();
    let mut buf = [0u8; 1024];
    loop {
        let n = match stderr.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(_) => break,
        };
        for line in split_progress(&mut pending, &buf[..n]) {
            match tx.try_send(line) {
                Ok(()) | Err(TrySendError::Full(_)) => {}
                Err(TrySendError::Disconnected(_)) => return,
            }
        }
    }
    if let Some(line) = take_line(&mut pending) {
        let _ = tx.try_send(line);
    }
}

/// Appends `chunk` to `pending` and returns every complete fragment.
///
/// Fragments end at `\r` or `\n`; empty fragments are skipped. Bytes after
/// the last terminator stay in `pending`.
pub fn split_progress(pending: &mut Vec<u8>, chunk: &[u8]) -> Vec<String> {
    let mut lines = Vec::new();
    for &byte in chunk {
        if byte == b'\r' || byte == b'\n' {
            if let Some(line) = take_line(pending) {
                lines.push(line);
            }
        } else {
            pending.push(byte);
        }
    }
    lines
}

fn take_line(pending: &mut Vec<u8>) -> Option<String> {
    let line = String::from_utf8_lossy(pending).trim_end().to_string();
    pending.clear();
    (!line.is_empty()).then_some(line)
}
