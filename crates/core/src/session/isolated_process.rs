use std::io;
use std::panic::{self, AssertUnwindSafe};
use std::thread;
use std::time::{Duration, Instant};

/// Exit code of a child whose body panicked.
const PANIC_EXIT_CODE: i32 = 101;

/// A forked child process running a closure.
///
/// The child shares nothing with the parent except what was mapped shared
/// before the fork. It exits with the closure's return value via `_exit`,
/// so no parent destructors or atexit handlers run twice.
#[derive(Debug)]
pub struct IsolatedProcess {
    pid: libc::pid_t,
    exit_code: Option<i32>,
}

impl IsolatedProcess {
    /// Forks and runs `body` in the child.
    ///
    /// # Safety
    ///
    /// The calling process must be single-threaded. After `fork` only the
    /// calling thread exists in the child, and any lock held by another
    /// thread at that moment would stay locked forever.
    pub unsafe fn spawn<F: FnOnce() -> i32>(body: F) -> io::Result<Self> {
        match libc::fork() {
            -1 => Err(io::Error::last_os_error()),
            0 => {
                let code = panic::catch_unwind(AssertUnwindSafe(body)).unwrap_or(PANIC_EXIT_CODE);
                libc::_exit(code)
            }
            pid => Ok(Self {
                pid,
                exit_code: None,
            }),
        }
    }

    pub fn pid(&self) -> libc::pid_t {
        self.pid
    }

    /// Reaps the child if it has exited. Returns its exit code.
    pub fn try_wait(&mut self) -> io::Result<Option<i32>> {
        if self.exit_code.is_some() {
            return Ok(self.exit_code);
        }
        let mut status = 0;
        // SAFETY: pid is our own unreaped child; WNOHANG only inspects state.
        let ret = unsafe { libc::waitpid(self.pid, &mut status, libc::WNOHANG) };
        match ret {
            0 => Ok(None),
            r if r < 0 => Err(io::Error::last_os_error()),
            _ => {
                let code = decode_status(status);
                self.exit_code = Some(code);
                Ok(Some(code))
            }
        }
    }

    /// Polls for exit for up to `timeout`.
    pub fn wait_timeout(&mut self, timeout: Duration) -> io::Result<Option<i32>> {
        let deadline = Instant::now() + timeout;
        loop {
            if let Some(code) = self.try_wait()? {
                return Ok(Some(code));
            }
            if Instant::now() >= deadline {
                return Ok(None);
            }
            thread::sleep(Duration::from_millis(10));
        }
    }

    /// SIGKILL and a blocking reap.
    pub fn kill(&mut self) -> io::Result<i32> {
        if let Some(code) = self.exit_code {
            return Ok(code);
        }
        // SAFETY: kill/waitpid on our own unreaped child.
        unsafe {
            if libc::kill(self.pid, libc::SIGKILL) != 0 {
                log::debug!("SIGKILL to {} failed: {}", self.pid, io::Error::last_os_error());
            }
            let mut status = 0;
            if libc::waitpid(self.pid, &mut status, 0) < 0 {
                return Err(io::Error::last_os_error());
            }
            let code = decode_status(status);
            self.exit_code = Some(code);
            Ok(code)
        }
    }

    /// Waits up to `timeout` for a cooperative exit, then kills.
    pub fn shutdown(&mut self, timeout: Duration) -> io::Result<i32> {
        match self.wait_timeout(timeout)? {
            Some(code) => Ok(code),
            None => {
                log::warn!(
                    "Process {} did not exit within {timeout:?}, killing",
                    self.pid
                );
                self.kill()
            }
        }
    }
}

impl Drop for IsolatedProcess {
    fn drop(&mut self) {
        if self.exit_code.is_none() {
            if let Err(e) = self.kill() {
                log::debug!("Failed to reap process {}: {e}", self.pid);
            }
        }
    }
}

/// Exit code, or `128 + signal` for a signal death (shell convention).
fn decode_status(status: libc::c_int) -> i32 {
    if libc::WIFEXITED(status) {
        libc::WEXITSTATUS(status)
    } else if libc::WIFSIGNALED(status) {
        128 + libc::WTERMSIG(status)
    } else {
        -1
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shared::cancellation::CancellationSignal;

    #[test]
    fn test_child_exit_code_is_reported() {
        let mut child = unsafe { IsolatedProcess::spawn(|| 7) }.unwrap();
        assert_eq!(child.wait_timeout(Duration::from_secs(5)).unwrap(), Some(7));
    }

    #[test]
    fn test_child_observes_parent_signal() {
        let signal = CancellationSignal::new().unwrap();
        let child_signal = signal.clone();
        let mut child = unsafe {
            IsolatedProcess::spawn(move || {
                if child_signal.wait_timeout(Duration::from_secs(5)) {
                    0
                } else {
                    1
                }
            })
        }
        .unwrap();

        signal.set();
        assert_eq!(child.shutdown(Duration::from_secs(5)).unwrap(), 0);
    }

    #[test]
    fn test_shutdown_kills_unresponsive_child() {
        let mut child = unsafe {
            IsolatedProcess::spawn(|| loop {
                libc::sleep(1);
            })
        }
        .unwrap();

        let start = Instant::now();
        let code = child.shutdown(Duration::from_millis(100)).unwrap();
        assert_eq!(code, 128 + libc::SIGKILL);
        assert!(start.elapsed() < Duration::from_secs(2));
    }

    #[test]
    fn test_drop_reaps_child() {
        let child = unsafe {
            IsolatedProcess::spawn(|| loop {
                libc::sleep(1);
            })
        }
        .unwrap();
        let pid = child.pid();
        drop(child);
        assert_ne!(unsafe { libc::kill(pid, 0) }, 0);
    }

    #[test]
    fn test_decode_status() {
        // Raw wait statuses: exit code in bits 8..16, signal in bits 0..7.
        assert_eq!(decode_status(3 << 8), 3);
        assert_eq!(decode_status(libc::SIGKILL), 128 + libc::SIGKILL);
    }
}
