use std::io;
use std::ptr::{self, NonNull};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use thiserror::Error;

const WAIT_SLICE: Duration = Duration::from_millis(10);

#[derive(Error, Debug)]
pub enum SignalError {
    #[error("failed to map shared cancellation flag: {0}")]
    Map(#[source] io::Error),
}

/// One-shot stop flag shared by every loop of a session.
///
/// The flag lives in an anonymous `MAP_SHARED` mapping, so a child created
/// with `fork` observes (and can raise) the same flag as its parent. Once
/// set it stays set; there is no reset.
#[derive(Clone)]
pub struct CancellationSignal {
    flag: Arc<SharedFlag>,
}

struct SharedFlag {
    ptr: NonNull<AtomicBool>,
    len: usize,
}

// Safety: the mapping is only accessed through `AtomicBool` operations and is
// unmapped exactly once, when the last `Arc` reference is dropped.
unsafe impl Send for SharedFlag {}
unsafe impl Sync for SharedFlag {}

impl Drop for SharedFlag {
    fn drop(&mut self) {
        // SAFETY: ptr/len describe the mapping created in `CancellationSignal::new`.
        unsafe {
            libc::munmap(self.ptr.as_ptr() as *mut libc::c_void, self.len);
        }
    }
}

impl CancellationSignal {
    pub fn new() -> Result<Self, SignalError> {
        // SAFETY: sysconf has no preconditions.
        let page = unsafe { libc::sysconf(libc::_SC_PAGESIZE) };
        let len = if page > 0 { page as usize } else { 4096 };

        // SAFETY: anonymous shared mapping, no fd, kernel chooses the address.
        // Fresh anonymous pages are zero-filled, which is a valid `false`.
        let addr = unsafe {
            libc::mmap(
                ptr::null_mut(),
                len,
                libc::PROT_READ | libc::PROT_WRITE,
                libc::MAP_SHARED | libc::MAP_ANONYMOUS,
                -1,
                0,
            )
        };
        if addr == libc::MAP_FAILED {
            return Err(SignalError::Map(io::Error::last_os_error()));
        }
        let ptr = NonNull::new(addr as *mut AtomicBool)
            .ok_or_else(|| SignalError::Map(io::Error::other("mmap returned null")))?;

        Ok(Self {
            flag: Arc::new(SharedFlag { ptr, len }),
        })
    }

    /// Raises the signal. Idempotent and async-signal-safe.
    pub fn set(&self) {
        self.atomic().store(true, Ordering::SeqCst);
    }

    pub fn is_set(&self) -> bool {
        self.atomic().load(Ordering::SeqCst)
    }

    /// Sleeps up to `timeout`, waking early once the signal is raised.
    ///
    /// Returns whether the signal is set.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        loop {
            if self.is_set() {
                return true;
            }
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            thread::sleep(WAIT_SLICE.min(deadline - now));
        }
    }

    fn atomic(&self) -> &AtomicBool {
        // SAFETY: the mapping is live for as long as `self.flag` is, and is
        // page-aligned, which satisfies AtomicBool's alignment.
        unsafe { self.flag.ptr.as_ref() }
    }
}

impl std::fmt::Debug for CancellationSignal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CancellationSignal")
            .field("set", &self.is_set())
            .finish()
    }
}
