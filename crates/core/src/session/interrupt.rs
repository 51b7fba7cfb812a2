use std::io;
use std::thread;

use signal_hook::consts::{SIGINT, SIGTERM};
use signal_hook::iterator::{Handle, Signals};

use crate::shared::cancellation::CancellationSignal;

/// Raises `signal` on SIGINT or SIGTERM.
///
/// Dropping the guard unregisters the handlers and stops the listener thread.
pub struct InterruptGuard {
    handle: Handle,
    listener: Option<thread::JoinHandle<()>>,
}

pub fn install(signal: CancellationSignal) -> io::Result<InterruptGuard> {
    let mut signals = Signals::new([SIGINT, SIGTERM])?;
    let handle = signals.handle();

    let listener = thread::Builder::new()
        .name("interrupt".to_string())
        .spawn(move || {
            for sig in signals.forever() {
                let name = match sig {
                    SIGINT => "SIGINT",
                    SIGTERM => "SIGTERM",
                    _ => continue,
                };
                log::info!("Received {name}, shutting down");
                signal.set();
            }
        })?;
    log::debug!("Interrupt handlers registered (SIGINT, SIGTERM)");

    Ok(InterruptGuard {
        handle,
        listener: Some(listener),
    })
}

impl Drop for InterruptGuard {
    fn drop(&mut self) {
        self.handle.close();
        if let Some(listener) = self.listener.take() {
            let _ = listener.join();
        }
    }
}
