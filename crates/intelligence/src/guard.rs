//! Deadline guard for blocking external calls
//!
//! The call runs on a helper thread; the caller waits on a channel in short
//! slices, checking its deadline and cancellation token between slices. When
//! either fires the caller returns immediately and the helper's eventual
//! result is dropped, so a late answer never reaches the index.

use ctse_core::CallContext;
use std::sync::mpsc;
use std::thread;
use std::time::{Duration, Instant};

/// Longest uninterrupted wait between cancellation checks
const POLL_SLICE: Duration = Duration::from_millis(10);

/// Why a guarded call produced no value
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GuardError {
    /// Deadline passed; carries the time waited
    TimedOut(Duration),
    /// Caller cancelled
    Cancelled,
    /// The helper thread could not start or died without answering
    Crashed(String),
}

/// Run `f` on a helper thread, bounded by `ctx`.
pub fn run_guarded<T, F>(ctx: &CallContext, name: &str, f: F) -> Result<T, GuardError>
where
    T: Send + 'static,
    F: FnOnce() -> T + Send + 'static,
{
    let started = Instant::now();
    if ctx.is_cancelled() {
        return Err(GuardError::Cancelled);
    }
    if ctx.is_expired() {
        return Err(GuardError::TimedOut(Duration::ZERO));
    }

    let (tx, rx) = mpsc::channel();
    thread::Builder::new()
        .name(format!("ctse-{}", name))
        .spawn(move || {
            let _ = tx.send(f());
        })
        .map_err(|e| GuardError::Crashed(e.to_string()))?;

    loop {
        if ctx.is_cancelled() {
            return Err(GuardError::Cancelled);
        }
        let slice = match ctx.remaining() {
            Some(left) if left.is_zero() => return Err(GuardError::TimedOut(started.elapsed())),
            Some(left) => left.min(POLL_SLICE),
            None => POLL_SLICE,
        };
        match rx.recv_timeout(slice) {
            Ok(value) => return Ok(value),
            Err(mpsc::RecvTimeoutError::Timeout) => continue,
            Err(mpsc::RecvTimeoutError::Disconnected) => {
                return Err(GuardError::Crashed(format!("{} worker exited without a result", name)))
            }
        }
    }
}
