//! Interrupt handling. A crash under test happens in the
//! separately-monitored target, not in this process, so there's no need
//! for an alternate signal stack to survive a local stack overflow. All
//! this process needs is a safe, ordinary SIGINT flag the main loop polls
//! once per case boundary, so the run terminates cleanly at the next
//! natural boundary instead of mid-case.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

static INTERRUPTED: AtomicBool = AtomicBool::new(false);

cfg_if::cfg_if! {
    if #[cfg(unix)] {
        extern "C" fn handle_sigint(_signum: libc::c_int) {
            INTERRUPTED.store(true, Ordering::SeqCst);
        }

        /// Install the SIGINT handler. Safe to call more than once; later
        /// calls just re-install the same handler.
        pub fn install() {
            unsafe {
                libc::signal(libc::SIGINT, handle_sigint as libc::sighandler_t);
            }
        }
    } else {
        /// No `libc::signal` on this platform; callers still get a working
        /// `InterruptFlag`, they just won't see process-wide SIGINT.
        pub fn install() {}
    }
}

/// Has SIGINT been received since the process started (or since the last
/// `reset()`)?
pub fn was_interrupted() -> bool {
    INTERRUPTED.load(Ordering::SeqCst)
}

pub fn reset() {
    INTERRUPTED.store(false, Ordering::SeqCst);
}

/// A handle a library caller can pass around instead of using the
/// process-global flag directly, e.g. to drive a test without touching
/// real signal state.
#[derive(Clone)]
pub struct InterruptFlag(Arc<AtomicBool>);

impl InterruptFlag {
    pub fn new() -> Self {
        Self(Arc::new(AtomicBool::new(false)))
    }

    pub fn set(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_set(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

impl Default for InterruptFlag {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interrupt_flag_starts_clear() {
        let flag = InterruptFlag::new();
        assert!(!flag.is_set());
        flag.set();
        assert!(flag.is_set());
    }
}
