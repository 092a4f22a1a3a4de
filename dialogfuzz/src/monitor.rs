//! Target health monitoring and restart. Grounded on
//! `original_source/boofuzz/sessions.py`'s PED-RPC monitor calls
//! (`pre_send`, `post_send`, `alive`, `get_crash_synopsis`,
//! `set_*option*`) and `restart_target`'s hook-priority order.

use crate::error::FuzzResult;

/// External observer of the target process, e.g. a debugger attachment,
/// a supervising RPC agent, or a VM snapshot controller.
pub trait Monitor {
    /// Is the target still responsive? Called before each case.
    fn alive(&mut self) -> FuzzResult<bool>;

    /// Run immediately before a case's data is sent.
    fn pre_send(&mut self) -> FuzzResult<()> {
        Ok(())
    }

    /// Run immediately after a case's data is sent (and any response
    /// received).
    fn post_send(&mut self) -> FuzzResult<()> {
        Ok(())
    }

    /// If the target crashed, a human-readable synopsis; `None` if it is
    /// still alive.
    fn get_crash_synopsis(&mut self) -> FuzzResult<Option<String>>;

    /// Attempt to bring the target back to a known-good state. Called
    /// only when the session has no `on_failure` hook of its own.
    ///
    /// Returns `Ok(true)` if this monitor has a restart method and used
    /// it successfully, `Ok(false)` if it has no restart capability at
    /// all (the caller falls back to sleeping and rechecking `alive`),
    /// or `Err` if a configured restart method was tried and itself
    /// failed — that case is fatal and must not be papered over by the
    /// sleep-and-hope fallback, mirroring boofuzz's
    /// `BoofuzzRestartFailedError`.
    fn restart_target(&mut self) -> FuzzResult<bool>;
}

/// A monitor that always reports the target alive and never restarts
/// anything — useful for in-process targets or dry runs where there is
/// nothing external to watch.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullMonitor;

impl Monitor for NullMonitor {
    fn alive(&mut self) -> FuzzResult<bool> {
        Ok(true)
    }

    fn get_crash_synopsis(&mut self) -> FuzzResult<Option<String>> {
        Ok(None)
    }

    fn restart_target(&mut self) -> FuzzResult<bool> {
        Ok(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn null_monitor_is_always_alive_and_never_crashed() {
        let mut m = NullMonitor;
        assert!(m.alive().unwrap());
        assert_eq!(m.get_crash_synopsis().unwrap(), None);
        assert!(!m.restart_target().unwrap());
    }
}
