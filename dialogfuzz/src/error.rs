//! Error taxonomy for the engine, as one `thiserror`-derived enum rather
//! than ad hoc strings — the same approach the wider retrieval pack uses
//! for its own error types (e.g. miden-vm, tinyzkp).

use thiserror::Error;

/// Connection reset/aborted and a crash signal are locally recoverable by
/// the session (recorded, target restarted, traversal continues); the
/// rest propagate to the caller of `Session::fuzz` and friends.
#[derive(Debug, Error)]
pub enum FuzzError {
    /// No targets, no requests, or an ambiguous path. Raised before the
    /// main loop begins.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Connection reset/aborted during send/recv, surfaced when not
    /// covered by `ignore_connection_reset`/`ignore_connection_aborted`.
    #[error("transient target error: {0}")]
    TransientTarget(#[from] TransientTargetError),

    /// The target could not be reached at all (the initial connect, or
    /// configuring a send/recv timeout on it, failed) — distinct from
    /// `TransientTarget`, which covers a reset/abort mid-conversation on
    /// an already-open connection.
    #[error("failed to connect to target: {0}")]
    TargetConnection(std::io::Error),

    /// The process monitor reported a crash. Carries the synopsis
    /// recorded by the monitor/logger.
    #[error("crash signal on test case #{index}: {synopsis}")]
    CrashSignal { index: u64, synopsis: String },

    /// A configured restart method (an `on_failure` hook or the
    /// monitor's own `restart_target`) was exhausted without recovering
    /// the target. Fatal; the session persists state before propagating.
    #[error("restart of target failed")]
    RestartFailure,

    /// A user-supplied hook (`pre_send`, `post_send`, a transition
    /// callback) raised. The original error is preserved as the source.
    #[error("user hook raised an error")]
    UserHook(#[source] Box<dyn std::error::Error + Send + Sync>),

    /// Writing the persisted state file failed. (Reading a
    /// corrupt/missing file is *not* an error — see
    /// `session::persistence::import`, which fails silently.)
    #[error("failed to persist session state: {0}")]
    Persistence(std::io::Error),

    /// The caller interrupted the run (e.g. Ctrl-C). State has already
    /// been persisted by the time this is returned.
    #[error("fuzzing run was interrupted")]
    Interrupted,
}

/// The two transient transport failures callers are expected to be able
/// to selectively ignore, each carrying the originating errno the way
/// `ITargetConnection` implementations are expected to.
#[derive(Debug, Error)]
pub enum TransientTargetError {
    #[error("target connection reset (errno {errno}): {message}")]
    ConnectionReset { errno: i32, message: String },
    #[error("target connection aborted (errno {errno}): {message}")]
    ConnectionAborted { errno: i32, message: String },
}

pub type FuzzResult<T> = Result<T, FuzzError>;
