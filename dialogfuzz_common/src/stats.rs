//! Progress/event types shared between the engine and any status surface
//! (web UI, CLI progress line, logger): a plain-data snapshot plus a
//! small enum of notable transitions, both `Clone` so a consumer can
//! hold one without borrowing the live session.

use serde::{Deserialize, Serialize};

/// A point-in-time, owned copy of the session's counters. Produced once
/// per test case and handed to the web status server and/or logger; never
/// a reference into the live `Session`, so a background thread reading it
/// can never observe a torn update.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct SessionSnapshot {
    pub total_num_mutations: u64,
    pub total_mutant_index: u64,
    pub is_paused: bool,
    pub current_case_name: Option<String>,
    pub num_failures_recorded: u64,
}

/// Notable transitions during a campaign, for a logger or status line to
/// react to without inspecting the whole snapshot.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SessionEvent {
    Started,
    Paused,
    Resumed,
    RestartInterval { executed: u64 },
    PrimitiveExhausted { skipped: u64 },
    CaughtSignal(i32),
    Stopped,
    Done,
}
