//! Shared types for `dialogfuzz` and its CLI front end.
//!
//! Kept dependency-light (`getopts` + `serde` only) so that a CLI binary
//! can parse campaign options without pulling in the engine itself, the
//! same split `fuzzcheck_common` makes between `cargo-fuzzcheck` and
//! `fuzzcheck`.

pub mod arg;
pub mod stats;

pub use stats::{SessionEvent, SessionSnapshot};
