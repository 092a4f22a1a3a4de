//! Session-state persistence. Grounded on
//! `original_source/boofuzz/sessions.py`'s `export_file`/`import_file`
//! (`zlib` + `cPickle`): the idiomatic Rust analogue swaps in `serde` +
//! `bincode` for the object encoding and `flate2`'s zlib codec for the
//! compression, keeping the same "compress the whole blob" shape.
//!
//! A pluggable serializer trait for swapping encodings is deliberately
//! not introduced here — this module only ever persists one fixed
//! schema, so a trait indirection would add nothing.

use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;
use flate2::Compression;
use serde::{Deserialize, Serialize};
use std::io::{Read, Write};
use std::path::Path;
use std::time::Duration;

/// Everything needed to resume a campaign exactly where it left off: the
/// global mutation cursor, which request/path it belongs to, the option
/// values `export_file` in the original also round-trips (skip,
/// sleep-time, restart interval/sleep-time, crash threshold, web port),
/// the pause flag, and the crash synopsis recorded against each mutation
/// index so far. Traversal structure itself (the graph) is not persisted
/// — it is rebuilt by the caller before resuming, the same division of
/// labor `import_file` assumes in the original.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PersistedState {
    pub total_mutant_index: u64,
    pub num_cases_actually_fuzzed: u64,
    pub requests_fuzzed_index: std::collections::BTreeMap<String, u64>,
    pub skip: u64,
    pub sleep_time: Duration,
    pub restart_interval: u64,
    pub restart_sleep_time: Duration,
    pub crash_threshold: u32,
    pub web_port: u16,
    pub is_paused: bool,
    /// Mutation index -> the crash synopsis observed on that case, for
    /// every case that crashed so far this campaign.
    pub crash_synopses: std::collections::BTreeMap<u64, String>,
}

/// Write compressed, encoded state to `path`. Unlike `import`, failures
/// here are real errors — silently losing a session on write would be
/// worse than crashing loudly.
pub fn export(path: &Path, state: &PersistedState) -> std::io::Result<()> {
    let encoded = bincode::serialize(state)
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(&encoded)?;
    let compressed = encoder.finish()?;

    let tmp_path = path.with_extension("tmp");
    std::fs::write(&tmp_path, compressed)?;
    std::fs::rename(&tmp_path, path)?;
    Ok(())
}

/// Read previously exported state. A missing file, a corrupt file, or a
/// decode failure all produce a fresh, empty state rather than an error —
/// a campaign should always be able to start, even if its resume point is
/// gone.
pub fn import(path: &Path) -> PersistedState {
    let Ok(bytes) = std::fs::read(path) else {
        return PersistedState::default();
    };
    let mut decoder = ZlibDecoder::new(&bytes[..]);
    let mut decoded = Vec::new();
    if decoder.read_to_end(&mut decoded).is_err() {
        return PersistedState::default();
    }
    bincode::deserialize(&decoded).unwrap_or_default()
}
