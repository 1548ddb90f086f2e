//! Journal entry and exported log types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use baseline_contracts::journal::MutationRecord;

/// One link in the mutation journal's hash chain.
///
/// Editing any field, including those of the embedded `record`, invalidates
/// `this_hash` and every later `prev_hash`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JournalEntry {
    /// Position in the chain, starting at 0.
    pub sequence: u64,

    /// The mutating call attempt being recorded.
    pub record: MutationRecord,

    /// `this_hash` of the previous entry, or `GENESIS_HASH` for the first.
    pub prev_hash: String,

    /// SHA-256 (hex) over (sequence, prev_hash, record).
    pub this_hash: String,
}

impl JournalEntry {
    /// The `prev_hash` of the first entry in every chain.
    pub const GENESIS_HASH: &'static str =
        "0000000000000000000000000000000000000000000000000000000000000000";
}

/// A snapshot of the whole journal, as written to disk.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JournalLog {
    /// Every entry in chain order. May span several runs.
    pub entries: Vec<JournalEntry>,

    /// When this snapshot was taken.
    pub exported_at: DateTime<Utc>,

    /// `this_hash` of the last entry; empty for an empty journal.
    pub terminal_hash: String,
}

impl JournalLog {
    /// Entries belonging to one run.
    pub fn run_entries<'a>(&'a self, run_id: &'a str) -> impl Iterator<Item = &'a JournalEntry> {
        self.entries.iter().filter(move |e| e.record.run_id == run_id)
    }
}
