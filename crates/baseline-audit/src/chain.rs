//! Hash-chain primitives: hashing and chain integrity verification.
//!
//! Hash input layout (bytes, in order):
//!   1. sequence as 8-byte little-endian
//!   2. prev_hash as UTF-8 bytes (64 ASCII hex chars)
//!   3. compact JSON of the mutation record

use sha2::{Digest, Sha256};

use baseline_contracts::journal::MutationRecord;

use crate::entry::JournalEntry;

/// Compute the SHA-256 hash for one journal entry.
///
/// Returns a lowercase 64-character hex string, or the serialization error
/// if the record cannot be encoded.
pub fn hash_entry(
    sequence: u64,
    record: &MutationRecord,
    prev_hash: &str,
) -> Result<String, serde_json::Error> {
    let record_json = serde_json::to_vec(record)?;

    let mut hasher = Sha256::new();
    hasher.update(sequence.to_le_bytes());
    hasher.update(prev_hash.as_bytes());
    hasher.update(&record_json);

    Ok(hex::encode(hasher.finalize()))
}

/// Verify the integrity of a hash chain.
///
/// Returns `true` when every entry links to its predecessor (or to
/// `GENESIS_HASH` for the first one), carries the expected sequence number,
/// and stores the hash recomputed from its own fields. An empty chain is
/// valid.
pub fn verify_chain(entries: &[JournalEntry]) -> bool {
    let mut expected_prev = JournalEntry::GENESIS_HASH.to_string();

    for (position, entry) in entries.iter().enumerate() {
        if entry.sequence != position as u64 || entry.prev_hash != expected_prev {
            return false;
        }

        match hash_entry(entry.sequence, &entry.record, &entry.prev_hash) {
            Ok(recomputed) if recomputed == entry.this_hash => {}
            _ => return false,
        }

        expected_prev = entry.this_hash.clone();
    }

    true
}
