//! In-memory implementation of `MutationJournal`.
//!
//! `InMemoryJournal` keeps the chain in a `Vec` behind a `Mutex`. Opened
//! with a path, it resumes the chain stored there and rewrites the file on
//! every `finalize()`, so one journal file accumulates every run.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::Utc;
use tracing::{debug, info};

use baseline_contracts::{
    error::{BaselineError, BaselineResult},
    journal::MutationRecord,
};
use baseline_core::traits::MutationJournal;

use crate::{
    chain::{hash_entry, verify_chain},
    entry::{JournalEntry, JournalLog},
};

// ── Internal mutable state ────────────────────────────────────────────────────

pub(crate) struct JournalState {
    /// All entries in append order.
    pub(crate) entries: Vec<JournalEntry>,

    /// The `this_hash` of the last entry, or `GENESIS_HASH`.
    pub(crate) last_hash: String,
}

impl JournalState {
    fn from_entries(entries: Vec<JournalEntry>) -> Self {
        let last_hash = entries
            .last()
            .map(|e| e.this_hash.clone())
            .unwrap_or_else(|| JournalEntry::GENESIS_HASH.to_string());
        Self { entries, last_hash }
    }
}

// ── Public journal ────────────────────────────────────────────────────────────

/// An append-only mutation journal backed by a SHA-256 hash chain.
pub struct InMemoryJournal {
    pub(crate) state: Arc<Mutex<JournalState>>,
    path: Option<PathBuf>,
}

impl InMemoryJournal {
    /// An empty journal that lives only in memory.
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(JournalState::from_entries(Vec::new()))),
            path: None,
        }
    }

    /// A journal persisted at `path`.
    ///
    /// An existing file is loaded and its chain verified; a broken chain is
    /// refused rather than extended. A missing file starts a new chain.
    pub fn open(path: impl Into<PathBuf>) -> BaselineResult<Self> {
        let path = path.into();
        let entries = if path.exists() {
            let log = read_log(&path)?;
            if !verify_chain(&log.entries) {
                return Err(BaselineError::JournalWriteFailed {
                    reason: format!("existing journal '{}' fails chain verification", path.display()),
                });
            }
            debug!(path = %path.display(), entries = log.entries.len(), "journal resumed");
            log.entries
        } else {
            Vec::new()
        };

        Ok(Self {
            state: Arc::new(Mutex::new(JournalState::from_entries(entries))),
            path: Some(path),
        })
    }

    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// A snapshot of every entry written so far.
    pub fn export_log(&self) -> JournalLog {
        let state = self.lock();
        let terminal_hash = state
            .entries
            .last()
            .map(|e| e.this_hash.clone())
            .unwrap_or_default();

        JournalLog {
            entries: state.entries.clone(),
            exported_at: Utc::now(),
            terminal_hash,
        }
    }

    /// Check prev-hash linkage and hash correctness of the whole chain.
    pub fn verify_integrity(&self) -> bool {
        verify_chain(&self.lock().entries)
    }

    // Entries are only appended whole, so a poisoned lock still guards a
    // consistent chain.
    fn lock(&self) -> MutexGuard<'_, JournalState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for InMemoryJournal {
    fn default() -> Self {
        Self::new()
    }
}

// ── MutationJournal impl ──────────────────────────────────────────────────────

impl MutationJournal for InMemoryJournal {
    fn record(&self, record: &MutationRecord) -> BaselineResult<()> {
        let mut state = self.lock();

        let prev_hash = state.last_hash.clone();
        let sequence = state.entries.len() as u64;
        let this_hash = hash_entry(sequence, record, &prev_hash).map_err(|e| {
            BaselineError::JournalWriteFailed {
                reason: format!("record is not serializable: {}", e),
            }
        })?;

        state.entries.push(JournalEntry {
            sequence,
            record: record.clone(),
            prev_hash,
            this_hash: this_hash.clone(),
        });
        state.last_hash = this_hash;

        Ok(())
    }

    /// Seal a run: log the chain head and, for a persisted journal, write
    /// the whole chain to disk.
    fn finalize(&self, run_id: &str) -> BaselineResult<()> {
        let log = self.export_log();

        info!(
            run_id = %run_id,
            run_entries = log.run_entries(run_id).count(),
            total_entries = log.entries.len(),
            terminal_hash = %log.terminal_hash,
            "mutation journal finalized"
        );

        match &self.path {
            Some(path) => write_log(path, &log),
            None => Ok(()),
        }
    }
}

fn read_log(path: &Path) -> BaselineResult<JournalLog> {
    let contents = std::fs::read_to_string(path).map_err(|e| BaselineError::Io {
        path: path.display().to_string(),
        reason: e.to_string(),
    })?;
    serde_json::from_str(&contents).map_err(|e| BaselineError::JournalWriteFailed {
        reason: format!("existing journal '{}' is not valid JSON: {}", path.display(), e),
    })
}

fn write_log(path: &Path, log: &JournalLog) -> BaselineResult<()> {
    let json = serde_json::to_string_pretty(log).map_err(|e| BaselineError::JournalWriteFailed {
        reason: e.to_string(),
    })?;
    std::fs::write(path, json).map_err(|e| BaselineError::JournalWriteFailed {
        reason: format!("cannot write '{}': {}", path.display(), e),
    })
}
