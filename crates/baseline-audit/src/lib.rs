//! # baseline-audit
//!
//! Append-only, SHA-256 hash-chained journal of every mutating call the
//! baseline applier makes.
//!
//! Every `MutationRecord` is wrapped in a `JournalEntry` that links to the
//! previous entry through its hash. Changing any stored byte breaks the chain
//! and `verify_chain` detects it.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use baseline_audit::InMemoryJournal;
//!
//! let journal = Arc::new(InMemoryJournal::open("baseline-journal.json")?);
//! let runner = Runner::new(catalog, account).with_journal(journal.clone());
//! runner.apply(cancel).await?;
//! assert!(journal.verify_integrity());
//! ```

pub mod chain;
pub mod entry;
pub mod memory;

pub use chain::{hash_entry, verify_chain};
pub use entry::{JournalEntry, JournalLog};
pub use memory::InMemoryJournal;

// ── Tests ─────────────────────────────────────────────────────────────────────
