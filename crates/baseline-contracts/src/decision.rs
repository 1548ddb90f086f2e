//! Reconciliation decisions and apply results.
//!
//! The reconciler turns `(Control, ObservedState)` into a `Decision`; the
//! applier turns a `Decision` into an `ApplyResult`. Neither type carries
//! live account data beyond the diff.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::state::StateDiff;

/// What the reconciler decided to do about one control.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "decision", rename_all = "kebab-case")]
pub enum Decision {
    /// Live state already satisfies the control.
    NoActionNeeded,
    /// The resource is absent and must be created (and stamped).
    Create,
    /// The resource is managed by this baseline and has drifted.
    Update { diff: StateDiff },
    /// Teardown only: the managed resource must be deleted.
    Remove,
    /// The divergence cannot be corrected safely. Never auto-resolved.
    Unresolvable { reason: String },
}

impl Decision {
    /// True for decisions that will issue mutating calls.
    pub fn is_mutating(&self) -> bool {
        matches!(self, Decision::Create | Decision::Update { .. } | Decision::Remove)
    }

    /// The mutating operation this decision maps to, if any.
    pub fn operation(&self) -> Option<Operation> {
        match self {
            Decision::Create => Some(Operation::Create),
            Decision::Update { .. } => Some(Operation::Update),
            Decision::Remove => Some(Operation::Delete),
            Decision::NoActionNeeded | Decision::Unresolvable { .. } => None,
        }
    }
}

/// A mutating collaborator operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Operation {
    Create,
    Update,
    Delete,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Operation::Create => "create",
            Operation::Update => "update",
            Operation::Delete => "delete",
        };
        f.write_str(s)
    }
}

/// The outcome of executing one decision against the account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "result", rename_all = "kebab-case")]
pub enum ApplyResult {
    /// The mutating calls succeeded.
    Applied,
    /// Nothing was executed.
    Skipped { reason: String },
    /// The calls failed. `retryable` is false once retries are exhausted or
    /// the failure was fatal from the start.
    Failed { cause: String, retryable: bool },
}
