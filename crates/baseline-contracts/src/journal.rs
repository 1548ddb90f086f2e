//! Mutation journal records.
//!
//! Every mutating call attempt the applier makes produces exactly one
//! `MutationRecord`. The journal writer appends it to its store; records are
//! never modified afterwards.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{
    control::{ControlId, ResourceRef},
    decision::Operation,
};

/// How a single mutating call attempt ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "kebab-case")]
pub enum MutationOutcome {
    Succeeded,
    Failed { code: String, message: String, retryable: bool },
    /// The call exceeded its timeout; whether it took effect is unknown.
    TimedOut,
}

/// An immutable record of one mutating call attempt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MutationRecord {
    /// The run that issued the call.
    pub run_id: String,
    pub control_id: ControlId,
    pub resource: ResourceRef,
    pub operation: Operation,
    /// 1-based attempt counter within this run.
    pub attempt: u32,
    pub outcome: MutationOutcome,
    /// Wall-clock time the attempt finished (UTC).
    pub timestamp: DateTime<Utc>,
}
