//! Run report types.
//!
//! A `RunReport` lists every control in catalog order with an explicit
//! outcome. Silence never means success: a control that was not acted on is
//! still present, as `Skipped` or `Failed`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{
    control::{Category, ControlId, ResourceRef},
    decision::{Decision, Operation},
};

/// Unique identifier for one invocation of the pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RunId(pub uuid::Uuid);

impl RunId {
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4())
    }
}

impl Default for RunId {
    fn default() -> Self {
        Self::new()
    }
}

/// Which pipeline the run executed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RunMode {
    /// Inspect and reconcile only; print intended changes.
    Plan,
    /// Full pipeline: converge the account to the catalog.
    Apply,
    /// Remove managed resources in reverse dependency order.
    Teardown,
}

/// The final outcome recorded for one control.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "kebab-case")]
pub enum ControlOutcome {
    NoActionNeeded,
    /// Plan mode: the mutating decision that `apply` would execute.
    Planned { decision: Decision },
    Applied { operation: Operation },
    Skipped { reason: String },
    Unresolvable { reason: String },
    Failed { cause: String, retryable: bool },
}

impl ControlOutcome {
    /// True when the control can be relied on by its dependents.
    ///
    /// `Planned` counts as converged so a plan shows downstream changes too.
    pub fn is_converged(&self) -> bool {
        matches!(
            self,
            ControlOutcome::NoActionNeeded
                | ControlOutcome::Applied { .. }
                | ControlOutcome::Planned { .. }
        )
    }

    /// True for outcomes that make the overall run unsuccessful.
    pub fn is_blocking_failure(&self) -> bool {
        matches!(
            self,
            ControlOutcome::Unresolvable { .. } | ControlOutcome::Failed { retryable: false, .. }
        )
    }

    /// Short lowercase label used by the human renderer.
    pub fn label(&self) -> &'static str {
        match self {
            ControlOutcome::NoActionNeeded => "no-action-needed",
            ControlOutcome::Planned { .. } => "planned",
            ControlOutcome::Applied { .. } => "applied",
            ControlOutcome::Skipped { .. } => "skipped",
            ControlOutcome::Unresolvable { .. } => "unresolvable",
            ControlOutcome::Failed { .. } => "failed",
        }
    }
}

/// One line of the run report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportEntry {
    pub control_id: ControlId,
    pub category: Category,
    pub resource: ResourceRef,
    pub outcome: ControlOutcome,
    /// Number of mutating attempts made (0 when nothing was executed).
    #[serde(default)]
    pub attempts: u32,
    /// What the operator should do next, when the outcome needs attention.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remediation: Option<String>,
}

/// The structured result of one run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    pub run_id: RunId,
    pub mode: RunMode,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    /// Entries in catalog order (reverse order for teardown).
    pub entries: Vec<ReportEntry>,
    /// True iff no entry is `Unresolvable` or `Failed { retryable: false }`.
    pub success: bool,
    /// True when the deadline or an operator cancel stopped the run early.
    #[serde(default)]
    pub interrupted: bool,
    /// Set when the mutation journal could not be finalized. The entries are
    /// still accurate, but the audit trail for this run is incomplete.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub journal_error: Option<String>,
}

/// Outcome tallies, for summaries.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutcomeCounts {
    pub no_action_needed: usize,
    pub planned: usize,
    pub applied: usize,
    pub skipped: usize,
    pub unresolvable: usize,
    pub failed: usize,
}

impl RunReport {
    /// The `success` rule, applied to a set of entries.
    pub fn compute_success(entries: &[ReportEntry]) -> bool {
        !entries.iter().any(|e| e.outcome.is_blocking_failure())
    }

    /// True when every control converged and nothing is left for a re-run.
    ///
    /// Stricter than `success`: also rejects retryable failures, interrupted
    /// runs and runs whose journal could not be finalized.
    pub fn fully_succeeded(&self) -> bool {
        self.success
            && !self.interrupted
            && self.journal_error.is_none()
            && !self
                .entries
                .iter()
                .any(|e| matches!(e.outcome, ControlOutcome::Failed { .. }))
    }

    pub fn entry(&self, id: &str) -> Option<&ReportEntry> {
        self.entries.iter().find(|e| e.control_id.as_str() == id)
    }

    pub fn outcome(&self, id: &str) -> Option<&ControlOutcome> {
        self.entry(id).map(|e| &e.outcome)
    }

    pub fn counts(&self) -> OutcomeCounts {
        let mut counts = OutcomeCounts::default();
        for entry in &self.entries {
            match entry.outcome {
                ControlOutcome::NoActionNeeded => counts.no_action_needed += 1,
                ControlOutcome::Planned { .. } => counts.planned += 1,
                ControlOutcome::Applied { .. } => counts.applied += 1,
                ControlOutcome::Skipped { .. } => counts.skipped += 1,
                ControlOutcome::Unresolvable { .. } => counts.unresolvable += 1,
                ControlOutcome::Failed { .. } => counts.failed += 1,
            }
        }
        counts
    }
}
