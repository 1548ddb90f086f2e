//! The applier: executes mutating decisions against the account.
//!
//! One decision maps to one collaborator call (`create`, `update` or
//! `delete`); the account adapter issues only the service calls needed for
//! the attributes involved. Create stamps the ownership marker.
//!
//! Retry rules:
//!
//! - retryable API errors are retried up to `RetryPolicy::max_attempts`
//!   total attempts with jittered exponential backoff
//! - running out of attempts yields `Failed { retryable: false }`
//! - fatal API errors fail immediately
//! - a timed-out call is not retried: its outcome is unknown, so it is
//!   reported `Failed { retryable: true }` and left for the next run to
//!   re-inspect

use std::sync::Arc;

use chrono::Utc;
use tracing::{info, warn};

use baseline_contracts::{
    api::ApiError,
    control::{Control, ResourceRef},
    decision::{ApplyResult, Decision, Operation},
    journal::{MutationOutcome, MutationRecord},
    state::OwnershipMarker,
};

use crate::{
    classify::is_retryable,
    config::RetryPolicy,
    guard::{CallError, CallGuard},
    traits::{AccountApi, MutationJournal},
};

/// The result of applying one decision, with the number of calls made.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApplyOutcome {
    pub result: ApplyResult,
    pub attempts: u32,
    /// Set when the run stopped before the decision could be carried out.
    pub interrupted: bool,
}

impl ApplyOutcome {
    fn new(result: ApplyResult, attempts: u32) -> Self {
        Self { result, attempts, interrupted: false }
    }

    fn interrupted(cause: String, attempts: u32) -> Self {
        Self {
            result: ApplyResult::Failed { cause, retryable: true },
            attempts,
            interrupted: true,
        }
    }
}

/// Issues mutating calls for reconciliation decisions.
pub struct Applier {
    api: Arc<dyn AccountApi>,
    marker: OwnershipMarker,
    retry: RetryPolicy,
    journal: Option<Arc<dyn MutationJournal>>,
}

impl Applier {
    pub fn new(api: Arc<dyn AccountApi>, marker: OwnershipMarker, retry: RetryPolicy) -> Self {
        Self {
            api,
            marker,
            retry,
            journal: None,
        }
    }

    /// Record every mutating call attempt in `journal`.
    pub fn with_journal(mut self, journal: Arc<dyn MutationJournal>) -> Self {
        self.journal = Some(journal);
        self
    }

    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.retry
    }

    /// Execute `decision` for `control`.
    ///
    /// Non-mutating decisions are `Skipped` without touching the account.
    pub async fn apply(
        &self,
        run_id: &str,
        control: &Control,
        decision: &Decision,
        guard: &CallGuard,
    ) -> ApplyOutcome {
        let Some(operation) = decision.operation() else {
            return ApplyOutcome::new(
                ApplyResult::Skipped {
                    reason: "no mutation required".to_string(),
                },
                0,
            );
        };
        let target = control.resource_ref();

        let mut attempt: u32 = 0;
        loop {
            attempt += 1;

            let err = match guard.mutate(self.issue(control, decision, &target)).await {
                Ok(()) => {
                    if let Err(fail) = self.journal(run_id, control, operation, attempt, MutationOutcome::Succeeded) {
                        return ApplyOutcome::new(fail, attempt);
                    }
                    info!(
                        control_id = %control.id,
                        resource = %target,
                        operation = %operation,
                        attempt,
                        "mutation applied"
                    );
                    return ApplyOutcome::new(ApplyResult::Applied, attempt);
                }
                Err(CallError::Interrupted) => {
                    return ApplyOutcome::interrupted(
                        format!("run interrupted before {} of {} started", operation, target),
                        attempt - 1,
                    );
                }
                Err(CallError::TimedOut(after)) => {
                    warn!(
                        control_id = %control.id,
                        resource = %target,
                        operation = %operation,
                        "mutation timed out, outcome unknown"
                    );
                    if let Err(fail) = self.journal(run_id, control, operation, attempt, MutationOutcome::TimedOut) {
                        return ApplyOutcome::new(fail, attempt);
                    }
                    return ApplyOutcome::new(
                        ApplyResult::Failed {
                            cause: format!(
                                "{} of {} timed out after {:?}; outcome unknown until the next run re-inspects it",
                                operation, target, after
                            ),
                            retryable: true,
                        },
                        attempt,
                    );
                }
                Err(CallError::Api(err)) => err,
            };

            let retryable = is_retryable(&err);
            let recorded = MutationOutcome::Failed {
                code: err.code.clone(),
                message: err.message.clone(),
                retryable,
            };
            if let Err(fail) = self.journal(run_id, control, operation, attempt, recorded) {
                return ApplyOutcome::new(fail, attempt);
            }

            if !retryable {
                warn!(
                    control_id = %control.id,
                    resource = %target,
                    code = %err.code,
                    "mutation failed with a fatal error"
                );
                return ApplyOutcome::new(
                    ApplyResult::Failed {
                        cause: err.to_string(),
                        retryable: false,
                    },
                    attempt,
                );
            }

            if attempt >= self.retry.max_attempts {
                warn!(
                    control_id = %control.id,
                    resource = %target,
                    code = %err.code,
                    attempts = attempt,
                    "retries exhausted"
                );
                return ApplyOutcome::new(
                    ApplyResult::Failed {
                        cause: format!("{} (gave up after {} attempts)", err, attempt),
                        retryable: false,
                    },
                    attempt,
                );
            }

            let delay = self.retry.jittered_delay_after(attempt);
            warn!(
                control_id = %control.id,
                resource = %target,
                code = %err.code,
                attempt,
                delay_ms = delay.as_millis() as u64,
                "retryable failure, backing off"
            );
            if !guard.pause(delay).await {
                return ApplyOutcome::interrupted(
                    format!("{}; run interrupted before the next attempt", err),
                    attempt,
                );
            }
        }
    }

    async fn issue(
        &self,
        control: &Control,
        decision: &Decision,
        target: &ResourceRef,
    ) -> Result<(), ApiError> {
        match decision {
            Decision::Create => {
                let tags = self.marker.tags_for(control.id.as_str());
                self.api.create(target, &control.desired, &tags).await
            }
            Decision::Update { diff } => self.api.update(target, &control.desired, diff).await,
            Decision::Remove => self.api.delete(target).await,
            Decision::NoActionNeeded | Decision::Unresolvable { .. } => Ok(()),
        }
    }

    /// Append one journal record. A journal failure becomes a fatal apply
    /// failure: an unrecorded mutation must not be reported as applied.
    fn journal(
        &self,
        run_id: &str,
        control: &Control,
        operation: Operation,
        attempt: u32,
        outcome: MutationOutcome,
    ) -> Result<(), ApplyResult> {
        let Some(journal) = &self.journal else {
            return Ok(());
        };
        let record = MutationRecord {
            run_id: run_id.to_string(),
            control_id: control.id.clone(),
            resource: control.resource_ref(),
            operation,
            attempt,
            outcome,
            timestamp: Utc::now(),
        };
        journal.record(&record).map_err(|e| {
            warn!(control_id = %control.id, error = %e, "journal write failed");
            ApplyResult::Failed {
                cause: e.to_string(),
                retryable: false,
            }
        })
    }
}

// ── Tests ────────────────────────────────────────────────────────────────────
