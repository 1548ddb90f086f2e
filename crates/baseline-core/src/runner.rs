//! The baseline runner: drives the catalog through inspect → reconcile →
//! apply → report.
//!
//! The runner walks the catalog one dependency wave at a time:
//!
//!   gate on dependencies → inspect (concurrent, bounded) → reconcile →
//!   apply (sequential, catalog order) → next wave
//!
//! A wave starts only after the previous one has fully finished, so no
//! mutation ever races a dependency that has not converged. Every control in
//! the catalog ends up in the report with an explicit outcome.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use futures::stream::{self, StreamExt};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use baseline_contracts::{
    control::{Control, ControlId},
    decision::{ApplyResult, Decision},
    error::{BaselineError, BaselineResult},
    report::{ControlOutcome, RunId, RunMode, RunReport},
    state::OwnershipMarker,
};

use crate::{
    applier::Applier,
    catalog::Catalog,
    config::{RetryPolicy, RunSettings},
    guard::CallGuard,
    inspector::Inspector,
    reconciler::{reconcile, reconcile_teardown},
    reporter,
    traits::{AccountApi, MutationJournal},
};

/// Cause recorded for controls the run never reached.
const NOT_REACHED: &str = "run interrupted before this control was processed";

/// Runs one catalog against one account.
///
/// Construct with `Runner::new`, adjust with the `with_*` builders, then call
/// `plan`, `apply` or `teardown`. A runner can be reused for several runs;
/// each run gets its own run id and deadline.
pub struct Runner {
    catalog: Catalog,
    api: Arc<dyn AccountApi>,
    marker: OwnershipMarker,
    settings: RunSettings,
    retry: RetryPolicy,
    journal: Option<Arc<dyn MutationJournal>>,
}

impl Runner {
    pub fn new(catalog: Catalog, api: Arc<dyn AccountApi>) -> Self {
        Self {
            catalog,
            api,
            marker: OwnershipMarker::default(),
            settings: RunSettings::default(),
            retry: RetryPolicy::default(),
            journal: None,
        }
    }

    pub fn with_marker(mut self, marker: OwnershipMarker) -> Self {
        self.marker = marker;
        self
    }

    pub fn with_settings(mut self, settings: RunSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_journal(mut self, journal: Arc<dyn MutationJournal>) -> Self {
        self.journal = Some(journal);
        self
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    /// Inspect and reconcile only. No mutating call is ever issued.
    pub async fn plan(&self, cancel: CancellationToken) -> BaselineResult<RunReport> {
        self.run(RunMode::Plan, cancel).await
    }

    /// Converge the account to the catalog.
    pub async fn apply(&self, cancel: CancellationToken) -> BaselineResult<RunReport> {
        self.run(RunMode::Apply, cancel).await
    }

    /// Delete every managed resource, dependents first.
    pub async fn teardown(&self, cancel: CancellationToken) -> BaselineResult<RunReport> {
        self.run(RunMode::Teardown, cancel).await
    }

    /// Execute one run.
    ///
    /// Everything that happens to individual controls is in the report, and so
    /// is a failure to finalize the mutation journal.
    async fn run(&self, mode: RunMode, cancel: CancellationToken) -> BaselineResult<RunReport> {
        let run_id = RunId::new();
        let run_key = run_id.0.to_string();
        let started_at = Utc::now();

        info!(
            run_id = %run_key,
            mode = ?mode,
            controls = self.catalog.len(),
            "run starting"
        );

        let guard = CallGuard::new(cancel, self.settings.run_deadline(), self.settings.call_timeout());
        let inspector = Inspector::new(self.api.clone(), self.marker.clone());
        let mut applier = Applier::new(self.api.clone(), self.marker.clone(), self.retry.clone());
        if let Some(journal) = &self.journal {
            applier = applier.with_journal(journal.clone());
        }

        let waves = match mode {
            RunMode::Teardown => self.catalog.teardown_waves(),
            RunMode::Plan | RunMode::Apply => self.catalog.waves(),
        };

        let mut outcomes: HashMap<ControlId, (ControlOutcome, u32)> =
            HashMap::with_capacity(self.catalog.len());
        let mut interrupted = false;

        for (level, wave) in waves.iter().enumerate() {
            if guard.is_stopped() {
                interrupted = true;
                break;
            }
            debug!(run_id = %run_key, wave = level, controls = wave.len(), "wave starting");

            // ── Gate: upstream controls must have converged ──────────────────
            let mut ready: Vec<&Control> = Vec::with_capacity(wave.len());
            for &control in wave {
                match self.blocker(control, mode, &outcomes) {
                    Some(reason) => {
                        warn!(control_id = %control.id, reason = %reason, "control skipped");
                        outcomes.insert(control.id.clone(), (ControlOutcome::Skipped { reason }, 0));
                    }
                    None => ready.push(control),
                }
            }

            // ── Inspect concurrently, results in catalog order ───────────────
            let observed: Vec<_> = stream::iter(ready.iter().copied())
                .map(|control| inspector.inspect_with_retry(control, &guard, &self.retry))
                .buffered(self.settings.max_concurrency.max(1))
                .collect()
                .await;

            // ── Reconcile and apply, one control at a time ───────────────────
            for (control, observed) in ready.into_iter().zip(observed) {
                let Ok(observed) = observed else {
                    interrupted = true;
                    continue;
                };

                let decision = match mode {
                    RunMode::Teardown => reconcile_teardown(&observed),
                    RunMode::Plan | RunMode::Apply => reconcile(&observed),
                };
                debug!(control_id = %control.id, decision = ?decision, "reconciled");

                let (outcome, attempts) = match decision {
                    Decision::NoActionNeeded => (ControlOutcome::NoActionNeeded, 0),
                    Decision::Unresolvable { reason } => {
                        warn!(control_id = %control.id, reason = %reason, "control unresolvable");
                        (ControlOutcome::Unresolvable { reason }, 0)
                    }
                    decision if mode == RunMode::Plan => {
                        (ControlOutcome::Planned { decision }, 0)
                    }
                    decision => {
                        let applied = applier.apply(&run_key, control, &decision, &guard).await;
                        interrupted |= applied.interrupted;
                        let outcome = match (applied.result, decision.operation()) {
                            (ApplyResult::Applied, Some(operation)) => {
                                ControlOutcome::Applied { operation }
                            }
                            (ApplyResult::Applied, None) => ControlOutcome::NoActionNeeded,
                            (ApplyResult::Skipped { reason }, _) => ControlOutcome::Skipped { reason },
                            (ApplyResult::Failed { cause, retryable }, _) => {
                                ControlOutcome::Failed { cause, retryable }
                            }
                        };
                        (outcome, applied.attempts)
                    }
                };
                outcomes.insert(control.id.clone(), (outcome, attempts));
            }
        }

        // ── Report every control, in the order it was walked ─────────────────
        let entries: Vec<_> = waves
            .iter()
            .flatten()
            .map(|&control| {
                let (outcome, attempts) = outcomes.remove(&control.id).unwrap_or_else(|| {
                    interrupted = true;
                    (
                        ControlOutcome::Failed {
                            cause: NOT_REACHED.to_string(),
                            retryable: true,
                        },
                        0,
                    )
                });
                reporter::entry(control, outcome, attempts)
            })
            .collect();

        let mut report = reporter::finish(run_id, mode, started_at, entries, interrupted);
        if let Some(journal) = &self.journal {
            if let Err(e) = journal.finalize(&run_key) {
                let e = match e {
                    e @ BaselineError::JournalWriteFailed { .. } => e,
                    other => BaselineError::JournalWriteFailed {
                        reason: other.to_string(),
                    },
                };
                error!(run_id = %run_key, error = %e, "journal finalize failed");
                report.journal_error = Some(e.to_string());
            }
        }

        let counts = report.counts();
        info!(
            run_id = %run_key,
            success = report.success,
            interrupted = report.interrupted,
            applied = counts.applied,
            failed = counts.failed,
            unresolvable = counts.unresolvable,
            "run finished"
        );
        Ok(report)
    }

    /// Why `control` must not be processed yet, if anything blocks it.
    ///
    /// Forward runs wait on dependencies; teardown waits on dependents, which
    /// must be gone before what they rely on is removed.
    fn blocker(
        &self,
        control: &Control,
        mode: RunMode,
        outcomes: &HashMap<ControlId, (ControlOutcome, u32)>,
    ) -> Option<String> {
        let converged = |id: &ControlId| outcomes.get(id).is_some_and(|(o, _)| o.is_converged());

        match mode {
            RunMode::Plan | RunMode::Apply => control
                .depends_on
                .iter()
                .find(|dep| !converged(*dep))
                .map(|dep| format!("dependency '{}' did not converge", dep)),
            RunMode::Teardown => self
                .catalog
                .dependents_of(&control.id)
                .into_iter()
                .find(|dependent| !converged(&dependent.id))
                .map(|dependent| format!("dependent '{}' was not removed", dependent.id)),
        }
    }
}

// ── Tests ────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use std::collections::{BTreeMap, HashMap};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    use async_trait::async_trait;
    use pretty_assertions::assert_eq;
    use serde_json::{json, Value};
    use tokio_util::sync::CancellationToken;

    use baseline_contracts::{
        api::ApiError,
        control::{Category, Control, ControlId, ResourceKind, ResourceRef},
        decision::{Decision, Operation},
        error::{BaselineError, BaselineResult},
        journal::MutationRecord,
        report::ControlOutcome,
        state::{OwnershipMarker, ResourceSnapshot, StateDiff},
    };

    use super::Runner;
    use crate::{
        catalog::Catalog,
        config::{RetryPolicy, RunSettings},
        reconciler::{MANUAL_CHANGE, NOT_MANAGED},
        traits::{AccountApi, MutationJournal},
    };

    // ── Mock helpers ─────────────────────────────────────────────────────────

    /// A tiny account: resource name → snapshot. Mutations rewrite the map,
    /// and named resources can be made to fail every call.
    #[derive(Default)]
    struct FakeAccount {
        resources: Mutex<HashMap<String, ResourceSnapshot>>,
        failing: HashMap<String, ApiError>,
        log: Mutex<Vec<String>>,
    }

    impl FakeAccount {
        fn with(mut self, name: &str, attrs: Value, managed: bool) -> Self {
            let tags = if managed {
                OwnershipMarker::default().tags_for("test")
            } else {
                BTreeMap::new()
            };
            self.resources
                .get_mut()
                .unwrap()
                .insert(name.to_string(), ResourceSnapshot { attributes: attrs, tags });
            self
        }

        fn failing(mut self, name: &str, err: ApiError) -> Self {
            self.failing.insert(name.to_string(), err);
            self
        }

        fn log(&self) -> Vec<String> {
            self.log.lock().unwrap().clone()
        }

        fn mutations(&self) -> Vec<String> {
            self.log().into_iter().filter(|c| !c.starts_with("describe")).collect()
        }

        fn check(&self, call: String, name: &str) -> Result<(), ApiError> {
            self.log.lock().unwrap().push(call);
            match self.failing.get(name) {
                Some(err) => Err(err.clone()),
                None => Ok(()),
            }
        }
    }

    #[async_trait]
    impl AccountApi for FakeAccount {
        async fn describe(&self, t: &ResourceRef) -> Result<Option<ResourceSnapshot>, ApiError> {
            self.check(format!("describe:{}", t.name), "")?;
            Ok(self.resources.lock().unwrap().get(&t.name).cloned())
        }
        async fn create(&self, t: &ResourceRef, d: &Value, tags: &BTreeMap<String, String>) -> Result<(), ApiError> {
            self.check(format!("create:{}", t.name), &t.name)?;
            self.resources.lock().unwrap().insert(
                t.name.clone(),
                ResourceSnapshot { attributes: d.clone(), tags: tags.clone() },
            );
            Ok(())
        }
        async fn update(&self, t: &ResourceRef, d: &Value, _f: &StateDiff) -> Result<(), ApiError> {
            self.check(format!("update:{}", t.name), &t.name)?;
            if let Some(snapshot) = self.resources.lock().unwrap().get_mut(&t.name) {
                snapshot.attributes = d.clone();
            }
            Ok(())
        }
        async fn delete(&self, t: &ResourceRef) -> Result<(), ApiError> {
            self.check(format!("delete:{}", t.name), &t.name)?;
            self.resources.lock().unwrap().remove(&t.name);
            Ok(())
        }
    }

    #[derive(Default)]
    struct CountingJournal {
        records: Mutex<Vec<MutationRecord>>,
        finalized: Mutex<Vec<String>>,
        fail_finalize: bool,
    }

    impl MutationJournal for CountingJournal {
        fn record(&self, record: &MutationRecord) -> BaselineResult<()> {
            self.records.lock().unwrap().push(record.clone());
            Ok(())
        }
        fn finalize(&self, run_id: &str) -> BaselineResult<()> {
            if self.fail_finalize {
                return Err(BaselineError::Io { path: "journal.json".to_string(), reason: "read-only".to_string() });
            }
            self.finalized.lock().unwrap().push(run_id.to_string());
            Ok(())
        }
    }

    /// Every resource is absent and each describe takes a while, so
    /// overlapping inspections show up in `peak`.
    #[derive(Default)]
    struct SlowAccount {
        in_flight: AtomicUsize,
        peak: AtomicUsize,
        created: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl AccountApi for SlowAccount {
        async fn describe(&self, _t: &ResourceRef) -> Result<Option<ResourceSnapshot>, ApiError> {
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(20)).await;
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            Ok(None)
        }
        async fn create(&self, t: &ResourceRef, _d: &Value, _tags: &BTreeMap<String, String>) -> Result<(), ApiError> {
            self.created.lock().unwrap().push(t.name.clone());
            Ok(())
        }
        async fn update(&self, t: &ResourceRef, _d: &Value, _f: &StateDiff) -> Result<(), ApiError> {
            Err(ApiError::new("Unexpected", format!("update {}", t.name)))
        }
        async fn delete(&self, t: &ResourceRef) -> Result<(), ApiError> {
            Err(ApiError::new("Unexpected", format!("delete {}", t.name)))
        }
    }

    fn control(id: &str, kind: ResourceKind, resource: &str, desired: Value, deps: &[&str]) -> Control {
        Control {
            id: ControlId::new(id),
            category: Category::Logging,
            description: String::new(),
            kind,
            resource: resource.to_string(),
            desired,
            depends_on: deps.iter().map(|d| ControlId::new(*d)).collect(),
            remediation: None,
        }
    }

    fn bucket_and_trail() -> Catalog {
        Catalog::load(vec![
            control("bucket", ResourceKind::LogBucket, "audit-logs", json!({ "versioning": true }), &[]),
            control(
                "trail",
                ResourceKind::Trail,
                "org-trail",
                json!({ "multi_region": true, "bucket": "audit-logs" }),
                &["bucket"],
            ),
        ])
        .unwrap()
    }

    fn runner(catalog: Catalog, api: Arc<FakeAccount>) -> Runner {
        Runner::new(catalog, api).with_retry(RetryPolicy {
            base_delay_ms: 1,
            jitter: 0.0,
            ..RetryPolicy::default()
        })
    }

    // ── Apply scenarios ──────────────────────────────────────────────────────

    #[tokio::test]
    async fn empty_account_is_built_in_dependency_order() {
        let api = Arc::new(FakeAccount::default());
        let report = runner(bucket_and_trail(), api.clone())
            .apply(CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(
            report.outcome("bucket"),
            Some(&ControlOutcome::Applied { operation: Operation::Create })
        );
        assert_eq!(
            report.outcome("trail"),
            Some(&ControlOutcome::Applied { operation: Operation::Create })
        );
        assert_eq!(api.mutations(), vec!["create:audit-logs", "create:org-trail"]);
        assert!(report.success);
        assert!(report.fully_succeeded());
    }

    #[tokio::test]
    async fn converged_dependency_is_left_alone() {
        let api = Arc::new(
            FakeAccount::default().with("audit-logs", json!({ "versioning": true }), true),
        );
        let report = runner(bucket_and_trail(), api.clone())
            .apply(CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(report.outcome("bucket"), Some(&ControlOutcome::NoActionNeeded));
        assert_eq!(
            report.outcome("trail"),
            Some(&ControlOutcome::Applied { operation: Operation::Create })
        );
        assert_eq!(api.mutations(), vec!["create:org-trail"]);
    }

    #[tokio::test]
    async fn foreign_drift_is_reported_not_fixed() {
        let api = Arc::new(
            FakeAccount::default()
                .with("audit-logs", json!({ "versioning": true }), true)
                .with("org-trail", json!({ "multi_region": false, "bucket": "audit-logs" }), false),
        );
        let report = runner(bucket_and_trail(), api.clone())
            .apply(CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(report.outcome("bucket"), Some(&ControlOutcome::NoActionNeeded));
        assert_eq!(
            report.outcome("trail"),
            Some(&ControlOutcome::Unresolvable { reason: MANUAL_CHANGE.to_string() })
        );
        assert!(api.mutations().is_empty(), "foreign resources are never mutated");
        assert!(!report.success);
        assert!(report.entry("trail").and_then(|e| e.remediation.as_ref()).is_some());
    }

    #[tokio::test]
    async fn managed_drift_is_updated() {
        let api = Arc::new(
            FakeAccount::default()
                .with("audit-logs", json!({ "versioning": false }), true),
        );
        let report = runner(bucket_and_trail(), api.clone())
            .apply(CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(
            report.outcome("bucket"),
            Some(&ControlOutcome::Applied { operation: Operation::Update })
        );
        assert_eq!(api.mutations(), vec!["update:audit-logs", "create:org-trail"]);
    }

    #[tokio::test]
    async fn second_apply_is_a_no_op() {
        let api = Arc::new(FakeAccount::default());
        let r = runner(bucket_and_trail(), api.clone());

        r.apply(CancellationToken::new()).await.unwrap();
        let before = api.mutations().len();
        let report = r.apply(CancellationToken::new()).await.unwrap();

        assert_eq!(api.mutations().len(), before, "no mutating calls on a converged account");
        assert!(report
            .entries
            .iter()
            .all(|e| e.outcome == ControlOutcome::NoActionNeeded));
    }

    #[tokio::test]
    async fn fatal_failure_skips_dependents() {
        let api = Arc::new(
            FakeAccount::default().failing("audit-logs", ApiError::new("AccessDenied", "s3:CreateBucket")),
        );
        let report = runner(bucket_and_trail(), api.clone())
            .apply(CancellationToken::new())
            .await
            .unwrap();

        assert!(matches!(
            report.outcome("bucket"),
            Some(ControlOutcome::Failed { retryable: false, .. })
        ));
        assert_eq!(
            report.outcome("trail"),
            Some(&ControlOutcome::Skipped { reason: "dependency 'bucket' did not converge".to_string() })
        );
        assert!(!api.log().contains(&"describe:org-trail".to_string()), "skipped controls are not inspected");
        assert!(!report.success);
    }

    #[tokio::test]
    async fn exhausted_retries_are_a_blocking_failure() {
        let api = Arc::new(
            FakeAccount::default().failing("audit-logs", ApiError::new("ThrottlingException", "slow down")),
        );
        let report = runner(bucket_and_trail(), api.clone())
            .apply(CancellationToken::new())
            .await
            .unwrap();

        let entry = report.entry("bucket").unwrap();
        assert_eq!(entry.attempts, 3);
        assert!(matches!(entry.outcome, ControlOutcome::Failed { retryable: false, .. }));
        assert_eq!(
            api.mutations().iter().filter(|c| *c == "create:audit-logs").count(),
            3
        );
    }

    // ── Plan ─────────────────────────────────────────────────────────────────

    #[tokio::test]
    async fn plan_issues_no_mutations() {
        let api = Arc::new(FakeAccount::default());
        let report = runner(bucket_and_trail(), api.clone())
            .plan(CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(
            report.outcome("bucket"),
            Some(&ControlOutcome::Planned { decision: Decision::Create })
        );
        assert_eq!(
            report.outcome("trail"),
            Some(&ControlOutcome::Planned { decision: Decision::Create })
        );
        assert!(api.mutations().is_empty());
    }

    // ── Teardown ─────────────────────────────────────────────────────────────

    #[tokio::test]
    async fn teardown_removes_dependents_first() {
        let api = Arc::new(FakeAccount::default());
        let r = runner(bucket_and_trail(), api.clone());
        r.apply(CancellationToken::new()).await.unwrap();

        let report = r.teardown(CancellationToken::new()).await.unwrap();

        let order: Vec<&str> = report.entries.iter().map(|e| e.control_id.as_str()).collect();
        assert_eq!(order, vec!["trail", "bucket"]);
        let deletes: Vec<String> = api.mutations().into_iter().filter(|c| c.starts_with("delete")).collect();
        assert_eq!(deletes, vec!["delete:org-trail", "delete:audit-logs"]);
        assert!(report.fully_succeeded());
    }

    #[tokio::test]
    async fn teardown_leaves_foreign_resources_and_their_dependencies() {
        let api = Arc::new(
            FakeAccount::default()
                .with("audit-logs", json!({ "versioning": true }), true)
                .with("org-trail", json!({ "multi_region": true, "bucket": "audit-logs" }), false),
        );
        let report = runner(bucket_and_trail(), api.clone())
            .teardown(CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(
            report.outcome("trail"),
            Some(&ControlOutcome::Unresolvable { reason: NOT_MANAGED.to_string() })
        );
        assert_eq!(
            report.outcome("bucket"),
            Some(&ControlOutcome::Skipped { reason: "dependent 'trail' was not removed".to_string() })
        );
        assert!(api.mutations().is_empty());
    }

    // ── Interruption & journal ───────────────────────────────────────────────

    #[tokio::test]
    async fn cancelled_run_reports_every_control() {
        let api = Arc::new(FakeAccount::default());
        let token = CancellationToken::new();
        token.cancel();

        let report = runner(bucket_and_trail(), api.clone()).apply(token).await.unwrap();

        assert!(report.interrupted);
        assert_eq!(report.entries.len(), 2);
        assert!(report
            .entries
            .iter()
            .all(|e| matches!(e.outcome, ControlOutcome::Failed { retryable: true, .. })));
        assert!(report.success, "interruption alone is not a blocking failure");
        assert!(!report.fully_succeeded());
        assert!(api.log().is_empty());
    }

    #[tokio::test]
    async fn expired_deadline_stops_the_run() {
        let api = Arc::new(FakeAccount::default());
        let settings = RunSettings { run_deadline_secs: 0, ..RunSettings::default() };
        let report = runner(bucket_and_trail(), api.clone())
            .with_settings(settings)
            .apply(CancellationToken::new())
            .await
            .unwrap();

        assert!(report.interrupted);
        assert!(api.mutations().is_empty());
    }

    #[tokio::test]
    async fn unbounded_deadline_does_not_stop_the_run() {
        let api = Arc::new(FakeAccount::default());
        let settings = RunSettings { run_deadline_secs: u64::MAX, ..RunSettings::default() };
        let report = runner(bucket_and_trail(), api.clone())
            .with_settings(settings)
            .apply(CancellationToken::new())
            .await
            .unwrap();

        assert!(!report.interrupted);
        assert!(report.fully_succeeded());
        assert_eq!(api.mutations(), vec!["create:audit-logs", "create:org-trail"]);
    }

    // ── Concurrency ──────────────────────────────────────────────────────────

    #[tokio::test]
    async fn inspections_overlap_up_to_the_limit_and_applies_keep_catalog_order() {
        let names = ["a", "b", "c", "d"];
        let catalog = Catalog::load(
            names
                .iter()
                .map(|n| control(n, ResourceKind::LogBucket, n, json!({ "versioning": true }), &[]))
                .collect(),
        )
        .unwrap();
        let api = Arc::new(SlowAccount::default());
        let settings = RunSettings { max_concurrency: 2, ..RunSettings::default() };

        let report = Runner::new(catalog, api.clone())
            .with_settings(settings)
            .apply(CancellationToken::new())
            .await
            .unwrap();

        let peak = api.peak.load(Ordering::SeqCst);
        assert!(peak > 1, "inspections ran one at a time");
        assert!(peak <= 2, "{peak} inspections in flight, limit is 2");
        assert_eq!(*api.created.lock().unwrap(), names.map(String::from).to_vec());
        let ids: Vec<_> = report.entries.iter().map(|e| e.control_id.as_str()).collect();
        assert_eq!(ids, names.to_vec());
        assert!(report.fully_succeeded());
    }

    #[tokio::test]
    async fn mutations_are_journaled_and_finalized() {
        let api = Arc::new(FakeAccount::default());
        let journal = Arc::new(CountingJournal::default());
        let report = runner(bucket_and_trail(), api)
            .with_journal(journal.clone())
            .apply(CancellationToken::new())
            .await
            .unwrap();

        let records = journal.records.lock().unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].control_id, ControlId::new("bucket"));
        assert_eq!(records[1].control_id, ControlId::new("trail"));
        assert_eq!(*journal.finalized.lock().unwrap(), vec![report.run_id.0.to_string()]);
    }

    #[tokio::test]
    async fn journal_finalize_failure_keeps_the_report() {
        let api = Arc::new(FakeAccount::default());
        let journal = Arc::new(CountingJournal { fail_finalize: true, ..CountingJournal::default() });
        let report = runner(bucket_and_trail(), api.clone())
            .with_journal(journal.clone())
            .apply(CancellationToken::new())
            .await
            .unwrap();

        // The mutations happened and are still reported.
        assert_eq!(report.entries.len(), 2);
        assert_eq!(report.outcome("bucket"), Some(&ControlOutcome::Applied { operation: Operation::Create }));
        assert_eq!(api.mutations(), vec!["create:audit-logs", "create:org-trail"]);
        assert_eq!(journal.records.lock().unwrap().len(), 2);

        assert!(report.success);
        assert!(!report.fully_succeeded());
        assert!(report
            .journal_error
            .as_deref()
            .is_some_and(|reason| reason.starts_with("journal write failed")));
    }
}
