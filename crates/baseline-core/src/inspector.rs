//! The state inspector: live account state → `ObservedState`.
//!
//! Inspection is read-only. The collaborator's untyped snapshot is normalised
//! here, against the control's desired attributes, and never leaves this
//! module in raw form.

use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, warn};

use baseline_contracts::{
    control::Control,
    state::{AttributeDiff, ObservedState, Ownership, OwnershipMarker, ResourceSnapshot, StateDiff},
};

use crate::{
    classify::is_retryable,
    config::RetryPolicy,
    guard::{CallError, CallGuard, Interrupted},
    traits::AccountApi,
};

/// Reads live state for controls. Holds no mutable state, so one inspector
/// can serve any number of concurrent inspections.
pub struct Inspector {
    api: Arc<dyn AccountApi>,
    marker: OwnershipMarker,
}

impl Inspector {
    pub fn new(api: Arc<dyn AccountApi>, marker: OwnershipMarker) -> Self {
        Self { api, marker }
    }

    /// Inspect one control with a single describe call.
    ///
    /// API failures and timeouts come back as `InspectionFailed`; only a
    /// stopped run yields `Err(Interrupted)`.
    pub async fn inspect(
        &self,
        control: &Control,
        guard: &CallGuard,
    ) -> Result<ObservedState, Interrupted> {
        let target = control.resource_ref();
        debug!(control_id = %control.id, resource = %target, "inspecting");

        let observed = match guard.read(self.api.describe(&target)).await {
            Ok(snapshot) => normalize(control, snapshot, &self.marker),
            Err(CallError::Api(err)) => ObservedState::InspectionFailed {
                cause: err.to_string(),
                retryable: is_retryable(&err),
            },
            Err(CallError::TimedOut(after)) => ObservedState::InspectionFailed {
                cause: format!("describe {} timed out after {:?}", target, after),
                retryable: true,
            },
            Err(CallError::Interrupted) => return Err(Interrupted),
        };
        Ok(observed)
    }

    /// Inspect, repeating retryable failures with the policy's backoff.
    ///
    /// Reads are side-effect free, so repeating them is always safe. The last
    /// failure is returned once attempts run out.
    pub async fn inspect_with_retry(
        &self,
        control: &Control,
        guard: &CallGuard,
        policy: &RetryPolicy,
    ) -> Result<ObservedState, Interrupted> {
        let mut attempt = 1;
        loop {
            let observed = self.inspect(control, guard).await?;
            match &observed {
                ObservedState::InspectionFailed { cause, retryable: true }
                    if attempt < policy.max_attempts =>
                {
                    let delay = policy.jittered_delay_after(attempt);
                    warn!(
                        control_id = %control.id,
                        attempt,
                        cause = %cause,
                        delay_ms = delay.as_millis() as u64,
                        "inspection failed, retrying"
                    );
                    if !guard.pause(delay).await {
                        return Err(Interrupted);
                    }
                    attempt += 1;
                }
                _ => return Ok(observed),
            }
        }
    }
}

/// Turn a raw snapshot into an `ObservedState` for `control`.
///
/// Ownership is `Managed` only when the kind supports tags and the marker is
/// present with the expected value.
pub fn normalize(
    control: &Control,
    snapshot: Option<ResourceSnapshot>,
    marker: &OwnershipMarker,
) -> ObservedState {
    let Some(snapshot) = snapshot else {
        return ObservedState::Absent;
    };

    let ownership = if control.kind.supports_tags() && marker.is_present(&snapshot.tags) {
        Ownership::Managed
    } else {
        Ownership::Foreign
    };

    let diff = diff_attributes(&control.desired, &snapshot.attributes);
    if diff.is_empty() {
        ObservedState::Matching { ownership }
    } else {
        ObservedState::Divergent { diff, ownership }
    }
}

/// Compare each desired top-level attribute with the observed one.
pub fn diff_attributes(desired: &Value, observed: &Value) -> StateDiff {
    let Some(desired) = desired.as_object() else {
        return StateDiff::default();
    };
    let observed = observed.as_object();

    let diffs = desired
        .iter()
        .filter_map(|(attribute, want)| {
            let have = observed.and_then(|m| m.get(attribute));
            if satisfies(want, have) {
                None
            } else {
                Some(AttributeDiff {
                    attribute: attribute.clone(),
                    desired: want.clone(),
                    observed: have.cloned(),
                })
            }
        })
        .collect();

    StateDiff(diffs)
}

/// Whether `observed` satisfies `desired`.
///
/// - objects: every desired key must be satisfied; extra observed keys are
///   ignored
/// - arrays: same length, and every desired element is satisfied by a
///   distinct observed element (order-insensitive)
/// - numbers: numeric equality, so `100` matches `100.0`
/// - everything else: JSON equality
fn satisfies(desired: &Value, observed: Option<&Value>) -> bool {
    let Some(observed) = observed else {
        return desired.is_null();
    };
    match (desired, observed) {
        (Value::Object(want), Value::Object(have)) => {
            want.iter().all(|(k, v)| satisfies(v, have.get(k)))
        }
        (Value::Array(want), Value::Array(have)) => {
            want.len() == have.len() && perfect_matching(want, have)
        }
        (Value::Number(a), Value::Number(b)) => a.as_f64() == b.as_f64(),
        _ => desired == observed,
    }
}

/// Whether every desired element can be paired with its own observed element.
///
/// Subset matching on objects makes greedy pairing unsound, so this searches
/// for augmenting paths over the compatibility matrix.
fn perfect_matching(want: &[Value], have: &[Value]) -> bool {
    let fits: Vec<Vec<bool>> = want
        .iter()
        .map(|w| have.iter().map(|h| satisfies(w, Some(h))).collect())
        .collect();
    let mut owner: Vec<Option<usize>> = vec![None; have.len()];
    (0..want.len()).all(|w| {
        let mut seen = vec![false; have.len()];
        augment(w, &fits, &mut owner, &mut seen)
    })
}

fn augment(w: usize, fits: &[Vec<bool>], owner: &mut [Option<usize>], seen: &mut [bool]) -> bool {
    for h in 0..owner.len() {
        if !fits[w][h] || seen[h] {
            continue;
        }
        seen[h] = true;
        let free = match owner[h] {
            None => true,
            Some(other) => augment(other, fits, owner, seen),
        };
        if free {
            owner[h] = Some(w);
            return true;
        }
    }
    false
}

// ── Tests ────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    use async_trait::async_trait;
    use pretty_assertions::assert_eq;
    use serde_json::{json, Value};
    use tokio_util::sync::CancellationToken;

    use baseline_contracts::{
        api::ApiError,
        control::{Category, Control, ControlId, ResourceKind, ResourceRef},
        state::{ObservedState, Ownership, OwnershipMarker, ResourceSnapshot, StateDiff},
    };

    use super::{diff_attributes, normalize, Inspector};
    use crate::{config::RetryPolicy, guard::CallGuard, traits::AccountApi};

    fn control(kind: ResourceKind, desired: Value) -> Control {
        Control {
            id: ControlId::new("c"),
            category: Category::Logging,
            description: String::new(),
            kind,
            resource: "r".to_string(),
            desired,
            depends_on: vec![],
            remediation: None,
        }
    }

    fn snapshot(attributes: Value, owned: bool) -> ResourceSnapshot {
        let tags = if owned {
            OwnershipMarker::default().tags_for("c")
        } else {
            BTreeMap::new()
        };
        ResourceSnapshot { attributes, tags }
    }

    /// Describe returns a scripted sequence of results, then repeats the last.
    struct ScriptedDescribe {
        script: Mutex<Vec<Result<Option<ResourceSnapshot>, ApiError>>>,
        calls: Mutex<u32>,
    }

    #[async_trait]
    impl AccountApi for ScriptedDescribe {
        async fn describe(&self, _t: &ResourceRef) -> Result<Option<ResourceSnapshot>, ApiError> {
            *self.calls.lock().unwrap() += 1;
            let mut script = self.script.lock().unwrap();
            if script.len() > 1 {
                script.remove(0)
            } else {
                script[0].clone()
            }
        }
        async fn create(&self, _t: &ResourceRef, _d: &Value, _g: &BTreeMap<String, String>) -> Result<(), ApiError> {
            panic!("inspector must not mutate");
        }
        async fn update(&self, _t: &ResourceRef, _d: &Value, _f: &StateDiff) -> Result<(), ApiError> {
            panic!("inspector must not mutate");
        }
        async fn delete(&self, _t: &ResourceRef) -> Result<(), ApiError> {
            panic!("inspector must not mutate");
        }
    }

    fn guard() -> CallGuard {
        CallGuard::new(CancellationToken::new(), Duration::from_secs(60), Duration::from_secs(5))
    }

    fn fast_retry() -> RetryPolicy {
        RetryPolicy { base_delay_ms: 1, jitter: 0.0, ..RetryPolicy::default() }
    }

    // ── normalize ────────────────────────────────────────────────────────────

    #[test]
    fn missing_resource_is_absent() {
        let c = control(ResourceKind::Trail, json!({ "multi_region": true }));
        assert_eq!(normalize(&c, None, &OwnershipMarker::default()), ObservedState::Absent);
    }

    #[test]
    fn extra_observed_attributes_are_ignored() {
        let c = control(ResourceKind::Trail, json!({ "multi_region": true }));
        let snap = snapshot(json!({ "multi_region": true, "home_region": "eu-west-1" }), true);
        assert_eq!(
            normalize(&c, Some(snap), &OwnershipMarker::default()),
            ObservedState::Matching { ownership: Ownership::Managed }
        );
    }

    #[test]
    fn divergence_without_marker_is_foreign() {
        let c = control(ResourceKind::Trail, json!({ "multi_region": true }));
        let snap = snapshot(json!({ "multi_region": false }), false);
        match normalize(&c, Some(snap), &OwnershipMarker::default()) {
            ObservedState::Divergent { diff, ownership } => {
                assert_eq!(ownership, Ownership::Foreign);
                assert_eq!(diff.attributes(), vec!["multi_region"]);
            }
            other => panic!("expected Divergent, got {:?}", other),
        }
    }

    #[test]
    fn untaggable_kinds_are_never_managed() {
        let c = control(ResourceKind::ConfigRecorder, json!({ "all_supported": true }));
        let snap = snapshot(json!({ "all_supported": false }), true);
        assert!(matches!(
            normalize(&c, Some(snap), &OwnershipMarker::default()),
            ObservedState::Divergent { ownership: Ownership::Foreign, .. }
        ));
    }

    // ── diff_attributes ──────────────────────────────────────────────────────

    #[test]
    fn nested_objects_match_as_subsets() {
        let desired = json!({ "policy": { "Version": "2012-10-17" } });
        let observed = json!({ "policy": { "Version": "2012-10-17", "Id": "x" } });
        assert!(diff_attributes(&desired, &observed).is_empty());
    }

    #[test]
    fn arrays_match_regardless_of_order() {
        let desired = json!({ "standards": ["a", "b"] });
        assert!(diff_attributes(&desired, &json!({ "standards": ["b", "a"] })).is_empty());
        assert_eq!(diff_attributes(&desired, &json!({ "standards": ["a"] })).len(), 1);
        assert_eq!(diff_attributes(&desired, &json!({ "standards": ["a", "b", "c"] })).len(), 1);
    }

    #[test]
    fn array_elements_are_matched_one_to_one() {
        let desired = json!({ "recipients": ["ops@example.com", "ops@example.com"] });
        let observed = json!({ "recipients": ["ops@example.com", "sec@example.com"] });
        assert_eq!(diff_attributes(&desired, &observed).len(), 1);

        let desired = json!({ "recipients": ["ops@example.com", "sec@example.com"] });
        let observed = json!({ "recipients": ["ops@example.com", "ops@example.com"] });
        assert_eq!(diff_attributes(&desired, &observed).len(), 1);

        let desired = json!({ "rules": [{ "id": "a" }, { "id": "b" }] });
        let observed = json!({ "rules": [{ "id": "b", "on": true }, { "id": "a", "on": true }] });
        assert!(diff_attributes(&desired, &observed).is_empty());

        // The looser desired element must not claim the only fit for the stricter one.
        let desired = json!({ "rules": [{ "id": "a" }, { "id": "a", "on": true }] });
        let observed = json!({ "rules": [{ "id": "a", "on": true }, { "id": "a" }] });
        assert!(diff_attributes(&desired, &observed).is_empty());
    }

    #[test]
    fn numbers_compare_numerically() {
        let desired = json!({ "limit_amount": 100 });
        assert!(diff_attributes(&desired, &json!({ "limit_amount": 100.0 })).is_empty());
    }

    #[test]
    fn missing_attribute_is_reported_as_none() {
        let diff = diff_attributes(&json!({ "versioning": true }), &json!({}));
        assert_eq!(diff.0[0].observed, None);
        assert_eq!(diff.0[0].desired, json!(true));
    }

    // ── Inspector ────────────────────────────────────────────────────────────

    #[tokio::test]
    async fn api_errors_become_inspection_failures() {
        let api = Arc::new(ScriptedDescribe {
            script: Mutex::new(vec![Err(ApiError::new("AccessDenied", "no describe"))]),
            calls: Mutex::new(0),
        });
        let inspector = Inspector::new(api, OwnershipMarker::default());
        let c = control(ResourceKind::Trail, json!({}));

        let observed = inspector.inspect(&c, &guard()).await.unwrap();
        match observed {
            ObservedState::InspectionFailed { cause, retryable } => {
                assert!(cause.contains("AccessDenied"));
                assert!(!retryable);
            }
            other => panic!("expected InspectionFailed, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn throttled_inspection_is_retried() {
        let api = Arc::new(ScriptedDescribe {
            script: Mutex::new(vec![
                Err(ApiError::new("ThrottlingException", "Rate exceeded")),
                Ok(None),
            ]),
            calls: Mutex::new(0),
        });
        let inspector = Inspector::new(api.clone(), OwnershipMarker::default());
        let c = control(ResourceKind::Trail, json!({}));

        let observed = inspector.inspect_with_retry(&c, &guard(), &fast_retry()).await.unwrap();
        assert_eq!(observed, ObservedState::Absent);
        assert_eq!(*api.calls.lock().unwrap(), 2);
    }

    #[tokio::test]
    async fn fatal_inspection_is_not_retried() {
        let api = Arc::new(ScriptedDescribe {
            script: Mutex::new(vec![Err(ApiError::new("AccessDenied", "no"))]),
            calls: Mutex::new(0),
        });
        let inspector = Inspector::new(api.clone(), OwnershipMarker::default());
        let c = control(ResourceKind::Trail, json!({}));

        let _ = inspector.inspect_with_retry(&c, &guard(), &fast_retry()).await.unwrap();
        assert_eq!(*api.calls.lock().unwrap(), 1);
    }

    #[tokio::test]
    async fn stopped_run_interrupts_inspection() {
        let api = Arc::new(ScriptedDescribe {
            script: Mutex::new(vec![Ok(None)]),
            calls: Mutex::new(0),
        });
        let inspector = Inspector::new(api.clone(), OwnershipMarker::default());
        let token = CancellationToken::new();
        token.cancel();
        let g = CallGuard::new(token, Duration::from_secs(60), Duration::from_secs(5));

        let c = control(ResourceKind::Trail, json!({}));
        assert!(inspector.inspect(&c, &g).await.is_err());
        assert_eq!(*api.calls.lock().unwrap(), 0);
    }
}
