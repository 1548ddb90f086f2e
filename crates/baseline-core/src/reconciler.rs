//! The reconciler: a pure mapping from observed state to a decision.
//!
//! No I/O, no clock, no randomness. The same inputs always produce the same
//! decision, which is what makes the protection rules below testable.

use baseline_contracts::{
    decision::Decision,
    state::{ObservedState, Ownership},
};

/// Reason given when a foreign resource has drifted from the catalog.
pub const MANUAL_CHANGE: &str = "manual change detected";

/// Reason given when teardown finds a resource this baseline does not own.
pub const NOT_MANAGED: &str = "resource not managed by this baseline";

/// Decide how to converge a control given what the inspector observed.
///
/// Drift on a resource without the ownership marker is never corrected:
/// overwriting it could clobber a hand-tuned production configuration.
pub fn reconcile(observed: &ObservedState) -> Decision {
    match observed {
        ObservedState::Matching { .. } => Decision::NoActionNeeded,
        ObservedState::Absent => Decision::Create,
        ObservedState::Divergent { diff, ownership: Ownership::Managed } => Decision::Update {
            diff: diff.clone(),
        },
        ObservedState::Divergent { ownership: Ownership::Foreign, .. } => Decision::Unresolvable {
            reason: MANUAL_CHANGE.to_string(),
        },
        ObservedState::InspectionFailed { cause, .. } => Decision::Unresolvable {
            reason: cause.clone(),
        },
    }
}

/// Decide how to remove a control's resource during teardown.
///
/// Only resources carrying the ownership marker are deleted, whether or not
/// they still match the catalog.
pub fn reconcile_teardown(observed: &ObservedState) -> Decision {
    match observed {
        ObservedState::Absent => Decision::NoActionNeeded,
        ObservedState::Matching { ownership: Ownership::Managed }
        | ObservedState::Divergent { ownership: Ownership::Managed, .. } => Decision::Remove,
        ObservedState::Matching { ownership: Ownership::Foreign }
        | ObservedState::Divergent { ownership: Ownership::Foreign, .. } => {
            Decision::Unresolvable {
                reason: NOT_MANAGED.to_string(),
            }
        }
        ObservedState::InspectionFailed { cause, .. } => Decision::Unresolvable {
            reason: cause.clone(),
        },
    }
}
