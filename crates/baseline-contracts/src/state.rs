//! Observed-state types produced by the inspector.
//!
//! `ObservedState` is the only shape live account data takes once it leaves
//! the inspector. Loosely-typed collaborator responses never cross into the
//! reconciler or applier.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Whether a live resource carries this baseline's ownership marker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Ownership {
    /// The marker is present: the resource was created by this baseline.
    Managed,
    /// No marker (or a marker naming another owner): hands off.
    Foreign,
}

/// One attribute whose live value differs from the desired value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttributeDiff {
    /// Top-level attribute name from the control's `desired` object.
    pub attribute: String,
    /// The value the catalog asks for.
    pub desired: Value,
    /// The live value, or `None` when the attribute is missing entirely.
    pub observed: Option<Value>,
}

/// The full set of attribute differences for one control, ordered by
/// attribute name.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StateDiff(pub Vec<AttributeDiff>);

impl StateDiff {
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &AttributeDiff> {
        self.0.iter()
    }

    pub fn attributes(&self) -> Vec<&str> {
        self.0.iter().map(|d| d.attribute.as_str()).collect()
    }

    /// Build the JSON object holding only the desired values of the diverged
    /// attributes. This is the payload an update call receives.
    pub fn to_patch(&self) -> Value {
        let map: serde_json::Map<String, Value> = self
            .0
            .iter()
            .map(|d| (d.attribute.clone(), d.desired.clone()))
            .collect();
        Value::Object(map)
    }
}

/// What the inspector found for one control in the live account.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "kebab-case")]
pub enum ObservedState {
    /// The resource does not exist.
    Absent,
    /// The resource exists and satisfies every desired attribute.
    Matching {
        /// Ownership is carried so teardown can tell managed from adopted.
        ownership: Ownership,
    },
    /// The resource exists but at least one desired attribute differs.
    Divergent {
        diff: StateDiff,
        ownership: Ownership,
    },
    /// The collaborator could not answer. Callers decide whether to retry.
    InspectionFailed {
        cause: String,
        retryable: bool,
    },
}

/// A raw description of a live resource, as returned by the collaborator.
///
/// `attributes` is deliberately untyped; the inspector normalises it against
/// the control's desired attributes.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResourceSnapshot {
    pub attributes: Value,
    #[serde(default)]
    pub tags: BTreeMap<String, String>,
}

/// The tag convention proving a resource is managed by this baseline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OwnershipMarker {
    /// Tag key, e.g. "baseline:managed-by".
    pub key: String,
    /// Tag value identifying this baseline instance.
    pub value: String,
}

impl OwnershipMarker {
    /// Companion tag naming the control that created the resource.
    pub const CONTROL_TAG: &'static str = "baseline:control";

    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }

    /// True when `tags` carries this marker with the expected value.
    pub fn is_present(&self, tags: &BTreeMap<String, String>) -> bool {
        tags.get(&self.key).is_some_and(|v| v == &self.value)
    }

    /// The full tag set stamped onto a resource created for `control_id`.
    pub fn tags_for(&self, control_id: &str) -> BTreeMap<String, String> {
        let mut tags = BTreeMap::new();
        tags.insert(self.key.clone(), self.value.clone());
        tags.insert(Self::CONTROL_TAG.to_string(), control_id.to_string());
        tags
    }
}

impl Default for OwnershipMarker {
    fn default() -> Self {
        Self::new("baseline:managed-by", "aws-governance-baseline")
    }
}
