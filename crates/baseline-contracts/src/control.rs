//! Control identity and declaration types.
//!
//! A `Control` is one governance requirement the baseline enforces on an
//! account. Controls are loaded once from the catalog and never modified
//! afterwards; every later stage of the pipeline borrows them.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Stable, human-readable identifier for a control.
///
/// Used as the key in dependency lists, reports and the mutation journal.
/// Example: ControlId("cloudtrail-multi-region")
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ControlId(pub String);

impl ControlId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ControlId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// The governance area a control belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Category {
    Identity,
    Logging,
    Compliance,
    Findings,
    Cost,
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Category::Identity => "identity",
            Category::Logging => "logging",
            Category::Compliance => "compliance",
            Category::Findings => "findings",
            Category::Cost => "cost",
        };
        f.write_str(s)
    }
}

/// The kind of AWS resource a control governs.
///
/// The kind selects which collaborator calls the account adapter issues and
/// which attribute schema the catalog validates `desired` against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ResourceKind {
    /// Customer-managed IAM policy (e.g. deny-without-MFA).
    IamPolicy,
    /// S3 bucket receiving CloudTrail / Config deliveries.
    LogBucket,
    /// CloudTrail trail.
    Trail,
    /// AWS Config recorder together with its delivery channel.
    ConfigRecorder,
    /// AWS Config managed rule.
    ConfigRule,
    /// Security Hub subscription and its enabled standards.
    SecurityHub,
    /// AWS Budgets cost budget with an alert notification.
    Budget,
}

impl ResourceKind {
    /// Whether resources of this kind can carry the ownership marker tag.
    ///
    /// Untaggable resources can never be proven to be managed, so drift on
    /// them is always reported as foreign.
    pub fn supports_tags(self) -> bool {
        !matches!(self, ResourceKind::ConfigRecorder)
    }

    pub fn all() -> [ResourceKind; 7] {
        [
            ResourceKind::IamPolicy,
            ResourceKind::LogBucket,
            ResourceKind::Trail,
            ResourceKind::ConfigRecorder,
            ResourceKind::ConfigRule,
            ResourceKind::SecurityHub,
            ResourceKind::Budget,
        ]
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ResourceKind::IamPolicy => "iam-policy",
            ResourceKind::LogBucket => "log-bucket",
            ResourceKind::Trail => "trail",
            ResourceKind::ConfigRecorder => "config-recorder",
            ResourceKind::ConfigRule => "config-rule",
            ResourceKind::SecurityHub => "security-hub",
            ResourceKind::Budget => "budget",
        };
        f.write_str(s)
    }
}

/// Addresses one concrete resource in the account: its kind plus its name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ResourceRef {
    pub kind: ResourceKind,
    pub name: String,
}

impl fmt::Display for ResourceRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.kind, self.name)
    }
}

/// A single governance requirement, as declared in the catalog.
///
/// `desired` is the desired-state predicate: a JSON object whose attributes
/// must all be present, with equal values, on the live resource. Attributes
/// the catalog does not mention are ignored.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Control {
    /// Unique identifier within the catalog.
    pub id: ControlId,
    /// Governance area, used for grouping in reports.
    pub category: Category,
    /// Human-readable summary of what the control enforces.
    #[serde(default)]
    pub description: String,
    /// Which resource kind this control governs.
    pub kind: ResourceKind,
    /// Name of the governed resource (bucket name, trail name, ...).
    pub resource: String,
    /// Target attributes for the resource.
    pub desired: serde_json::Value,
    /// Controls that must converge before this one is acted on.
    #[serde(default)]
    pub depends_on: Vec<ControlId>,
    /// Operator hint shown in the report when this control does not converge.
    #[serde(default)]
    pub remediation: Option<String>,
}

impl Control {
    pub fn resource_ref(&self) -> ResourceRef {
        ResourceRef {
            kind: self.kind,
            name: self.resource.clone(),
        }
    }
}
