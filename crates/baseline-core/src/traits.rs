//! Core trait definitions for the baseline pipeline.
//!
//! Two traits define the boundary between this workspace and the outside:
//!
//! - `AccountApi`: the AWS control-plane collaborator (reads and writes)
//! - `MutationJournal`: trusted sink recording every mutating call attempt
//!
//! Credentials and region belong to the `AccountApi` implementation and are
//! fixed at construction. Nothing in the pipeline reads ambient process state.

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde_json::Value;

use baseline_contracts::{
    api::ApiError,
    control::ResourceRef,
    error::BaselineResult,
    journal::MutationRecord,
    state::{ResourceSnapshot, StateDiff},
};

/// The AWS control-plane surface the inspector and applier talk to.
///
/// Implementations must be safe to call concurrently for distinct resources.
#[async_trait]
pub trait AccountApi: Send + Sync {
    /// Describe a resource. `Ok(None)` means the resource does not exist.
    ///
    /// Must not mutate account state.
    async fn describe(&self, target: &ResourceRef) -> Result<Option<ResourceSnapshot>, ApiError>;

    /// Create the resource with the desired attributes and stamp `tags` on it.
    ///
    /// Implementations issue only the calls needed for the attributes present
    /// in `desired`.
    async fn create(
        &self,
        target: &ResourceRef,
        desired: &Value,
        tags: &BTreeMap<String, String>,
    ) -> Result<(), ApiError>;

    /// Converge the attributes listed in `diff` to their desired values.
    ///
    /// `desired` is the full desired object, for services whose update call
    /// replaces the whole configuration.
    async fn update(
        &self,
        target: &ResourceRef,
        desired: &Value,
        diff: &StateDiff,
    ) -> Result<(), ApiError>;

    /// Delete the resource.
    async fn delete(&self, target: &ResourceRef) -> Result<(), ApiError>;
}

/// The mutation journal: the append-only record of what the applier did.
///
/// Every mutating call attempt produces exactly one `MutationRecord`.
pub trait MutationJournal: Send + Sync {
    /// Append one record. Implementations must treat this as append-only.
    fn record(&self, record: &MutationRecord) -> BaselineResult<()>;

    /// Mark the run as complete. Called once, after the last record.
    fn finalize(&self, run_id: &str) -> BaselineResult<()>;
}
