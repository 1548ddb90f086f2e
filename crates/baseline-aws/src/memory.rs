//! In-memory implementation of `AccountApi`.
//!
//! `InMemoryAccount` is the reference account: a map of resources plus a
//! log of every call made against it. Faults and latency can be injected
//! per operation and resource, which is how retry, timeout and failure
//! paths are exercised. The resource map can be loaded from and saved to a
//! JSON file to simulate runs against a described account.

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::fmt;
use std::path::Path;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use baseline_contracts::{
    api::ApiError,
    control::{ResourceKind, ResourceRef},
    error::{BaselineError, BaselineResult},
    state::{ResourceSnapshot, StateDiff},
};
use baseline_core::traits::AccountApi;

/// The four collaborator operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ApiOp {
    Describe,
    Create,
    Update,
    Delete,
}

impl ApiOp {
    pub fn is_mutating(self) -> bool {
        !matches!(self, ApiOp::Describe)
    }
}

impl fmt::Display for ApiOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ApiOp::Describe => "describe",
            ApiOp::Create => "create",
            ApiOp::Update => "update",
            ApiOp::Delete => "delete",
        };
        f.write_str(s)
    }
}

/// One call made against the account, in arrival order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiCall {
    pub op: ApiOp,
    pub target: ResourceRef,
}

impl fmt::Display for ApiCall {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.op, self.target)
    }
}

/// One resource as stored in a simulation file.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct StoredResource {
    kind: ResourceKind,
    name: String,
    #[serde(default)]
    attributes: Value,
    #[serde(default)]
    tags: BTreeMap<String, String>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct AccountFile {
    #[serde(default)]
    resources: Vec<StoredResource>,
}

type FaultKey = (ApiOp, ResourceRef);

#[derive(Default)]
struct AccountState {
    resources: HashMap<ResourceRef, ResourceSnapshot>,
    calls: Vec<ApiCall>,
    /// Errors returned once each, front first.
    queued: HashMap<FaultKey, VecDeque<ApiError>>,
    /// Errors returned on every call.
    persistent: HashMap<FaultKey, ApiError>,
    /// Calls that hang for this long before answering.
    delayed: HashMap<FaultKey, Duration>,
}

/// A simulated AWS account.
#[derive(Default)]
pub struct InMemoryAccount {
    state: Mutex<AccountState>,
    latency: Duration,
}

impl InMemoryAccount {
    pub fn new() -> Self {
        Self::default()
    }

    /// Delay every call by `latency`.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Seed a resource.
    pub fn with_resource(
        self,
        target: ResourceRef,
        attributes: Value,
        tags: BTreeMap<String, String>,
    ) -> Self {
        self.insert(target, ResourceSnapshot { attributes, tags });
        self
    }

    pub fn insert(&self, target: ResourceRef, snapshot: ResourceSnapshot) {
        self.lock().resources.insert(target, snapshot);
    }

    pub fn snapshot(&self, target: &ResourceRef) -> Option<ResourceSnapshot> {
        self.lock().resources.get(target).cloned()
    }

    pub fn contains(&self, target: &ResourceRef) -> bool {
        self.lock().resources.contains_key(target)
    }

    pub fn resource_count(&self) -> usize {
        self.lock().resources.len()
    }

    /// Make the next calls of `op` on `target` fail with `errors`, in order.
    pub fn fail_next(&self, op: ApiOp, target: ResourceRef, errors: impl IntoIterator<Item = ApiError>) {
        self.lock()
            .queued
            .entry((op, target))
            .or_default()
            .extend(errors);
    }

    /// Make every call of `op` on `target` fail with `error`.
    pub fn fail_always(&self, op: ApiOp, target: ResourceRef, error: ApiError) {
        self.lock().persistent.insert((op, target), error);
    }

    /// Make every call of `op` on `target` take `delay` before answering.
    pub fn delay(&self, op: ApiOp, target: ResourceRef, delay: Duration) {
        self.lock().delayed.insert((op, target), delay);
    }

    /// Every call made so far, in order.
    pub fn calls(&self) -> Vec<ApiCall> {
        self.lock().calls.clone()
    }

    /// Only the mutating calls made so far.
    pub fn mutations(&self) -> Vec<ApiCall> {
        self.lock()
            .calls
            .iter()
            .filter(|c| c.op.is_mutating())
            .cloned()
            .collect()
    }

    pub fn clear_calls(&self) {
        self.lock().calls.clear();
    }

    // ── Simulation files ─────────────────────────────────────────────────────

    /// Load the resource map from a JSON simulation file. A missing file is
    /// an empty account.
    pub fn load(path: &Path) -> BaselineResult<Self> {
        if !path.exists() {
            return Ok(Self::new());
        }
        let contents = std::fs::read_to_string(path).map_err(|e| BaselineError::Io {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;
        let file: AccountFile = serde_json::from_str(&contents).map_err(|e| BaselineError::ConfigError {
            reason: format!("simulation file '{}' is not valid: {}", path.display(), e),
        })?;

        let account = Self::new();
        for r in file.resources {
            account.insert(
                ResourceRef { kind: r.kind, name: r.name },
                ResourceSnapshot { attributes: r.attributes, tags: r.tags },
            );
        }
        debug!(path = %path.display(), resources = account.resource_count(), "simulated account loaded");
        Ok(account)
    }

    /// Write the resource map to a JSON simulation file, sorted by resource.
    pub fn save(&self, path: &Path) -> BaselineResult<()> {
        let mut resources: Vec<StoredResource> = self
            .lock()
            .resources
            .iter()
            .map(|(target, snapshot)| StoredResource {
                kind: target.kind,
                name: target.name.clone(),
                attributes: snapshot.attributes.clone(),
                tags: snapshot.tags.clone(),
            })
            .collect();
        resources.sort_by(|a, b| (a.kind.to_string(), &a.name).cmp(&(b.kind.to_string(), &b.name)));

        let json = serde_json::to_string_pretty(&AccountFile { resources }).map_err(|e| BaselineError::Io {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;
        std::fs::write(path, json).map_err(|e| BaselineError::Io {
            path: path.display().to_string(),
            reason: e.to_string(),
        })
    }

    // ── Internals ────────────────────────────────────────────────────────────

    fn lock(&self) -> MutexGuard<'_, AccountState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Log the call, wait out any latency, then return the injected fault if
    /// there is one.
    async fn enter(&self, op: ApiOp, target: &ResourceRef) -> Result<(), ApiError> {
        let key = (op, target.clone());
        let delay = {
            let mut state = self.lock();
            state.calls.push(ApiCall { op, target: target.clone() });
            state.delayed.get(&key).copied().unwrap_or(self.latency)
        };

        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        let mut state = self.lock();
        if let Some(err) = state.queued.get_mut(&key).and_then(VecDeque::pop_front) {
            return Err(err);
        }
        match state.persistent.get(&key) {
            Some(err) => Err(err.clone()),
            None => Ok(()),
        }
    }
}

fn not_found(target: &ResourceRef) -> ApiError {
    ApiError::new("NoSuchEntity", format!("{} does not exist", target)).with_status(404)
}

#[async_trait]
impl AccountApi for InMemoryAccount {
    async fn describe(&self, target: &ResourceRef) -> Result<Option<ResourceSnapshot>, ApiError> {
        self.enter(ApiOp::Describe, target).await?;
        Ok(self.snapshot(target))
    }

    async fn create(
        &self,
        target: &ResourceRef,
        desired: &Value,
        tags: &BTreeMap<String, String>,
    ) -> Result<(), ApiError> {
        self.enter(ApiOp::Create, target).await?;
        let mut state = self.lock();
        if state.resources.contains_key(target) {
            return Err(ApiError::new("EntityAlreadyExists", format!("{} already exists", target))
                .with_status(409));
        }
        // Untaggable kinds silently drop tags, as the real services do.
        let tags = if target.kind.supports_tags() { tags.clone() } else { BTreeMap::new() };
        state.resources.insert(
            target.clone(),
            ResourceSnapshot { attributes: desired.clone(), tags },
        );
        Ok(())
    }

    async fn update(&self, target: &ResourceRef, _desired: &Value, diff: &StateDiff) -> Result<(), ApiError> {
        self.enter(ApiOp::Update, target).await?;
        let mut state = self.lock();
        let snapshot = state.resources.get_mut(target).ok_or_else(|| not_found(target))?;
        if !snapshot.attributes.is_object() {
            snapshot.attributes = Value::Object(serde_json::Map::new());
        }
        if let (Some(attrs), Value::Object(patch)) = (snapshot.attributes.as_object_mut(), diff.to_patch()) {
            attrs.extend(patch);
        }
        Ok(())
    }

    async fn delete(&self, target: &ResourceRef) -> Result<(), ApiError> {
        self.enter(ApiOp::Delete, target).await?;
        match self.lock().resources.remove(target) {
            Some(_) => Ok(()),
            None => Err(not_found(target)),
        }
    }
}
