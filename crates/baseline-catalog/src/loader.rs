//! TOML catalog loading.
//!
//! A catalog file is a list of `[[controls]]` tables:
//!
//! ```toml
//! [[controls]]
//! id = "cloudtrail-multi-region"
//! category = "logging"
//! kind = "trail"
//! resource = "org-audit-trail"
//! depends_on = ["audit-log-bucket"]
//!
//! [controls.desired]
//! bucket = "org-audit-logs"
//! multi_region = true
//! ```
//!
//! Loading runs three checks, in order, and stops at the first failure:
//! TOML syntax, desired-state schemas, then the dependency graph.

use std::path::Path;

use serde::Deserialize;
use tracing::debug;

use baseline_contracts::{
    control::Control,
    error::{BaselineError, BaselineResult},
};
use baseline_core::Catalog;

use crate::schema::DesiredStateValidator;

/// The built-in governance baseline.
pub const DEFAULT_BASELINE: &str = include_str!("../baselines/aws-account.toml");

/// The top-level shape of a catalog document.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CatalogDocument {
    #[serde(default)]
    pub controls: Vec<Control>,
}

/// Parse `s` into controls, in declaration order, without validating them.
///
/// Returns `BaselineError::CatalogError` when the TOML is malformed or does
/// not match the control schema.
pub fn parse_controls(s: &str) -> BaselineResult<Vec<Control>> {
    let doc: CatalogDocument = toml::from_str(s).map_err(|e| BaselineError::CatalogError {
        reason: format!("failed to parse catalog TOML: {}", e),
    })?;
    Ok(doc.controls)
}

/// Parse and fully validate a catalog document.
pub fn from_toml_str(s: &str) -> BaselineResult<Catalog> {
    let controls = parse_controls(s)?;
    DesiredStateValidator::new()?.check(&controls)?;
    let catalog = Catalog::load(controls)?;
    debug!(controls = catalog.len(), "catalog validated");
    Ok(catalog)
}

/// Read the file at `path` and load it as a catalog.
pub fn from_file(path: &Path) -> BaselineResult<Catalog> {
    let contents = std::fs::read_to_string(path).map_err(|e| BaselineError::Io {
        path: path.display().to_string(),
        reason: e.to_string(),
    })?;
    from_toml_str(&contents)
}

/// The built-in baseline, validated.
pub fn default_catalog() -> BaselineResult<Catalog> {
    from_toml_str(DEFAULT_BASELINE)
}
