//! # baseline-catalog
//!
//! Loads governance baselines from TOML and validates them before any
//! account access.
//!
//! ## Quick start
//!
//! ```rust,ignore
//! use std::path::Path;
//! use baseline_catalog::{default_catalog, from_file};
//!
//! let catalog = from_file(Path::new("baselines/aws-account.toml"))?;
//! // or the built-in baseline:
//! let catalog = default_catalog()?;
//! ```
//!
//! ## Validation
//!
//! Each control's `desired` table must satisfy the JSON Schema of its
//! `kind`; the dependency graph must be closed, duplicate-free and acyclic.
//! Any violation is a configuration error.

pub mod loader;
pub mod schema;

pub use loader::{default_catalog, from_file, from_toml_str, parse_controls, DEFAULT_BASELINE};
pub use schema::DesiredStateValidator;

// ── Tests ─────────────────────────────────────────────────────────────────────
