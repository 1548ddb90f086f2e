//! # baseline-core
//!
//! The convergence pipeline for the AWS governance baseline.
//!
//! This crate provides:
//! - The boundary traits (`AccountApi`, `MutationJournal`)
//! - The validated, dependency-ordered `Catalog`
//! - The pipeline stages: `Inspector` → `reconcile` → `Applier` → `reporter`
//! - The `Runner` that wires them together wave by wave
//!
//! ## Usage
//!
//! ```rust,ignore
//! use baseline_core::{Catalog, Runner};
//!
//! let catalog = Catalog::load(controls)?;
//! let report = Runner::new(catalog, account).apply(cancel).await?;
//! ```

pub mod applier;
pub mod catalog;
pub mod classify;
pub mod config;
pub mod guard;
pub mod inspector;
pub mod reconciler;
pub mod reporter;
pub mod runner;
pub mod traits;

pub use catalog::Catalog;
pub use runner::Runner;
