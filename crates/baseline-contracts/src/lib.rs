//! # baseline-contracts
//!
//! Shared types and error contracts for the governance baseline applier.
//!
//! Every crate in the workspace imports from here. No business logic lives in
//! this crate, only data definitions and error types.

pub mod api;
pub mod control;
pub mod decision;
pub mod error;
pub mod journal;
pub mod report;
pub mod state;
