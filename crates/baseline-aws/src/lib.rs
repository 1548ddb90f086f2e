//! # baseline-aws
//!
//! `AccountApi` implementations for the governance baseline.
//!
//! - `AwsCliAccount` drives a live account through the `aws` CLI, pinned to
//!   the region and profile in `AwsSettings`.
//! - `InMemoryAccount` is the reference account used by tests and by
//!   `baseline --simulate`.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use baseline_aws::{AwsCliAccount, AwsSettings};
//!
//! let account = AwsCliAccount::new(AwsSettings { region: "eu-west-1".into(), ..Default::default() })?;
//! let report = Runner::new(catalog, Arc::new(account)).plan(cancel).await?;
//! ```

pub mod cli;
pub mod memory;
pub mod settings;

pub use cli::process::{CommandOutput, CommandRunner, ProcessRunner};
pub use cli::AwsCliAccount;
pub use memory::{ApiCall, ApiOp, InMemoryAccount};
pub use settings::AwsSettings;
