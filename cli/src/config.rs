//! `baseline.toml`: account, run, retry and ownership settings.
//!
//! ```toml
//! [aws]
//! region = "eu-west-1"
//! profile = "governance"
//!
//! [run]
//! max_concurrency = 8
//!
//! [ownership]
//! tag_value = "acme-baseline"
//! ```
//!
//! Every table and field is optional.

use std::path::Path;

use serde::Deserialize;

use baseline_aws::AwsSettings;
use baseline_contracts::{
    error::{BaselineError, BaselineResult},
    state::OwnershipMarker,
};
use baseline_core::config::{RetryPolicy, RunSettings};

/// Looked up in the working directory when `--config` is not given.
pub const DEFAULT_CONFIG_FILE: &str = "baseline.toml";

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct OwnershipConfig {
    pub tag_key: String,
    pub tag_value: String,
}

impl Default for OwnershipConfig {
    fn default() -> Self {
        let marker = OwnershipMarker::default();
        Self {
            tag_key: marker.key,
            tag_value: marker.value,
        }
    }
}

impl OwnershipConfig {
    pub fn marker(&self) -> OwnershipMarker {
        OwnershipMarker::new(&self.tag_key, &self.tag_value)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BaselineConfig {
    pub aws: AwsSettings,
    pub run: RunSettings,
    pub retry: RetryPolicy,
    pub ownership: OwnershipConfig,
}

impl BaselineConfig {
    pub fn from_toml_str(s: &str) -> BaselineResult<Self> {
        let config: Self = toml::from_str(s).map_err(|e| BaselineError::ConfigError {
            reason: format!("failed to parse configuration: {}", e),
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Load `path`, or `baseline.toml` when no path is given.
    ///
    /// A missing default file yields the defaults; a missing explicit file
    /// is an error.
    pub fn load(path: Option<&Path>) -> BaselineResult<Self> {
        let (path, explicit) = match path {
            Some(p) => (p, true),
            None => (Path::new(DEFAULT_CONFIG_FILE), false),
        };
        if !path.exists() {
            if explicit {
                return Err(BaselineError::Io {
                    path: path.display().to_string(),
                    reason: "configuration file not found".to_string(),
                });
            }
            return Ok(Self::default());
        }
        let contents = std::fs::read_to_string(path).map_err(|e| BaselineError::Io {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;
        Self::from_toml_str(&contents)
    }

    pub fn validate(&self) -> BaselineResult<()> {
        self.aws.validate()?;
        self.run.validate()?;
        self.retry.validate()?;
        if self.ownership.tag_key.trim().is_empty() || self.ownership.tag_value.trim().is_empty() {
            return Err(BaselineError::ConfigError {
                reason: "ownership.tag_key and ownership.tag_value must not be empty".to_string(),
            });
        }
        Ok(())
    }
}
