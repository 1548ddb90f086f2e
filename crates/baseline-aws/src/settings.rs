//! The `[aws]` configuration table.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use baseline_contracts::error::{BaselineError, BaselineResult};

/// Where and as whom the CLI adapter talks to AWS.
///
/// Passed to `AwsCliAccount` at construction. The adapter never falls back
/// to the region or profile of the surrounding process environment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AwsSettings {
    /// Region every call is pinned to.
    pub region: String,
    /// Named CLI profile; `None` uses the CLI's default credential chain.
    pub profile: Option<String>,
    /// Account id; looked up with `sts get-caller-identity` when absent.
    pub account_id: Option<String>,
    /// The `aws` executable.
    pub cli_path: PathBuf,
}

impl Default for AwsSettings {
    fn default() -> Self {
        Self {
            region: "us-east-1".to_string(),
            profile: None,
            account_id: None,
            cli_path: PathBuf::from("aws"),
        }
    }
}

impl AwsSettings {
    pub fn validate(&self) -> BaselineResult<()> {
        if self.region.trim().is_empty() {
            return Err(BaselineError::ConfigError {
                reason: "aws.region must not be empty".to_string(),
            });
        }
        if let Some(id) = &self.account_id {
            if id.len() != 12 || !id.chars().all(|c| c.is_ascii_digit()) {
                return Err(BaselineError::ConfigError {
                    reason: format!("aws.account_id '{}' is not a 12-digit account id", id),
                });
            }
        }
        if self.cli_path.as_os_str().is_empty() {
            return Err(BaselineError::ConfigError {
                reason: "aws.cli_path must not be empty".to_string(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::AwsSettings;

    #[test]
    fn defaults_are_valid() {
        assert!(AwsSettings::default().validate().is_ok());
    }

    #[test]
    fn malformed_account_id_is_rejected() {
        let settings = AwsSettings {
            account_id: Some("1234".to_string()),
            ..AwsSettings::default()
        };
        assert!(settings.validate().is_err());
    }

    #[test]
    fn empty_region_is_rejected() {
        let settings = AwsSettings {
            region: " ".to_string(),
            ..AwsSettings::default()
        };
        assert!(settings.validate().is_err());
    }
}
