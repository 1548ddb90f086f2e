//! Collaborator error type.
//!
//! The account API reports failures as `ApiError`. The applier decides
//! retryability from `code`, falling back to `status` when the code is not
//! one it recognises.

use std::fmt;

use serde::{Deserialize, Serialize};

/// A structured failure returned by the AWS control-plane collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiError {
    /// Service error code, e.g. "ThrottlingException" or "AccessDenied".
    pub code: String,
    /// Human-readable message from the service.
    pub message: String,
    /// HTTP-equivalent status when the collaborator exposes one.
    #[serde(default)]
    pub status: Option<u16>,
}

impl ApiError {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
            status: None,
        }
    }

    pub fn with_status(mut self, status: u16) -> Self {
        self.status = Some(status);
        self
    }
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.status {
            Some(status) => write!(f, "{} (HTTP {}): {}", self.code, status, self.message),
            None => write!(f, "{}: {}", self.code, self.message),
        }
    }
}

impl std::error::Error for ApiError {}
