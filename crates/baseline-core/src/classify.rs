//! Retryability classification for collaborator errors.
//!
//! The error code decides first. Codes this module does not know fall back to
//! the HTTP-equivalent status: 429 and 5xx are retryable, any other status is
//! fatal, and an error with neither a known code nor a status is fatal.

use baseline_contracts::api::ApiError;

/// Whether a failed call may succeed if repeated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Throttling, timeouts, eventual-consistency races.
    Retryable,
    /// Permission, validation and other permanent failures.
    Fatal,
}

const RETRYABLE_CODES: &[&str] = &[
    "Throttling",
    "ThrottlingException",
    "ThrottledException",
    "RequestLimitExceeded",
    "RequestThrottled",
    "RequestThrottledException",
    "TooManyRequestsException",
    "SlowDown",
    "RequestTimeout",
    "RequestTimeoutException",
    "ServiceUnavailable",
    "ServiceUnavailableException",
    "InternalError",
    "InternalFailure",
    "InternalServiceError",
    "InternalErrorException",
    "ConcurrentModificationException",
    "OperationAborted",
    "PriorRequestNotComplete",
    "InsufficientS3BucketPolicyException",
    "InsufficientDeliveryPolicyException",
    "ResourceInUseException",
];

const FATAL_CODES: &[&str] = &[
    "AccessDenied",
    "AccessDeniedException",
    "UnauthorizedOperation",
    "UnrecognizedClientException",
    "InvalidClientTokenId",
    "ExpiredToken",
    "ExpiredTokenException",
    "AuthFailure",
    "ValidationError",
    "ValidationException",
    "InvalidParameterValue",
    "InvalidParameterValueException",
    "InvalidParameterCombination",
    "InvalidParameterException",
    "InvalidInputException",
    "InvalidRequest",
    "InvalidRequestException",
    "MalformedPolicyDocument",
    "MalformedPolicyDocumentException",
    "MalformedXML",
    "LimitExceeded",
    "LimitExceededException",
    "EntityAlreadyExists",
    "BucketAlreadyExists",
    "BucketAlreadyOwnedByYou",
    "TrailAlreadyExistsException",
    "DuplicateRecordException",
    "NoSuchEntity",
    "NotFoundException",
];

/// Classify a collaborator error for retry purposes.
pub fn classify(err: &ApiError) -> ErrorClass {
    let code = err.code.as_str();
    if RETRYABLE_CODES.contains(&code) {
        return ErrorClass::Retryable;
    }
    if FATAL_CODES.contains(&code) {
        return ErrorClass::Fatal;
    }
    match err.status {
        Some(429) => ErrorClass::Retryable,
        Some(s) if (500..600).contains(&s) => ErrorClass::Retryable,
        _ => ErrorClass::Fatal,
    }
}

pub fn is_retryable(err: &ApiError) -> bool {
    classify(err) == ErrorClass::Retryable
}
