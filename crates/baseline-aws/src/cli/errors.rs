//! Turning CLI failures into `ApiError`s.
//!
//! The CLI reports service errors on stderr as
//!
//! ```text
//! An error occurred (NoSuchEntity) when calling the GetPolicy operation: Policy arn:... was not found.
//! ```
//!
//! S3 HEAD requests carry no error body, so their "code" is the bare HTTP
//! status, e.g. `(404) ... HeadBucket operation: Not Found`.

use baseline_contracts::api::ApiError;

const MARKER: &str = "An error occurred (";

/// Parse the CLI's stderr into an `ApiError`.
///
/// Output without the service error line (missing credentials, a bad
/// argument, a crash) becomes code `CliError`, which classifies as fatal.
pub fn parse_cli_error(stderr: &str) -> ApiError {
    let Some(start) = stderr.find(MARKER) else {
        let message = stderr.trim();
        let message = if message.is_empty() { "aws CLI exited with an error" } else { message };
        return ApiError::new("CliError", message);
    };

    let rest = &stderr[start + MARKER.len()..];
    let Some(end) = rest.find(')') else {
        return ApiError::new("CliError", stderr.trim());
    };
    let code = &rest[..end];
    let tail = &rest[end + 1..];
    let message = match tail.find(" operation") {
        Some(i) => {
            let mut after = &tail[i + " operation".len()..];
            // "(reached max retries: 2)" may sit between the operation and
            // the message.
            if let Some(stripped) = after.strip_prefix(" (") {
                after = stripped.split_once(')').map_or(stripped, |(_, r)| r);
            }
            after.strip_prefix(':').unwrap_or(after)
        }
        None => tail,
    }
    .trim();

    match code.parse::<u16>() {
        Ok(status) => ApiError::new(status_code_name(status), message).with_status(status),
        Err(_) => ApiError::new(code, message),
    }
}

fn status_code_name(status: u16) -> &'static str {
    match status {
        400 => "BadRequest",
        403 => "Forbidden",
        404 => "NotFound",
        429 => "TooManyRequests",
        500 => "InternalError",
        503 => "ServiceUnavailable",
        _ if status >= 500 => "ServerError",
        _ => "ClientError",
    }
}

/// The process could not be started or waited on.
pub fn spawn_error(program: &str, err: &std::io::Error) -> ApiError {
    if err.kind() == std::io::ErrorKind::NotFound {
        ApiError::new("CliNotFound", format!("'{}' was not found; install the aws CLI or set aws.cli_path", program))
    } else {
        ApiError::new("CliError", format!("failed to run '{}': {}", program, err))
    }
}

/// The CLI succeeded but printed something that is not JSON.
pub fn malformed_output(operation: &str, err: &serde_json::Error) -> ApiError {
    ApiError::new("MalformedResponse", format!("{} returned invalid JSON: {}", operation, err))
}

/// Error codes meaning "the resource does not exist".
pub fn is_not_found(err: &ApiError, codes: &[&str]) -> bool {
    err.code == "NotFound" || codes.contains(&err.code.as_str())
}
