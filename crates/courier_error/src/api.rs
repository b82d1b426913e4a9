//! Structured failures reported by the remote API.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;
use std::time::Duration;

static RETRY_AFTER_PHRASE: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"(?i)retry after (\d+)").ok());

/// Extra hints the remote service attaches to some failures.
///
/// # Examples
///
/// ```
/// use courier_error::ResponseParameters;
///
/// let params: ResponseParameters = serde_json::from_str(r#"{"retry_after": 14}"#).unwrap();
/// assert_eq!(params.retry_after, Some(14));
/// assert_eq!(params.migrate_to_chat_id, None);
/// ```
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResponseParameters {
    /// Seconds to wait before the request may be repeated
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retry_after: Option<u64>,
    /// The group was upgraded to a supergroup with this identifier
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub migrate_to_chat_id: Option<i64>,
}

/// Failure envelope returned by the remote service.
#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    #[serde(default)]
    error_code: Option<u16>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    parameters: Option<ResponseParameters>,
}

/// The remote service answered with a structured failure.
#[derive(Debug, Clone, derive_more::Display, derive_more::Error)]
#[display("API Error {}: {} at line {} in {}", code, description, line, file)]
pub struct ApiError {
    /// HTTP-like status code reported by the service
    pub code: u16,
    /// Human-readable description reported by the service
    pub description: String,
    /// Optional hints (retry delay, chat migration)
    pub parameters: ResponseParameters,
    /// Line number where the error occurred
    pub line: u32,
    /// File where the error occurred
    pub file: &'static str,
}

impl ApiError {
    /// Create a new ApiError at the current location.
    ///
    /// # Examples
    ///
    /// ```
    /// use courier_error::ApiError;
    ///
    /// let err = ApiError::new(400, "Bad Request: chat not found");
    /// assert_eq!(err.code, 400);
    /// ```
    #[track_caller]
    pub fn new(code: u16, description: impl Into<String>) -> Self {
        Self::with_parameters(code, description, ResponseParameters::default())
    }

    /// Create a new ApiError carrying response parameters.
    #[track_caller]
    pub fn with_parameters(
        code: u16,
        description: impl Into<String>,
        parameters: ResponseParameters,
    ) -> Self {
        let location = std::panic::Location::caller();
        Self {
            code,
            description: description.into(),
            parameters,
            line: location.line(),
            file: location.file(),
        }
    }

    /// Build an error from a failed HTTP response.
    ///
    /// The body is decoded as the service's JSON failure envelope. The envelope's
    /// `error_code` wins over the HTTP status when both are present. If the body is
    /// not an envelope, the raw text becomes the description.
    ///
    /// # Examples
    ///
    /// ```
    /// use courier_error::ApiError;
    /// use std::time::Duration;
    ///
    /// let body = r#"{"ok":false,"error_code":429,"description":"Too Many Requests: retry after 7","parameters":{"retry_after":7}}"#;
    /// let err = ApiError::from_response(429, body);
    /// assert_eq!(err.code, 429);
    /// assert_eq!(err.retry_after(), Some(Duration::from_secs(7)));
    /// ```
    #[track_caller]
    pub fn from_response(status: u16, body: &str) -> Self {
        match serde_json::from_str::<ErrorEnvelope>(body) {
            Ok(envelope) => Self::with_parameters(
                envelope.error_code.unwrap_or(status),
                envelope.description.unwrap_or_default(),
                envelope.parameters.unwrap_or_default(),
            ),
            Err(_) => Self::new(status, body.trim()),
        }
    }

    /// Delay the service asked for before the request may be repeated.
    ///
    /// Taken from the response parameters, or parsed from a `retry after N`
    /// phrase in the description when the parameters are missing.
    pub fn retry_after(&self) -> Option<Duration> {
        self.parameters
            .retry_after
            .or_else(|| parse_retry_after(&self.description))
            .map(Duration::from_secs)
    }

    /// Identifier of the supergroup a migrated chat moved to.
    pub fn migrate_to_chat_id(&self) -> Option<i64> {
        self.parameters.migrate_to_chat_id
    }
}

fn parse_retry_after(description: &str) -> Option<u64> {
    RETRY_AFTER_PHRASE
        .as_ref()?
        .captures(description)?
        .get(1)?
        .as_str()
        .parse()
        .ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retry_after_from_parameters() {
        let err = ApiError::with_parameters(
            429,
            "Too Many Requests",
            ResponseParameters {
                retry_after: Some(3),
                migrate_to_chat_id: None,
            },
        );
        assert_eq!(err.retry_after(), Some(Duration::from_secs(3)));
    }

    #[test]
    fn test_retry_after_parsed_from_description() {
        let err = ApiError::new(429, "Too Many Requests: Retry After 42");
        assert_eq!(err.retry_after(), Some(Duration::from_secs(42)));
    }

    #[test]
    fn test_parameters_win_over_description() {
        let err = ApiError::with_parameters(
            429,
            "Too Many Requests: retry after 42",
            ResponseParameters {
                retry_after: Some(5),
                migrate_to_chat_id: None,
            },
        );
        assert_eq!(err.retry_after(), Some(Duration::from_secs(5)));
    }

    #[test]
    fn test_no_retry_after() {
        let err = ApiError::new(400, "Bad Request: chat not found");
        assert_eq!(err.retry_after(), None);
    }

    #[test]
    fn test_from_response_envelope() {
        let body = r#"{"ok":false,"error_code":400,"description":"Bad Request: group chat was upgraded to a supergroup chat","parameters":{"migrate_to_chat_id":-1001234}}"#;
        let err = ApiError::from_response(400, body);
        assert_eq!(err.code, 400);
        assert!(err.description.contains("upgraded"));
        assert_eq!(err.migrate_to_chat_id(), Some(-1001234));
    }

    #[test]
    fn test_from_response_plain_body() {
        let err = ApiError::from_response(502, "  Bad Gateway\n");
        assert_eq!(err.code, 502);
        assert_eq!(err.description, "Bad Gateway");
    }

    #[test]
    fn test_envelope_code_overrides_status() {
        let body = r#"{"ok":false,"error_code":403,"description":"Forbidden: bot was blocked by the user"}"#;
        let err = ApiError::from_response(200, body);
        assert_eq!(err.code, 403);
    }
}
