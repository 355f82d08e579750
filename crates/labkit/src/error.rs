//! Error types for the GitLab client.
//!
//! Adapter calls report [`AdapterError`] so the reconcile engine can tell a
//! missing entity from a refused request or a network failure. This module
//! owns the translation from HTTP status codes and `ureq` failures, plus the
//! few errors raised while setting up a client.

use reconcile::AdapterError;
use serde_json::Value;

/// Result type alias for client setup.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised while building a client.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The API base URL is unusable.
    #[error("invalid API base URL {url}: {reason}")]
    InvalidBaseUrl {
        /// URL as configured.
        url: String,
        /// Why it was refused.
        reason: String,
    },
}

/// Longest response excerpt kept in an error message.
const MAX_EXCERPT: usize = 200;

/// Map a non-success HTTP status and its body to an adapter error.
///
/// 404 means the entity is gone; every other 4xx is a refusal the caller
/// must fix; 5xx is treated as a transport failure and may be retried.
pub fn status_error(status: u16, body: &str) -> AdapterError {
    let message = api_message(body);
    match status {
        404 => AdapterError::NotFound,
        400..=499 => AdapterError::Rejected { status, message },
        _ => AdapterError::transport(format!("HTTP {status}: {message}")),
    }
}

/// Map a `ureq` failure to an adapter error.
pub fn transport_error(err: ureq::Error) -> AdapterError {
    match err {
        ureq::Error::StatusCode(code) => status_error(code, ""),
        ureq::Error::Json(e) => AdapterError::decode(e.to_string()),
        other => AdapterError::transport(other.to_string()),
    }
}

/// Extract a readable message from a GitLab error body.
///
/// GitLab answers with `{"message": "..."}`, `{"message": {"field": ["..."]}}`
/// or `{"error": "..."}`. Anything else is returned as a trimmed excerpt.
pub fn api_message(body: &str) -> String {
    let Ok(value) = serde_json::from_str::<Value>(body) else {
        return excerpt(body);
    };
    match (value.get("message"), value.get("error")) {
        (Some(Value::String(message)), _) | (None, Some(Value::String(message))) => {
            message.clone()
        }
        (Some(Value::Object(fields)), _) => fields
            .iter()
            .map(|(field, problems)| format!("{field} {}", join_problems(problems)))
            .collect::<Vec<_>>()
            .join("; "),
        (Some(list @ Value::Array(_)), _) => join_problems(list),
        _ => excerpt(body),
    }
}

fn join_problems(problems: &Value) -> String {
    match problems {
        Value::Array(items) => items
            .iter()
            .map(|item| match item {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            })
            .collect::<Vec<_>>()
            .join(", "),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn excerpt(body: &str) -> String {
    let trimmed = body.trim();
    if trimmed.is_empty() {
        return "empty response".to_string();
    }
    match trimmed.char_indices().nth(MAX_EXCERPT) {
        Some((cut, _)) => format!("{}...", &trimmed[..cut]),
        None => trimmed.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert_eq!(status_error(404, "{\"message\":\"404 Not found\"}"), AdapterError::NotFound);
        assert_eq!(
            status_error(409, "{\"message\":\"Member already exists\"}"),
            AdapterError::Rejected {
                status: 409,
                message: "Member already exists".into()
            }
        );
        let server = status_error(502, "<html>bad gateway</html>");
        assert!(server.is_retryable());
        assert!(server.to_string().contains("HTTP 502"));
    }

    #[test]
    fn test_api_message_field_errors() {
        let body = r#"{"message":{"key":["is invalid","is too long"],"value":["is blank"]}}"#;
        assert_eq!(
            api_message(body),
            "key is invalid, is too long; value is blank"
        );
    }

    #[test]
    fn test_api_message_error_key() {
        assert_eq!(
            api_message(r#"{"error":"access_level does not have a valid value"}"#),
            "access_level does not have a valid value"
        );
    }

    #[test]
    fn test_api_message_plain_body() {
        assert_eq!(api_message("  "), "empty response");
        let long = "x".repeat(500);
        let message = api_message(&long);
        assert!(message.ends_with("..."));
        assert_eq!(message.len(), MAX_EXCERPT + 3);
    }

    #[test]
    fn test_error_display() {
        let err = Error::InvalidBaseUrl {
            url: "gitlab.com".to_string(),
            reason: "missing scheme".to_string(),
        };
        let display = err.to_string();
        assert!(display.contains("gitlab.com"));
        assert!(display.contains("missing scheme"));
    }
}
