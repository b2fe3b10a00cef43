//! Maps HTTP and PostgREST failures onto `DomainError`.

use domains::DomainError;
use reqwest::{Response, StatusCode};
use serde::Deserialize;

/// PostgreSQL unique_violation, surfaced by PostgREST in the `code` field.
const UNIQUE_VIOLATION: &str = "23505";

/// Error body shape shared by PostgREST and the storage API.
#[derive(Debug, Default, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    code: Option<serde_json::Value>,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    details: Option<String>,
}

impl ErrorBody {
    fn code(&self) -> Option<String> {
        match &self.code {
            Some(serde_json::Value::String(s)) => Some(s.clone()),
            Some(other) => Some(other.to_string()),
            None => None,
        }
    }

    fn message(&self) -> Option<&str> {
        self.message.as_deref().or(self.error.as_deref())
    }
}

pub(crate) fn transport(err: reqwest::Error) -> DomainError {
    tracing::warn!(error = %err, "remote call failed before a response");
    DomainError::remote(err.to_string())
}

pub(crate) async fn check_status(response: Response, context: &str) -> Result<Response, DomainError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let text = response.text().await.unwrap_or_default();
    let body: ErrorBody = serde_json::from_str(&text).unwrap_or_default();
    tracing::warn!(%status, context, code = ?body.code(), details = ?body.details, "remote call rejected");
    Err(classify(status, &body, context))
}

fn classify(status: StatusCode, body: &ErrorBody, context: &str) -> DomainError {
    let message = body
        .message()
        .map(str::to_string)
        .unwrap_or_else(|| status.canonical_reason().unwrap_or("unknown error").to_string());

    if status == StatusCode::CONFLICT || body.code().as_deref() == Some(UNIQUE_VIOLATION) {
        return DomainError::Conflict(format!("{context}: {message}"));
    }
    match status {
        StatusCode::UNAUTHORIZED => DomainError::Unauthenticated,
        StatusCode::NOT_FOUND => DomainError::NotFound(context.to_string(), message),
        _ => DomainError::Remote(format!("{context}: {status}: {message}")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn body(json: &str) -> ErrorBody {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn unique_violation_is_conflict() {
        let b = body(r#"{"code":"23505","message":"duplicate key value","details":null,"hint":null}"#);
        let err = classify(StatusCode::BAD_REQUEST, &b, "insert like");
        assert!(matches!(err, DomainError::Conflict(m) if m.contains("duplicate key")));
    }

    #[test]
    fn expired_token_is_unauthenticated() {
        let b = body(r#"{"code":"PGRST301","message":"JWT expired"}"#);
        assert_eq!(classify(StatusCode::UNAUTHORIZED, &b, "list posts"), DomainError::Unauthenticated);
    }

    #[test]
    fn storage_errors_use_error_key() {
        let b = body(r#"{"statusCode":"500","error":"internal","message":null}"#);
        let err = classify(StatusCode::INTERNAL_SERVER_ERROR, &b, "upload");
        assert!(matches!(err, DomainError::Remote(m) if m.contains("internal")));
    }

    #[test]
    fn numeric_code_is_tolerated() {
        let b = body(r#"{"code":42,"message":"odd"}"#);
        assert_eq!(b.code().as_deref(), Some("42"));
    }
}
