use reqwest::StatusCode;
use serde_json::Value;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ChatApiError {
    #[error("invalid header {0}")]
    InvalidHeader(String),

    #[error("request error: {0}")]
    Request(#[from] reqwest::Error),

    #[error("HTTP {status}: {message}")]
    Status { status: StatusCode, message: String },

    #[error("stream read failed: {0}")]
    StreamRead(#[source] reqwest::Error),

    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("malformed response: {0}")]
    MalformedResponse(String),

    #[error("request was cancelled")]
    Cancelled,
}

/// Extract a human-readable message from an error body.
///
/// Servers wrap errors in several envelope shapes; each known shape is tried
/// before falling back to the raw body, and to the status reason when the body
/// is empty.
pub fn parse_error_message(status: StatusCode, body: &str) -> String {
    let trimmed = body.trim();
    if trimmed.is_empty() {
        return status
            .canonical_reason()
            .unwrap_or("request failed")
            .to_string();
    }

    serde_json::from_str::<Value>(trimmed)
        .ok()
        .and_then(|value| envelope_message(&value))
        .unwrap_or_else(|| trimmed.to_string())
}

fn envelope_message(value: &Value) -> Option<String> {
    if let Some(error) = value.get("error") {
        if let Some(message) = message_field(error).or_else(|| non_empty(error.as_str())) {
            return Some(message);
        }
    }

    if let Some(message) = non_empty(value.get("message").and_then(Value::as_str)) {
        return Some(message);
    }

    let detail = value.get("detail")?;
    if let Some(message) = non_empty(detail.as_str()).or_else(|| message_field(detail)) {
        return Some(message);
    }

    let joined = detail
        .as_array()?
        .iter()
        .filter_map(|item| {
            non_empty(item.get("msg").and_then(Value::as_str)).or_else(|| message_field(item))
        })
        .collect::<Vec<_>>()
        .join("; ");
    non_empty(Some(joined.as_str()))
}

fn message_field(value: &Value) -> Option<String> {
    non_empty(value.get("message").and_then(Value::as_str))
}

fn non_empty(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_owned)
}
