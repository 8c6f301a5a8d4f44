use serde_json::Value;
use thiserror::Error;

/// Shown when a failure carries nothing readable.
pub const UNKNOWN_ERROR: &str = "Unknown error";

/// Bodies shorter than this are shown verbatim when they are not JSON.
const RAW_BODY_LIMIT: usize = 200;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelErrorKind {
    /// Connection, TLS or body read failure.
    Network,
    /// Non-2xx status or an error event inside the stream.
    Provider,
    /// A payload that could not be decoded.
    Malformed,
    /// The request was rejected before anything was sent.
    InvalidRequest,
}

/// Failure reported by a model client. Never retried.
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct ModelError {
    pub kind: ModelErrorKind,
    pub message: String,
    pub status_code: Option<u16>,
    pub body: Option<String>,
}

impl ModelError {
    pub fn network(err: reqwest::Error) -> Self {
        Self {
            kind: ModelErrorKind::Network,
            message: err.to_string(),
            status_code: err.status().map(|s| s.as_u16()),
            body: None,
        }
    }

    pub fn provider(status_code: Option<u16>, body: impl Into<String>) -> Self {
        let message = match status_code {
            Some(code) => format!("Request failed with status: {}", code),
            None => "Provider reported an error".to_string(),
        };
        Self {
            kind: ModelErrorKind::Provider,
            message,
            status_code,
            body: Some(body.into()),
        }
    }

    pub fn malformed(detail: impl Into<String>) -> Self {
        Self {
            kind: ModelErrorKind::Malformed,
            message: detail.into(),
            status_code: None,
            body: None,
        }
    }

    pub fn invalid_request(detail: impl Into<String>) -> Self {
        Self {
            kind: ModelErrorKind::InvalidRequest,
            message: detail.into(),
            status_code: None,
            body: None,
        }
    }

    /// Build from a non-success response, keeping its body.
    pub async fn from_response(response: reqwest::Response) -> Self {
        let status = response.status().as_u16();
        match response.text().await {
            Ok(body) => Self::provider(Some(status), body),
            Err(err) => Self {
                status_code: Some(status),
                ..Self::network(err)
            },
        }
    }
}

/// Human-readable message for a failure.
///
/// Prefers `message` or `error.message` from a JSON body, then a short
/// non-JSON body as-is, then the error's own message.
pub fn extract_error_message(err: &ModelError) -> String {
    if let Some(body) = err.body.as_deref().filter(|b| !b.is_empty()) {
        match serde_json::from_str::<Value>(body) {
            Ok(json) => {
                let found = json
                    .get("message")
                    .and_then(Value::as_str)
                    .filter(|m| !m.is_empty())
                    .or_else(|| {
                        json.pointer("/error/message")
                            .and_then(Value::as_str)
                            .filter(|m| !m.is_empty())
                    });
                if let Some(message) = found {
                    return message.to_string();
                }
            }
            Err(_) => {
                if body.chars().count() < RAW_BODY_LIMIT {
                    return body.to_string();
                }
            }
        }
    }

    if err.message.is_empty() {
        UNKNOWN_ERROR.to_string()
    } else {
        err.message.clone()
    }
}
