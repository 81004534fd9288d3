//! Normalized error shape surfaced by every client operation.

use serde::Serialize;
use serde_json::{Map, Value};
use std::time::Duration;
use thiserror::Error;

use super::interceptor::ResponseParts;
use super::retry::RETRYABLE_STATUS_THRESHOLD;

/// No response was received (connection failure, DNS, timeout).
pub const NETWORK_ERROR: &str = "NETWORK_ERROR";

/// The caller cancelled the request.
pub const CANCELLED: &str = "CANCELLED";

/// Anything not otherwise classified, e.g. a body that failed to serialize.
pub const UNKNOWN_ERROR: &str = "UNKNOWN_ERROR";

/// The only error type callers of [`ApiClient`](super::ApiClient) observe.
///
/// `status` is `0` for failures that never produced an HTTP response.
/// `Clone` so that deduplicated GET waiters can all receive the same failure.
#[derive(Error, Debug, Clone, PartialEq, Serialize)]
#[error("{message}")]
pub struct ApiClientError {
    pub message: String,
    pub status: u16,
    pub code: String,
    pub details: Option<Value>,
    pub is_retryable: bool,
}

impl ApiClientError {
    pub fn network(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            status: 0,
            code: NETWORK_ERROR.to_string(),
            details: None,
            is_retryable: true,
        }
    }

    pub fn cancelled() -> Self {
        Self {
            message: "Request was cancelled".to_string(),
            status: 0,
            code: CANCELLED.to_string(),
            details: None,
            is_retryable: false,
        }
    }

    pub fn unknown(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            status: 0,
            code: UNKNOWN_ERROR.to_string(),
            details: None,
            is_retryable: false,
        }
    }

    /// Classifies a transport failure. Timeouts and connection failures are
    /// network-class errors; failures while building the request are not.
    pub fn from_transport(error: &reqwest::Error, timeout: Duration) -> Self {
        if error.is_timeout() {
            return Self::network(format!(
                "Request timed out after {}ms",
                timeout.as_millis()
            ));
        }
        if error.is_builder() {
            return Self::unknown(format!("Failed to build request: {}", error));
        }
        Self::network(format!(
            "Network error - please check your connection ({})",
            error
        ))
    }

    /// Builds an error from a received non-2xx response.
    ///
    /// The body is decoded defensively: anything that is not a JSON object is
    /// treated as an empty object before `message` and `code` are read.
    pub fn from_response(response: &ResponseParts) -> Self {
        let status = response.status;
        let body = match serde_json::from_slice::<Value>(&response.body) {
            Ok(Value::Object(map)) => map,
            _ => Map::new(),
        };

        let message = body
            .get("message")
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or_else(|| {
                format!(
                    "HTTP {}: {}",
                    status.as_u16(),
                    status.canonical_reason().unwrap_or("")
                )
            });
        let code = body
            .get("code")
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or_else(|| format!("HTTP_{}", status.as_u16()));
        let details = if body.is_empty() {
            None
        } else {
            Some(Value::Object(body))
        };

        Self {
            message,
            status: status.as_u16(),
            code,
            details,
            is_retryable: status.as_u16() >= RETRYABLE_STATUS_THRESHOLD,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.code == CANCELLED
    }

    pub fn is_network_error(&self) -> bool {
        self.code == NETWORK_ERROR
    }
}
