// Copyright 2025 Sushanth (https://github.com/sushanthpy)
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.

//! Client errors and user-facing messages.

use reqwest::StatusCode;
use spanlens_core::{ProjectionError, ValidationErrors};
use thiserror::Error;

const MAX_RAW_MESSAGE: usize = 200;

#[derive(Error, Debug)]
pub enum ClientError {
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("JSON serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Validation failed: {0}")]
    Validation(#[from] ValidationErrors),

    #[error("Cannot build query: {0}")]
    Projection(#[from] ProjectionError),

    #[error("{0} is not supported by the API yet")]
    NotImplemented(&'static str),

    #[error("Invalid client configuration: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, ClientError>;

impl ClientError {
    /// Transport failures, 5xx and 429 are worth another attempt.
    pub fn is_retryable(&self) -> bool {
        match self {
            ClientError::Request(e) => e.is_timeout() || e.is_connect(),
            ClientError::Api { status, .. } => {
                *status >= 500 || *status == StatusCode::TOO_MANY_REQUESTS.as_u16()
            }
            _ => false,
        }
    }

    pub fn status(&self) -> Option<u16> {
        match self {
            ClientError::Api { status, .. } => Some(*status),
            ClientError::NotFound(_) => Some(StatusCode::NOT_FOUND.as_u16()),
            ClientError::Request(e) => e.status().map(|s| s.as_u16()),
            _ => None,
        }
    }

    /// Text for a toast notification.
    pub fn user_message(&self) -> String {
        match self {
            ClientError::Api { message, .. } => message.clone(),
            ClientError::NotFound(message) => message.clone(),
            ClientError::Validation(errors) => format!("Please fix the form: {}", errors),
            ClientError::Projection(e) => e.to_string(),
            ClientError::NotImplemented(op) => format!("{} is not available yet", op),
            ClientError::Request(e) if e.is_timeout() => "The request timed out".to_string(),
            ClientError::Request(e) if e.is_connect() => {
                "Could not reach the API server".to_string()
            }
            other => other.to_string(),
        }
    }
}

fn non_empty(value: Option<&serde_json::Value>) -> Option<String> {
    value
        .and_then(|v| v.as_str())
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

/// Best human-readable message in an error response body.
///
/// Understands `{"error": {"message"}}`, `{"message"}`, `{"error": "..."}`
/// and `{"detail"}` (string or a list of `{"msg"}` items). Falls back to the
/// raw body, then to the status reason.
pub fn extract_api_message(body: &str, status: StatusCode) -> String {
    if let Ok(json) = serde_json::from_str::<serde_json::Value>(body) {
        let found = non_empty(json.pointer("/error/message"))
            .or_else(|| non_empty(json.get("message")))
            .or_else(|| non_empty(json.get("error")))
            .or_else(|| non_empty(json.get("detail")))
            .or_else(|| {
                let items = json.get("detail")?.as_array()?;
                let messages: Vec<String> = items
                    .iter()
                    .filter_map(|item| non_empty(item.get("msg")))
                    .collect();
                (!messages.is_empty()).then(|| messages.join("; "))
            });
        if let Some(message) = found {
            return message;
        }
    }

    let raw = body.trim();
    if !raw.is_empty() && !raw.starts_with('{') && !raw.starts_with('<') {
        return raw.chars().take(MAX_RAW_MESSAGE).collect();
    }
    status
        .canonical_reason()
        .map(str::to_string)
        .unwrap_or_else(|| format!("Request failed with status {}", status.as_u16()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_message_shapes() {
        let status = StatusCode::BAD_REQUEST;
        assert_eq!(
            extract_api_message(r#"{"error": {"message": "Rule name taken", "code": 7}}"#, status),
            "Rule name taken"
        );
        assert_eq!(extract_api_message(r#"{"message": "Bad sampling rate"}"#, status), "Bad sampling rate");
        assert_eq!(extract_api_message(r#"{"error": "forbidden"}"#, status), "forbidden");
        assert_eq!(extract_api_message(r#"{"detail": "Invalid token"}"#, status), "Invalid token");
        assert_eq!(
            extract_api_message(r#"{"detail": [{"msg": "name required"}, {"msg": "bad rate"}]}"#, status),
            "name required; bad rate"
        );
    }

    #[test]
    fn test_extract_message_fallbacks() {
        assert_eq!(
            extract_api_message("upstream timeout", StatusCode::BAD_GATEWAY),
            "upstream timeout"
        );
        assert_eq!(
            extract_api_message("", StatusCode::SERVICE_UNAVAILABLE),
            "Service Unavailable"
        );
        assert_eq!(
            extract_api_message("<html>oops</html>", StatusCode::INTERNAL_SERVER_ERROR),
            "Internal Server Error"
        );
        assert_eq!(extract_api_message("{}", StatusCode::NOT_FOUND), "Not Found");
    }

    #[test]
    fn test_retryable_statuses() {
        let api = |status| ClientError::Api {
            status,
            message: String::new(),
        };
        assert!(api(500).is_retryable());
        assert!(api(503).is_retryable());
        assert!(api(429).is_retryable());
        assert!(!api(400).is_retryable());
        assert!(!api(422).is_retryable());
        assert!(!ClientError::NotImplemented("Export").is_retryable());
    }

    #[test]
    fn test_user_message() {
        assert_eq!(
            ClientError::NotImplemented("Bulk delete").user_message(),
            "Bulk delete is not available yet"
        );
        let api = ClientError::Api {
            status: 409,
            message: "Preset name already exists".into(),
        };
        assert_eq!(api.user_message(), "Preset name already exists");
    }
}
