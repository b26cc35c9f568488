// src/error.rs

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;
use tracing::error;

/// Structured error body returned to HTTP clients.
#[derive(Serialize, Debug)]
struct ErrorResponse {
    error: ErrorDetails,
}

#[derive(Serialize, Debug)]
struct ErrorDetails {
    #[serde(rename = "type")]
    error_type: String,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<String>,
}

/// All failure modes of the relay.
///
/// The upstream-facing variants follow a fixed recovery policy:
/// `KeyRejected` and `KeyQuotaExhausted` trigger key rotation plus a bounded
/// retry, `ServerBusy` triggers backoff plus a bounded retry, and everything
/// else is surfaced to the caller without touching the key pool.
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML parsing error: {0}")]
    YamlParsing(#[from] serde_yaml::Error),

    #[error("JSON processing error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Reqwest HTTP client error: {0}")]
    Reqwest(#[from] reqwest::Error),

    #[error("HTTP client build error: {source}")]
    HttpClientBuild { source: reqwest::Error },

    #[error("State persistence error: {0}")]
    StatePersistence(String),

    #[error("No API keys configured")]
    NoKeysConfigured,

    #[error("Every configured API key has failed today")]
    AllKeysFailed,

    #[error("API key {key_preview} was rejected by the upstream service")]
    KeyRejected { key_preview: String },

    #[error("API key {key_preview} has exhausted its quota")]
    KeyQuotaExhausted { key_preview: String },

    #[error("Local daily request cap of {limit} reached")]
    DailyQuotaExceeded { limit: u32 },

    #[error("Upstream service is busy (HTTP {status})")]
    ServerBusy { status: u16 },

    #[error("Model '{model}' is not available")]
    ModelUnavailable { model: String },

    #[error("Model returned an empty response")]
    EmptyResponse,

    #[error("Retry ceiling reached after {attempts} attempts")]
    RetriesExhausted { attempts: u32 },

    #[error("Upstream service error: {status} - {body}")]
    UpstreamServiceError { status: u16, body: String },
}

impl AppError {
    /// Errors that take the active key out of rotation and retry with the
    /// next one.
    pub fn is_rotation_trigger(&self) -> bool {
        matches!(
            self,
            Self::KeyRejected { .. } | Self::KeyQuotaExhausted { .. }
        )
    }

    /// Errors recovered with exponential backoff on the same key.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::ServerBusy { .. })
    }

    /// Human-readable message with a concrete remediation, suitable for
    /// returning directly to the chat UI. Never leaks key material.
    pub fn user_message(&self) -> String {
        match self {
            Self::AllKeysFailed => "Every configured API key has been rejected or has hit its \
                quota for today. Add a new key or wait for the daily reset."
                .to_string(),
            Self::DailyQuotaExceeded { limit } => format!(
                "The daily request limit ({limit}) has been reached. Please try again tomorrow."
            ),
            Self::KeyRejected { .. } | Self::KeyQuotaExhausted { .. } => {
                "The active API key was rejected and has been taken out of rotation. \
                 Please try again."
                    .to_string()
            }
            Self::ServerBusy { .. } | Self::RetriesExhausted { .. } => {
                "The assistant is temporarily overloaded. Please try again in a moment."
                    .to_string()
            }
            Self::ModelUnavailable { .. } => {
                "None of the configured models are currently available. Please try again later."
                    .to_string()
            }
            Self::EmptyResponse => {
                "The assistant returned an empty reply. Please rephrase your message and try \
                 again."
                    .to_string()
            }
            _ => "Something went wrong while contacting the assistant. Please try again."
                .to_string(),
        }
    }

    /// Maps the error to an HTTP status and a client-safe body, keeping
    /// internal details out of 5xx responses.
    fn to_status_and_details(&self) -> (StatusCode, ErrorDetails) {
        match self {
            Self::Config(msg) => {
                error!("Configuration error: {}", msg);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    ErrorDetails {
                        error_type: "CONFIG_ERROR".to_string(),
                        message: "Internal server configuration error".to_string(),
                        details: None,
                    },
                )
            }
            Self::Io(e) => {
                error!("IO error: {}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    ErrorDetails {
                        error_type: "IO_ERROR".to_string(),
                        message: "Internal server error during IO operation".to_string(),
                        details: None,
                    },
                )
            }
            Self::YamlParsing(e) => {
                error!("YAML parsing error: {}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    ErrorDetails {
                        error_type: "CONFIG_PARSE_ERROR".to_string(),
                        message: "Failed to parse configuration file".to_string(),
                        details: None,
                    },
                )
            }
            Self::Json(e) => {
                error!("JSON processing error: {}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    ErrorDetails {
                        error_type: "JSON_PROCESSING_ERROR".to_string(),
                        message: "Internal error while processing JSON".to_string(),
                        details: None,
                    },
                )
            }
            Self::HttpClientBuild { source } => {
                error!("HTTP client build error: {}", source);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    ErrorDetails {
                        error_type: "HTTP_CLIENT_BUILD_ERROR".to_string(),
                        message: "Internal server error building HTTP client".to_string(),
                        details: None,
                    },
                )
            }
            Self::StatePersistence(msg) => {
                error!("State persistence error: {}", msg);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    ErrorDetails {
                        error_type: "STATE_PERSISTENCE_ERROR".to_string(),
                        message: "Internal error persisting relay state".to_string(),
                        details: None,
                    },
                )
            }
            Self::Reqwest(e) => {
                error!("Upstream reqwest error: {}", e);
                let status = if e.is_timeout() {
                    StatusCode::GATEWAY_TIMEOUT
                } else {
                    StatusCode::BAD_GATEWAY
                };
                (
                    status,
                    ErrorDetails {
                        error_type: "UPSTREAM_ERROR".to_string(),
                        message: "Error communicating with the upstream service".to_string(),
                        details: Some(e.to_string()),
                    },
                )
            }
            Self::NoKeysConfigured => (
                StatusCode::SERVICE_UNAVAILABLE,
                ErrorDetails {
                    error_type: "NO_KEYS_CONFIGURED".to_string(),
                    message: "No API keys are configured".to_string(),
                    details: None,
                },
            ),
            Self::AllKeysFailed => (
                StatusCode::SERVICE_UNAVAILABLE,
                ErrorDetails {
                    error_type: "ALL_KEYS_FAILED".to_string(),
                    message: self.user_message(),
                    details: None,
                },
            ),
            Self::KeyRejected { key_preview } => (
                StatusCode::BAD_GATEWAY,
                ErrorDetails {
                    error_type: "KEY_REJECTED".to_string(),
                    message: "The active API key was rejected by the upstream service"
                        .to_string(),
                    details: Some(format!("Affected key: {key_preview}")),
                },
            ),
            Self::KeyQuotaExhausted { key_preview } => (
                StatusCode::TOO_MANY_REQUESTS,
                ErrorDetails {
                    error_type: "KEY_QUOTA_EXHAUSTED".to_string(),
                    message: "The active API key has exhausted its quota".to_string(),
                    details: Some(format!("Affected key: {key_preview}")),
                },
            ),
            Self::DailyQuotaExceeded { .. } => (
                StatusCode::TOO_MANY_REQUESTS,
                ErrorDetails {
                    error_type: "DAILY_QUOTA_EXCEEDED".to_string(),
                    message: self.user_message(),
                    details: None,
                },
            ),
            Self::ServerBusy { status } => (
                StatusCode::BAD_GATEWAY,
                ErrorDetails {
                    error_type: "UPSTREAM_BUSY".to_string(),
                    message: "The upstream service is busy".to_string(),
                    details: Some(format!("Upstream status: {status}")),
                },
            ),
            Self::ModelUnavailable { model } => (
                StatusCode::BAD_GATEWAY,
                ErrorDetails {
                    error_type: "MODEL_UNAVAILABLE".to_string(),
                    message: "The requested model is not available".to_string(),
                    details: Some(format!("Model: {model}")),
                },
            ),
            Self::EmptyResponse => (
                StatusCode::BAD_GATEWAY,
                ErrorDetails {
                    error_type: "EMPTY_RESPONSE".to_string(),
                    message: "The model returned an empty response".to_string(),
                    details: None,
                },
            ),
            Self::RetriesExhausted { attempts } => (
                StatusCode::BAD_GATEWAY,
                ErrorDetails {
                    error_type: "RETRIES_EXHAUSTED".to_string(),
                    message: "The request failed after repeated attempts".to_string(),
                    details: Some(format!("Attempts: {attempts}")),
                },
            ),
            Self::UpstreamServiceError { status, body } => {
                error!(
                    "Upstream service returned error: Status={}, Body='{}'",
                    status, body
                );
                (
                    StatusCode::from_u16(*status).unwrap_or(StatusCode::BAD_GATEWAY),
                    ErrorDetails {
                        error_type: "UPSTREAM_SERVICE_ERROR".to_string(),
                        message: "Upstream service returned an error".to_string(),
                        details: Some(body.clone()),
                    },
                )
            }
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_details) = self.to_status_and_details();
        let body = Json(ErrorResponse {
            error: error_details,
        });
        (status, body).into_response()
    }
}

pub type Result<T> = std::result::Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::to_bytes;
    use serde_json::Value;

    async fn check_response(
        error: AppError,
        expected_status: StatusCode,
        expected_type: &str,
        expected_message_substring: &str,
    ) {
        let response = error.into_response();
        assert_eq!(response.status(), expected_status, "Status code mismatch");

        let bytes = to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("Failed to read response body");
        let body_json: Value =
            serde_json::from_slice(&bytes).expect("Response body is not valid JSON");

        let error_obj = &body_json["error"];
        assert_eq!(error_obj["type"].as_str(), Some(expected_type));
        let message = error_obj["message"].as_str().expect("message missing");
        assert!(
            message.contains(expected_message_substring),
            "Expected message '{message}' to contain '{expected_message_substring}'"
        );
    }

    #[tokio::test]
    async fn test_into_response_all_keys_failed() {
        check_response(
            AppError::AllKeysFailed,
            StatusCode::SERVICE_UNAVAILABLE,
            "ALL_KEYS_FAILED",
            "Add a new key",
        )
        .await;
    }

    #[tokio::test]
    async fn test_into_response_daily_quota() {
        check_response(
            AppError::DailyQuotaExceeded { limit: 1500 },
            StatusCode::TOO_MANY_REQUESTS,
            "DAILY_QUOTA_EXCEEDED",
            "1500",
        )
        .await;
    }

    #[tokio::test]
    async fn test_into_response_config() {
        check_response(
            AppError::Config("bad config".to_string()),
            StatusCode::INTERNAL_SERVER_ERROR,
            "CONFIG_ERROR",
            "Internal server configuration error",
        )
        .await;
    }

    #[tokio::test]
    async fn test_into_response_upstream_passthrough_status() {
        check_response(
            AppError::UpstreamServiceError {
                status: 418,
                body: "teapot".to_string(),
            },
            StatusCode::IM_A_TEAPOT,
            "UPSTREAM_SERVICE_ERROR",
            "Upstream service returned an error",
        )
        .await;
    }

    #[test]
    fn test_recovery_classification() {
        assert!(AppError::KeyRejected {
            key_preview: "ab...cd".to_string()
        }
        .is_rotation_trigger());
        assert!(AppError::KeyQuotaExhausted {
            key_preview: "ab...cd".to_string()
        }
        .is_rotation_trigger());
        assert!(AppError::ServerBusy { status: 503 }.is_transient());
        assert!(!AppError::ServerBusy { status: 503 }.is_rotation_trigger());
        assert!(!AppError::EmptyResponse.is_rotation_trigger());
        assert!(!AppError::DailyQuotaExceeded { limit: 10 }.is_rotation_trigger());
    }

    #[test]
    fn test_user_messages_never_leak_keys() {
        let err = AppError::KeyRejected {
            key_preview: "AIza...WXYZ".to_string(),
        };
        assert!(!err.user_message().contains("AIza"));
    }
}
